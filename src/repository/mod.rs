mod conversion;
mod entry_repository;
mod verification_repository;

pub use entry_repository::EntryRepository;
pub use verification_repository::VerificationRepository;

#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    // Every connection to `sqlite::memory:` is a separate database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    pool
}

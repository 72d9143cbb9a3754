#![forbid(unsafe_code)]

mod commands;
mod config;
mod events;
mod models;
mod poise_error_handler;
mod prompts;
mod repository;
mod tally;
mod utils;

use std::{process::exit, sync::Arc};

use config::PromptSettings;
use poise::{serenity_prelude::*, Framework};
use poise_error_handler::handle_error;
use prompts::{PromptService, SerenityTransport};
use repository::{EntryRepository, VerificationRepository};
use serde::Deserialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::{select, signal};
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize)]
struct AppConfig {
    discord_bot_token: String,
    database_url: String,
    #[serde(default = "default_prompt_config_path")]
    prompt_config_path: String,
    register_commands_globally: Option<bool>,
    register_commands_in_guilds: Option<Vec<u64>>,
}

fn default_prompt_config_path() -> String {
    "prompts.json".to_string()
}

pub struct BotState {
    pub verification_repository: Arc<VerificationRepository>,
    pub entry_repository: Arc<EntryRepository>,
    pub prompts: Arc<PromptService>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        warn!("Could not load config from .env file: {err}");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(
                    "prompt_keeper_bot=info"
                        .parse()
                        .expect("Hard-coded default directive should be correct"),
                )
                .from_env_lossy(),
        )
        .init();

    let app_config = match envy::from_env::<AppConfig>() {
        Ok(config) => config,
        Err(err) => {
            error!("Could not load app config: {err}");
            exit(255);
        }
    };

    let prompt_settings = match PromptSettings::load(&app_config.prompt_config_path) {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err}");
            exit(255);
        }
    };

    let db_pool = match setup_database(&app_config.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            error!("Could not setup database: {err}");
            exit(255);
        }
    };

    let verification_repository = Arc::new(VerificationRepository::new(db_pool.clone()));
    let entry_repository = Arc::new(EntryRepository::new(db_pool.clone()));

    let framework = Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::verify(),
                commands::report(),
                commands::suggest(),
                commands::resource(),
                commands::ticket(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::handle_event(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(handle_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(
                async move {
                    let commands = &framework.options().commands;

                    if let Some(true) = app_config.register_commands_globally {
                        info!("Registering commands globally");
                        poise::builtins::register_globally(ctx, commands).await?;
                    }

                    if let Some(guilds) = app_config.register_commands_in_guilds {
                        for guild in guilds.iter().map(|g| GuildId::new(*g)) {
                            let guild_name = ctx
                                .http()
                                .get_guild(guild)
                                .await
                                .map(|g| g.name)
                                .unwrap_or("???".to_string());

                            info!("Registering commands in guild {guild} ({guild_name})");

                            poise::builtins::register_in_guild(ctx, commands, guild).await?;
                        }
                    }

                    let prompts = PromptService::new(
                        Arc::new(SerenityTransport::new(
                            ctx.http.clone(),
                            ctx.cache.clone(),
                        )),
                        verification_repository.clone(),
                        entry_repository.clone(),
                        prompt_settings,
                    );

                    Ok(BotState {
                        verification_repository,
                        entry_repository,
                        prompts: Arc::new(prompts),
                    })
                }
                .instrument(info_span!("bot_setup")),
            )
        })
        .build();

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::GUILD_MEMBERS;

    let mut client = match ClientBuilder::new(app_config.discord_bot_token, intents)
        .framework(framework)
        .await
    {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to create the client: {err}");
            exit(255);
        }
    };

    select! {
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            client.shard_manager.shutdown_all().await;
            db_pool.close().await;
        },

        result = client.start() => {
            if let Err(err) = result {
                error!("Failed to start the client: {err}");
            }
        },
    };
}

#[tracing::instrument(skip(url))]
async fn setup_database(url: &str) -> anyhow::Result<SqlitePool> {
    info!("Connecting to SQLite database at {url}");
    let pool = SqlitePoolOptions::new().connect(url).await?;
    info!("Running migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Done!");
    Ok(pool)
}

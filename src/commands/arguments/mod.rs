mod entry_link;
mod trimmed_text;

pub use entry_link::EntryLink;
pub use trimmed_text::TrimmedText;

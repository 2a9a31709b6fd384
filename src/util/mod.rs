//! Helpers for the command layer: feed URL checks and terminal-safe text.

mod text;
mod url_validator;

pub use text::{clean_text, truncate_to_width};
pub use url_validator::{validate_feed_url, FeedUrlError};

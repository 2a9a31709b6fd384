//! Feed source client: HTTP retrieval, RSS parsing and date normalization.
//!
//! - [`fetcher`] - one bounded HTTP GET per call via [`FeedClient`]
//! - [`parser`] - RSS 2.0 event parser producing [`RssFeed`]
//! - [`dates`] - `<pubDate>` strings to UTC timestamps
//!
//! Nothing in this module touches the store.

mod dates;
mod fetcher;
mod parser;

pub use dates::{normalize_published, DateFormatError, FeedDateFormat};
pub use fetcher::{default_user_agent, FeedClient, FeedError, FetchError, DEFAULT_TIMEOUT};
pub use parser::{parse_feed, ParseError, RssFeed, RssItem};

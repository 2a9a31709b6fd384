//! gator: a polling RSS aggregator.
//!
//! Feeds registered by users are polled one at a time, stalest first. Each
//! new item becomes a post in SQLite exactly once, keyed by its URL.

pub mod aggregator;
pub mod commands;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;

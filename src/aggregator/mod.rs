//! Feed aggregation engine.
//!
//! A [`Poller`] tick runs one cycle: [`next_feed`] picks the stalest feed and
//! [`scrape_feed`] fetches it and stores every new item. Data flows
//! poller → selector → pipeline → store, and control returns to the poller
//! after every cycle whatever its outcome.

mod ingest;
mod poller;
mod selector;

pub use ingest::{scrape_feed, IngestError, IngestReport, UNTITLED};
pub use poller::{CycleError, Poller, PollerState, PollerStats};
pub use selector::{next_feed, SelectError};

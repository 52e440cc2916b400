//! Harvests Valorant esports data (teams, players, matches, map statistics,
//! events) from vlr.gg and bo3.gg and keeps a local SQLite store in sync.
//!
//! Extraction goes through [`Source`] implementations, persistence through
//! [`SyncEngine`], and the tiered background refresh through [`Scheduler`].

pub use bo3_scraper::Bo3Source;
pub use config::AppConfig;
pub use error::{ErrorKind, IngestError, Result};
pub use fetcher::Fetcher;
pub use jobs::Pipeline;
pub use scheduler::{start_scheduler, Job, JobRunner, Scheduler, SchedulerHandle};
pub use source::Source;
pub use store::Store;
pub use sync::SyncEngine;
pub use vlr_scraper::VlrSource;

pub mod bo3_scraper;
pub mod config;
pub mod error;
pub(crate) mod extract;
pub mod fetcher;
pub mod jobs;
pub mod model;
pub mod normalize;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod sync;
pub mod vlr_scraper;

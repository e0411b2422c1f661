// src/lib.rs
// Library surface shared by the binary and the integration tests.

pub mod classify;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod region;
pub mod report;
pub mod scheduler;

pub use crate::classify::{Classification, Classifier, ClassifierOptions, EnrichedArticle};
pub use crate::config::{RegionRegistry, Settings};
pub use crate::pipeline::{Pipeline, RegionOutcome, RunMode};
pub use crate::region::Region;

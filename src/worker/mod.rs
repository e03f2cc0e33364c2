//! # Worker
//!
//! The stage-worker engine and the capabilities that plug into it.
//!
//! A [`WorkerEngine`] consumes one topic. It admits messages through the
//! skip rules and the [`DedupRing`], runs each admitted [`Task`] on a bounded
//! pool and completes it on the success, error or fatal path. What a worker
//! actually does is supplied by a [`WorkerCapability`]:
//!
//! - [`RestorationWorker`] for whole-object, single-file and cold-storage
//!   restoration;
//! - [`FixityWorker`] for fixity checks on single files.

pub mod capability;
pub mod context;
pub mod dedup_ring;
pub mod engine;
pub mod fixity_worker;
pub mod persistence;
pub mod processor;
pub mod restore_workers;
pub mod settings;
pub mod skip;
pub mod task;

pub use capability::WorkerCapability;
pub use context::{cold_storage_client_from_config, WorkerContext};
pub use dedup_ring::DedupRing;
pub use engine::{AdmissionOutcome, EngineStats, EngineStatsSnapshot, WorkerEngine};
pub use fixity_worker::FixityWorker;
pub use persistence::retry_with_backoff;
pub use processor::{Processor, RunOutcome};
pub use restore_workers::{RestorationWorker, FOLLOW_ON_FAILED_NOTE};
pub use settings::WorkerSettings;
pub use skip::{check_skip, SkipReason};
pub use task::{KeepAlive, Task};

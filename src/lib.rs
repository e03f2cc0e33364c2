#![allow(clippy::doc_markdown)] // Allow technical terms like BagIt, SigV4 in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Preservation Core
//!
//! Work-item processing engine and restoration state machine for a
//! digital-preservation pipeline.
//!
//! ## Overview
//!
//! Preserved content is described by work items held in a metadata registry.
//! Each pipeline stage is a worker consuming one broker topic: it receives a
//! work item id, decides whether to run it, runs it on a bounded pool and
//! records the outcome back into the registry and a result cache before
//! acknowledging the message. Delivery is at-least-once, so admission is
//! idempotent within a process and completion never loses the broker message.
//!
//! ## Architecture
//!
//! - [`worker`] - Stage engine: admission, dedup ring, keep-alive, pool, outcome routing
//! - [`restoration`] - Bag, single-file and cold-storage restoration jobs
//! - [`archive`] - Streaming tar writer and in-transit digests
//! - [`cold_storage`] - Signed cold-storage restore requests and status mapping
//! - [`fixity`] - Fixity verification of stored files
//! - [`messaging`], [`registry`], [`cache`], [`storage`] - Collaborator traits with
//!   in-memory implementations
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Crate error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use preservation_core::cache::InMemoryResultCache;
//! use preservation_core::cold_storage::InMemoryColdStorageClient;
//! use preservation_core::config::PreservationConfig;
//! use preservation_core::messaging::InMemoryMessagingService;
//! use preservation_core::registry::InMemoryRegistry;
//! use preservation_core::storage::ObjectStoreRegistry;
//! use preservation_core::worker::{RestorationWorker, WorkerContext, WorkerEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> preservation_core::Result<()> {
//! let config = PreservationConfig::default();
//! let ctx = WorkerContext::from_config(
//!     &config,
//!     Arc::new(InMemoryMessagingService::new()),
//!     Arc::new(InMemoryResultCache::new()),
//!     Arc::new(InMemoryRegistry::new()),
//!     Arc::new(ObjectStoreRegistry::new()),
//!     Arc::new(InMemoryColdStorageClient::new()),
//! );
//! let settings = config.worker("restore_object")?.clone();
//! let engine = Arc::new(WorkerEngine::new(
//!     settings,
//!     Arc::new(ctx),
//!     Arc::new(RestorationWorker::Object),
//! ));
//! let stats = engine.run(CancellationToken::new()).await?;
//! println!("restored {} items", stats.succeeded);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cache;
pub mod cold_storage;
pub mod config;
pub mod constants;
pub mod error;
pub mod fixity;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod registry;
pub mod restoration;
pub mod storage;
pub mod worker;

pub use config::PreservationConfig;
pub use constants::{Action, RestorationType, Stage, Status};
pub use error::{PreservationError, Result};
pub use models::{ProcessingError, RestorationObject, WorkItem, WorkResult};
pub use worker::{WorkerCapability, WorkerContext, WorkerEngine};

//! ClickUp task extraction engine
//!
//! Walks a workspace (or a single list), pages through every task and
//! writes one row per task to an output sink. Runs either continuously or
//! in time-boxed slices that checkpoint and resume where they stopped.
//!
//! ## Remote API
//! - `api` - the `ClickUpApi` trait every data source implements
//! - `client` - ClickUpClient (HTTP client)
//! - `fake` - FakeClickUp, an in-memory API for tests
//! - `retry` - retry loop with backoff and rate-limit cooldowns
//!
//! ## Extraction
//! - `fetcher` - PageFetcher, one page of tasks with a page ceiling
//! - `hierarchy` - HierarchyEnumerator, deterministic leaf order
//! - `resolver` - FieldResolver, display values for custom fields
//! - `schema` - SchemaRegistry, append-only output columns
//! - `rows` - RowBuilder, task to row
//! - `engine` - ExtractionEngine, the run state machine
//!
//! ## Collaborators
//! - `checkpoint` - Checkpoint and CheckpointStore implementations
//! - `sink` - OutputSink implementations
//! - `scheduler` - ResumeScheduler implementations
//! - `log_buffer` - bounded in-memory log for `tracing`
//! - `config` - ExtractConfig

pub mod api;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod fake;
pub mod fetcher;
pub mod hierarchy;
pub mod log_buffer;
mod persist;
pub mod resolver;
pub mod retry;
pub mod rows;
pub mod scheduler;
pub mod schema;
pub mod sink;

pub use api::{ClickUpApi, FetchResult};
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
    Position, PropertyBag, RunMode, RunTally,
};
pub use client::ClickUpClient;
pub use config::{ConfigError, ExtractConfig, ExtractionRoot, Locale, RetryPolicy};
pub use engine::{EngineState, ExtractionEngine, RunOutcome, RunSummary};
pub use error::{ExtractError, Result};
pub use fake::{FakeCall, FakeClickUp, FakeEndpoint};
pub use fetcher::{PageFetcher, TaskPage};
pub use hierarchy::{FolderNode, HierarchyEnumerator, Leaf, LeafPosition, Plan};
pub use log_buffer::LogBuffer;
pub use persist::PersistError;
pub use resolver::FieldResolver;
pub use rows::RowBuilder;
pub use scheduler::{RecordingScheduler, ResumeScheduler};
pub use schema::{SchemaRegistry, BASE_COLUMNS};
pub use sink::{CompletionStamp, JsonlSink, MemorySink, OutputSink, SinkError};

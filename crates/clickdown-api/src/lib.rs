//! Shared model for the ClickUp extraction engine
//!
//! This crate holds the types every other crate agrees on:
//!
//! - `hierarchy` - Team, Space, Folder and TaskList nodes plus task provenance
//! - `task` - Task records as returned by the task page endpoint
//! - `custom_field` - custom field records and their type tag
//! - `error` - transport-level errors raised by API implementations

pub mod custom_field;
pub mod error;
pub mod hierarchy;
pub mod task;

pub use custom_field::{CustomFieldValue, FieldType};
pub use error::FetchError;
pub use hierarchy::{Folder, NamedRef, Provenance, Space, TaskList, Team};
pub use task::{
    epoch_millis_to_utc, Priority, StatusCategory, Tag, Task, TaskPageResponse, TaskStatus, User,
};

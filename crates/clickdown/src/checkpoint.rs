//! Resumable traversal position and where it is kept between invocations
//!
//! A checkpoint names the next unit of work: the leaf indices, the archived
//! pass and the page to fetch. The resume rule is depth-first. A persisted
//! index applies only while every enclosing index still equals the persisted
//! one; as soon as the traversal moves to a sibling, the inner indices start
//! at zero again. A fresh run is simply the all-zero position.
//!
//! On disk the checkpoint is a flat string property bag, fully overwritten on
//! every save and removed once a run completes or fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::ExtractionRoot;
use crate::persist::{read_json_file, remove_if_exists, write_json_atomic, PersistError};

pub type PropertyBag = BTreeMap<String, String>;

const KEY_RUN_ID: &str = "run_id";
const KEY_MODE: &str = "mode";
const KEY_ROOT_ID: &str = "root_id";
const KEY_SPACE: &str = "space_index";
const KEY_FOLDER: &str = "folder_index";
const KEY_LIST: &str = "list_index";
const KEY_ARCHIVED: &str = "archived_index";
const KEY_PAGE: &str = "page_index";
const KEY_ROWS: &str = "rows_written";
const KEY_PAGES: &str = "pages_fetched";
const KEY_LISTS_DONE: &str = "lists_completed";
const KEY_LISTS_SKIPPED: &str = "lists_skipped";
const KEY_BRANCHES_SKIPPED: &str = "branches_skipped";
const KEY_INVOCATIONS: &str = "invocations";
const KEY_SAVED_AT: &str = "saved_at";

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Checkpoint is missing key '{key}'")]
    Missing { key: String },

    #[error("Checkpoint key '{key}' has invalid value '{value}'")]
    Malformed { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    SingleList,
    Workspace,
}

impl RunMode {
    pub fn for_root(root: &ExtractionRoot) -> Self {
        match root {
            ExtractionRoot::SingleList { .. } => RunMode::SingleList,
            ExtractionRoot::Workspace { .. } => RunMode::Workspace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::SingleList => "single_list",
            RunMode::Workspace => "workspace",
        }
    }
}

impl FromStr for RunMode {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_list" => Ok(RunMode::SingleList),
            "workspace" => Ok(RunMode::Workspace),
            other => Err(CheckpointError::Malformed {
                key: KEY_MODE.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Next unit of work. `archived` is 0 for the active pass, 1 for the archived one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub space: usize,
    pub folder: usize,
    pub list: usize,
    pub archived: usize,
    pub page: u32,
}

impl Position {
    pub fn is_start(&self) -> bool {
        *self == Position::default()
    }

    pub fn space_start(&self) -> usize {
        self.space
    }

    pub fn folder_start(&self, space: usize) -> usize {
        if space == self.space {
            self.folder
        } else {
            0
        }
    }

    pub fn list_start(&self, space: usize, folder: usize) -> usize {
        if (space, folder) == (self.space, self.folder) {
            self.list
        } else {
            0
        }
    }

    pub fn archived_start(&self, space: usize, folder: usize, list: usize) -> usize {
        if (space, folder, list) == (self.space, self.folder, self.list) {
            self.archived
        } else {
            0
        }
    }

    pub fn page_start(&self, space: usize, folder: usize, list: usize, archived: usize) -> u32 {
        if (space, folder, list, archived) == (self.space, self.folder, self.list, self.archived) {
            self.page
        } else {
            0
        }
    }
}

/// Counters accumulated across every invocation of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    pub rows_written: u64,
    pub pages_fetched: u64,
    pub lists_completed: u64,
    pub lists_skipped: u64,
    pub branches_skipped: u64,
    pub invocations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub root_id: String,
    pub position: Position,
    pub tally: RunTally,
    pub saved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn fresh(root: &ExtractionRoot) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode: RunMode::for_root(root),
            root_id: root.id().to_string(),
            position: Position::default(),
            tally: RunTally::default(),
            saved_at: None,
        }
    }

    /// Whether this checkpoint was written for `root`
    pub fn belongs_to(&self, root: &ExtractionRoot) -> bool {
        self.mode == RunMode::for_root(root) && self.root_id == root.id()
    }

    pub fn to_bag(&self) -> PropertyBag {
        let mut bag = PropertyBag::new();
        let mut put = |key: &str, value: String| {
            bag.insert(key.to_string(), value);
        };
        put(KEY_RUN_ID, self.run_id.to_string());
        put(KEY_MODE, self.mode.as_str().to_string());
        put(KEY_ROOT_ID, self.root_id.clone());
        put(KEY_SPACE, self.position.space.to_string());
        put(KEY_FOLDER, self.position.folder.to_string());
        put(KEY_LIST, self.position.list.to_string());
        put(KEY_ARCHIVED, self.position.archived.to_string());
        put(KEY_PAGE, self.position.page.to_string());
        put(KEY_ROWS, self.tally.rows_written.to_string());
        put(KEY_PAGES, self.tally.pages_fetched.to_string());
        put(KEY_LISTS_DONE, self.tally.lists_completed.to_string());
        put(KEY_LISTS_SKIPPED, self.tally.lists_skipped.to_string());
        put(KEY_BRANCHES_SKIPPED, self.tally.branches_skipped.to_string());
        put(KEY_INVOCATIONS, self.tally.invocations.to_string());
        if let Some(saved_at) = self.saved_at {
            put(KEY_SAVED_AT, saved_at.to_rfc3339());
        }
        bag
    }

    /// `None` for an empty bag, meaning no run is in progress
    pub fn from_bag(bag: &PropertyBag) -> Result<Option<Self>, CheckpointError> {
        if bag.is_empty() {
            return Ok(None);
        }

        let position = Position {
            space: parse(bag, KEY_SPACE)?,
            folder: parse(bag, KEY_FOLDER)?,
            list: parse(bag, KEY_LIST)?,
            archived: parse(bag, KEY_ARCHIVED)?,
            page: parse(bag, KEY_PAGE)?,
        };
        if position.archived > 1 {
            return Err(CheckpointError::Malformed {
                key: KEY_ARCHIVED.to_string(),
                value: position.archived.to_string(),
            });
        }

        // Counters are informational; older bags without them start from zero
        let tally = RunTally {
            rows_written: parse_or_zero(bag, KEY_ROWS)?,
            pages_fetched: parse_or_zero(bag, KEY_PAGES)?,
            lists_completed: parse_or_zero(bag, KEY_LISTS_DONE)?,
            lists_skipped: parse_or_zero(bag, KEY_LISTS_SKIPPED)?,
            branches_skipped: parse_or_zero(bag, KEY_BRANCHES_SKIPPED)?,
            invocations: parse_or_zero(bag, KEY_INVOCATIONS)?,
        };

        let saved_at = bag
            .get(KEY_SAVED_AT)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| malformed(KEY_SAVED_AT, raw))
            })
            .transpose()?;

        Ok(Some(Self {
            run_id: parse(bag, KEY_RUN_ID)?,
            mode: required(bag, KEY_MODE)?.parse()?,
            root_id: required(bag, KEY_ROOT_ID)?.to_string(),
            position,
            tally,
            saved_at,
        }))
    }
}

fn malformed(key: &str, value: &str) -> CheckpointError {
    CheckpointError::Malformed {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn required<'a>(bag: &'a PropertyBag, key: &str) -> Result<&'a str, CheckpointError> {
    bag.get(key)
        .map(String::as_str)
        .ok_or_else(|| CheckpointError::Missing {
            key: key.to_string(),
        })
}

fn parse<T: FromStr>(bag: &PropertyBag, key: &str) -> Result<T, CheckpointError> {
    let raw = required(bag, key)?;
    raw.trim().parse().map_err(|_| malformed(key, raw))
}

fn parse_or_zero(bag: &PropertyBag, key: &str) -> Result<u64, CheckpointError> {
    match bag.get(key) {
        Some(_) => parse(bag, key),
        None => Ok(0),
    }
}

/// Where the property bag lives between invocations
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored bag, empty when nothing is stored
    async fn load(&self) -> Result<PropertyBag, CheckpointError>;

    /// Replace the stored bag entirely
    async fn save(&self, bag: &PropertyBag) -> Result<(), CheckpointError>;

    async fn clear(&self) -> Result<(), CheckpointError>;
}

/// In-memory store. Clones share the same bag.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    bag: Arc<Mutex<PropertyBag>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PropertyBag> {
        self.bag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> PropertyBag {
        self.lock().clone()
    }

    /// Overwrite the bag directly, bypassing `Checkpoint`
    pub fn set(&self, bag: PropertyBag) {
        *self.lock() = bag;
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<PropertyBag, CheckpointError> {
        Ok(self.snapshot())
    }

    async fn save(&self, bag: &PropertyBag) -> Result<(), CheckpointError> {
        self.set(bag.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        self.lock().clear();
        Ok(())
    }
}

/// Property bag stored as a JSON object in a single file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<PropertyBag, CheckpointError> {
        Ok(read_json_file(&self.path).await?.unwrap_or_default())
    }

    async fn save(&self, bag: &PropertyBag) -> Result<(), CheckpointError> {
        write_json_atomic(&self.path, bag).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        remove_if_exists(&self.path).await?;
        Ok(())
    }
}

//! Output columns: a fixed base set followed by custom fields in discovery order
//!
//! Columns are only ever appended. An index, once handed out, refers to the
//! same column for the rest of the run, so rows written before a column was
//! discovered stay valid; they are simply shorter than the final header.

use std::collections::HashMap;

pub const COL_ID: &str = "ID";
pub const COL_NAME: &str = "Name";
pub const COL_URL: &str = "URL";
pub const COL_STATUS: &str = "Status";
pub const COL_STATUS_TYPE: &str = "Status Type";
pub const COL_PRIORITY: &str = "Priority";
pub const COL_ASSIGNEES: &str = "Assignees";
pub const COL_TAGS: &str = "Tags";
pub const COL_DUE_DATE: &str = "Due Date";
pub const COL_DATE_CREATED: &str = "Date Created";
pub const COL_DATE_UPDATED: &str = "Date Updated";
pub const COL_DATE_CLOSED: &str = "Date Closed";
pub const COL_DATE_DONE: &str = "Date Done";
pub const COL_TIME_ESTIMATE: &str = "Time Estimate (h)";
pub const COL_TIME_SPENT: &str = "Time Tracked (h)";
pub const COL_SPACE: &str = "Space";
pub const COL_FOLDER: &str = "Folder";
pub const COL_LIST: &str = "List";
pub const COL_DESCRIPTION: &str = "Description";

pub const BASE_COLUMNS: [&str; 19] = [
    COL_ID,
    COL_NAME,
    COL_URL,
    COL_STATUS,
    COL_STATUS_TYPE,
    COL_PRIORITY,
    COL_ASSIGNEES,
    COL_TAGS,
    COL_DUE_DATE,
    COL_DATE_CREATED,
    COL_DATE_UPDATED,
    COL_DATE_CLOSED,
    COL_DATE_DONE,
    COL_TIME_ESTIMATE,
    COL_TIME_SPENT,
    COL_SPACE,
    COL_FOLDER,
    COL_LIST,
    COL_DESCRIPTION,
];

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    /// Columns already written to the sink's header
    announced: usize,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Base columns only, none of them announced yet
    pub fn new() -> Self {
        let mut registry = Self {
            columns: Vec::new(),
            index: HashMap::new(),
            announced: 0,
        };
        for column in BASE_COLUMNS {
            registry.observe(column);
        }
        registry
    }

    /// Rebuild from a header already present in the sink. Every header column
    /// keeps its position; base columns missing from it are appended and
    /// left unannounced.
    pub fn from_header(header: &[String]) -> Self {
        let mut registry = Self {
            columns: Vec::new(),
            index: HashMap::new(),
            announced: 0,
        };
        for column in header {
            registry.observe(column);
        }
        registry.announced = registry.columns.len();
        for column in BASE_COLUMNS {
            registry.observe(column);
        }
        registry
    }

    /// Index of `name`, appending it if unseen
    pub fn observe(&mut self, name: &str) -> usize {
        if let Some(&index) = self.index.get(name) {
            return index;
        }
        let index = self.columns.len();
        self.columns.push(name.to_string());
        self.index.insert(name.to_string(), index);
        index
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns discovered since the last `mark_announced`
    pub fn unannounced(&self) -> &[String] {
        &self.columns[self.announced..]
    }

    pub fn mark_announced(&mut self) {
        self.announced = self.columns.len();
    }
}

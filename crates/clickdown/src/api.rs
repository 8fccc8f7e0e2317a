//! The seam between the engine and the remote task-hierarchy API
//!
//! `ClickUpClient` talks HTTP; `FakeClickUp` serves an in-memory hierarchy
//! for tests. Both are read-only.

use async_trait::async_trait;
use clickdown_api::{Folder, FetchError, Space, TaskList, TaskPageResponse, Team};

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[async_trait]
pub trait ClickUpApi: Send + Sync {
    async fn teams(&self) -> FetchResult<Vec<Team>>;

    async fn spaces(&self, team_id: &str) -> FetchResult<Vec<Space>>;

    async fn folders(&self, space_id: &str) -> FetchResult<Vec<Folder>>;

    async fn folder_lists(&self, folder_id: &str) -> FetchResult<Vec<TaskList>>;

    /// Lists owned directly by a space
    async fn folderless_lists(&self, space_id: &str) -> FetchResult<Vec<TaskList>>;

    async fn list(&self, list_id: &str) -> FetchResult<TaskList>;

    /// One page of tasks. `page` is zero-based.
    async fn task_page(
        &self,
        list_id: &str,
        archived: bool,
        page: u32,
    ) -> FetchResult<TaskPageResponse>;
}

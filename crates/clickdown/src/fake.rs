//! In-memory stand-in for the ClickUp API
//!
//! FakeClickUp serves a hierarchy built through its `add_*` methods and pages
//! tasks the way the real endpoint does. It can also:
//! - fail an endpoint always, or for the next N calls (scripted failures)
//! - delay every call by a fixed latency (pairs with paused tokio time)
//! - record every call for later assertions

use async_trait::async_trait;
use clickdown_api::{
    CustomFieldValue, FetchError, FieldType, Folder, NamedRef, Space, StatusCategory, Task,
    TaskList, TaskPageResponse, TaskStatus, Team,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{ClickUpApi, FetchResult};

/// Endpoint selector for failure injection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FakeEndpoint {
    Spaces(String),
    Folders(String),
    FolderLists(String),
    FolderlessLists(String),
    List(String),
    Tasks(String),
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Teams,
    Spaces(String),
    Folders(String),
    FolderLists(String),
    FolderlessLists(String),
    List(String),
    TaskPage {
        list_id: String,
        archived: bool,
        page: u32,
    },
}

#[derive(Default)]
struct FakeState {
    teams: Vec<Team>,
    spaces: HashMap<String, Vec<Space>>,
    folders: HashMap<String, Vec<Folder>>,
    folder_lists: HashMap<String, Vec<TaskList>>,
    folderless_lists: HashMap<String, Vec<TaskList>>,
    tasks: HashMap<(String, bool), Vec<Task>>,
    always_fail: HashMap<FakeEndpoint, FetchError>,
    fail_next: HashMap<FakeEndpoint, VecDeque<FetchError>>,
    calls: Vec<FakeCall>,
}

pub struct FakeClickUp {
    state: Mutex<FakeState>,
    page_size: usize,
    latency: Duration,
    reports_last_page: bool,
}

impl Default for FakeClickUp {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClickUp {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            page_size: 100,
            latency: Duration::ZERO,
            reports_last_page: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Task pages carry `last_page`, true once the final task has been served
    pub fn with_last_page_hint(mut self) -> Self {
        self.reports_last_page = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // A panic in another test thread must not cascade into this one
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_team(&self, id: &str, name: &str) {
        self.lock().teams.push(Team {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
        });
    }

    pub fn add_space(&self, team_id: &str, id: &str, name: &str) {
        self.lock()
            .spaces
            .entry(team_id.to_string())
            .or_default()
            .push(Space {
                id: id.to_string(),
                name: name.to_string(),
                private: None,
            });
    }

    pub fn add_folder(&self, space_id: &str, id: &str, name: &str) {
        self.lock()
            .folders
            .entry(space_id.to_string())
            .or_default()
            .push(Folder {
                id: id.to_string(),
                name: name.to_string(),
                hidden: None,
            });
    }

    pub fn add_folder_list(&self, folder_id: &str, id: &str, name: &str) {
        self.lock()
            .folder_lists
            .entry(folder_id.to_string())
            .or_default()
            .push(task_list(id, name));
    }

    pub fn add_folderless_list(&self, space_id: &str, id: &str, name: &str) {
        self.lock()
            .folderless_lists
            .entry(space_id.to_string())
            .or_default()
            .push(task_list(id, name));
    }

    pub fn push_task(&self, list_id: &str, archived: bool, task: Task) {
        self.lock()
            .tasks
            .entry((list_id.to_string(), archived))
            .or_default()
            .push(task);
    }

    /// Add `count` generated tasks with ids `<list>-<a|x>-<n>`
    pub fn add_tasks(&self, list_id: &str, archived: bool, count: usize) {
        let marker = if archived { "x" } else { "a" };
        let mut state = self.lock();
        let tasks = state
            .tasks
            .entry((list_id.to_string(), archived))
            .or_default();
        let offset = tasks.len();
        for n in offset..offset + count {
            let id = format!("{}-{}-{}", list_id, marker, n);
            tasks.push(fake_task(&id, &format!("Task {}", id)));
        }
    }

    pub fn fail_always(&self, endpoint: FakeEndpoint, error: FetchError) {
        self.lock().always_fail.insert(endpoint, error);
    }

    /// Fail the next calls to `endpoint` with `errors`, in order
    pub fn fail_next(&self, endpoint: FakeEndpoint, errors: Vec<FetchError>) {
        self.lock()
            .fail_next
            .entry(endpoint)
            .or_default()
            .extend(errors);
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    pub fn task_page_calls(&self) -> Vec<(String, bool, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                FakeCall::TaskPage {
                    list_id,
                    archived,
                    page,
                } => Some((list_id, archived, page)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    async fn enter(&self, call: FakeCall, endpoint: Option<FakeEndpoint>) -> FetchResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.lock();
        state.calls.push(call);
        let Some(endpoint) = endpoint else {
            return Ok(());
        };
        if let Some(queue) = state.fail_next.get_mut(&endpoint) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        match state.always_fail.get(&endpoint) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClickUpApi for FakeClickUp {
    async fn teams(&self) -> FetchResult<Vec<Team>> {
        self.enter(FakeCall::Teams, None).await?;
        Ok(self.lock().teams.clone())
    }

    async fn spaces(&self, team_id: &str) -> FetchResult<Vec<Space>> {
        self.enter(
            FakeCall::Spaces(team_id.to_string()),
            Some(FakeEndpoint::Spaces(team_id.to_string())),
        )
        .await?;
        Ok(self.lock().spaces.get(team_id).cloned().unwrap_or_default())
    }

    async fn folders(&self, space_id: &str) -> FetchResult<Vec<Folder>> {
        self.enter(
            FakeCall::Folders(space_id.to_string()),
            Some(FakeEndpoint::Folders(space_id.to_string())),
        )
        .await?;
        Ok(self.lock().folders.get(space_id).cloned().unwrap_or_default())
    }

    async fn folder_lists(&self, folder_id: &str) -> FetchResult<Vec<TaskList>> {
        self.enter(
            FakeCall::FolderLists(folder_id.to_string()),
            Some(FakeEndpoint::FolderLists(folder_id.to_string())),
        )
        .await?;
        Ok(self
            .lock()
            .folder_lists
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn folderless_lists(&self, space_id: &str) -> FetchResult<Vec<TaskList>> {
        self.enter(
            FakeCall::FolderlessLists(space_id.to_string()),
            Some(FakeEndpoint::FolderlessLists(space_id.to_string())),
        )
        .await?;
        Ok(self
            .lock()
            .folderless_lists
            .get(space_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list(&self, list_id: &str) -> FetchResult<TaskList> {
        self.enter(
            FakeCall::List(list_id.to_string()),
            Some(FakeEndpoint::List(list_id.to_string())),
        )
        .await?;
        let state = self.lock();

        let in_folder = state.folder_lists.iter().find_map(|(folder_id, lists)| {
            lists
                .iter()
                .find(|l| l.id == list_id)
                .map(|l| (Some(folder_id.clone()), l.clone()))
        });
        let found = in_folder.or_else(|| {
            state.folderless_lists.values().find_map(|lists| {
                lists.iter().find(|l| l.id == list_id).map(|l| (None, l.clone()))
            })
        });

        let Some((folder_id, mut list)) = found else {
            return Err(FetchError::Http {
                status: 404,
                message: format!("List {} not found", list_id),
            });
        };

        if let Some(folder_id) = folder_id {
            let folder = state
                .folders
                .values()
                .flatten()
                .find(|f| f.id == folder_id);
            list.folder = Some(NamedRef {
                id: folder_id.clone(),
                name: folder.map(|f| f.name.clone()),
            });
        }
        Ok(list)
    }

    async fn task_page(
        &self,
        list_id: &str,
        archived: bool,
        page: u32,
    ) -> FetchResult<TaskPageResponse> {
        self.enter(
            FakeCall::TaskPage {
                list_id: list_id.to_string(),
                archived,
                page,
            },
            Some(FakeEndpoint::Tasks(list_id.to_string())),
        )
        .await?;

        let state = self.lock();
        let all = state
            .tasks
            .get(&(list_id.to_string(), archived))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let start = (page as usize).saturating_mul(self.page_size).min(all.len());
        let end = start.saturating_add(self.page_size).min(all.len());

        Ok(TaskPageResponse {
            tasks: all[start..end].to_vec(),
            last_page: self.reports_last_page.then_some(end == all.len()),
        })
    }
}

fn task_list(id: &str, name: &str) -> TaskList {
    TaskList {
        id: id.to_string(),
        name: name.to_string(),
        folder: None,
        space: None,
    }
}

/// A minimal open task with no custom fields
pub fn fake_task(id: &str, name: &str) -> Task {
    Task {
        id: id.to_string(),
        custom_id: None,
        name: name.to_string(),
        text_content: None,
        description: None,
        status: TaskStatus {
            status: "to do".to_string(),
            color: Some("#d3d3d3".to_string()),
            category: StatusCategory::Open,
        },
        priority: None,
        date_created: Some("1700000000000".to_string()),
        date_updated: None,
        date_closed: None,
        date_done: None,
        due_date: None,
        start_date: None,
        assignees: Vec::new(),
        tags: Vec::new(),
        time_estimate: None,
        time_spent: None,
        custom_fields: Vec::new(),
        url: Some(format!("https://app.clickup.com/t/{}", id)),
        provenance: Default::default(),
    }
}

/// A custom field record with the given type tag and raw value
pub fn fake_field(name: &str, field_type: FieldType, value: serde_json::Value) -> CustomFieldValue {
    CustomFieldValue {
        id: format!("cf-{}", name.to_lowercase().replace(' ', "-")),
        name: name.to_string(),
        field_type,
        type_config: serde_json::Value::Null,
        value: Some(value),
    }
}

//! Deterministic traversal of workspace -> space -> folder -> list
//!
//! Leaf order is the contract checkpoints rely on:
//! - spaces in API order
//! - within a space, the folderless bucket first (index 0), then real folders
//!   in API order
//! - within a folder, lists in API order
//!
//! A failed folder or list listing is logged and counted, never propagated:
//! the branch is skipped and its siblings are still visited.

use clickdown_api::{Folder, Provenance, Space, TaskList};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::ClickUpApi;
use crate::config::{ExtractConfig, ExtractionRoot, RetryPolicy};
use crate::error::{ExtractError, Result};
use crate::retry::call_with_retry;

const UNKNOWN_NAME: &str = "-";

/// A folder, or the synthetic bucket holding a space's folderless lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderNode {
    Folderless { space_id: String, label: String },
    Folder(Folder),
}

impl FolderNode {
    pub fn name(&self) -> &str {
        match self {
            FolderNode::Folderless { label, .. } => label,
            FolderNode::Folder(folder) => &folder.name,
        }
    }

    fn describe(&self) -> String {
        match self {
            FolderNode::Folderless { space_id, .. } => format!("folderless lists of space {}", space_id),
            FolderNode::Folder(folder) => format!("lists of folder {} ({})", folder.id, folder.name),
        }
    }
}

/// Index of a leaf in traversal order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafPosition {
    pub space: usize,
    pub folder: usize,
    pub list: usize,
}

/// A list to fetch tasks from, with the names of its ancestors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub position: LeafPosition,
    pub list: TaskList,
    pub provenance: Provenance,
}

/// Children of one node plus how many branches had to be skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub skipped_branches: usize,
}

impl<T> Listing<T> {
    fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            skipped_branches: 0,
        }
    }
}

/// The full ordered leaf sequence under a root
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub leaves: Vec<Leaf>,
    pub skipped_branches: usize,
}

pub struct HierarchyEnumerator {
    api: Arc<dyn ClickUpApi>,
    policy: RetryPolicy,
    folderless_label: String,
}

impl HierarchyEnumerator {
    pub fn new(api: Arc<dyn ClickUpApi>, config: &ExtractConfig) -> Self {
        Self {
            api,
            policy: config.retry.clone(),
            folderless_label: config.folderless_label.clone(),
        }
    }

    /// Spaces of a team. Without them there is nothing to traverse, so a
    /// failure here is returned to the caller.
    pub async fn spaces(&self, team_id: &str) -> Result<Vec<Space>> {
        let what = format!("spaces of team {}", team_id);
        let api = &self.api;
        call_with_retry(&self.policy, &what, || api.spaces(team_id))
            .await
            .map_err(|source| ExtractError::Structural { node: what, source })
    }

    /// The synthetic folder holding lists that sit directly under `space`
    pub fn bucket(&self, space: &Space) -> FolderNode {
        FolderNode::Folderless {
            space_id: space.id.clone(),
            label: self.folderless_label.clone(),
        }
    }

    /// Real folders of a space, without the bucket
    pub async fn real_folders(&self, space: &Space) -> Listing<FolderNode> {
        let what = format!("folders of space {} ({})", space.id, space.name);
        let api = &self.api;
        match call_with_retry(&self.policy, &what, || api.folders(&space.id)).await {
            Ok(folders) => Listing::complete(folders.into_iter().map(FolderNode::Folder).collect()),
            Err(source) => {
                warn!("[HierarchyEnumerator] skipping {}: {}", what, source);
                Listing {
                    items: Vec::new(),
                    skipped_branches: 1,
                }
            }
        }
    }

    /// The folderless bucket followed by the space's folders
    pub async fn folders(&self, space: &Space) -> Listing<FolderNode> {
        let mut listing = self.real_folders(space).await;
        listing.items.insert(0, self.bucket(space));
        listing
    }

    pub async fn lists(&self, folder: &FolderNode) -> Listing<TaskList> {
        let what = folder.describe();
        let api = &self.api;
        let result = match folder {
            FolderNode::Folderless { space_id, .. } => {
                call_with_retry(&self.policy, &what, || api.folderless_lists(space_id)).await
            }
            FolderNode::Folder(f) => {
                call_with_retry(&self.policy, &what, || api.folder_lists(&f.id)).await
            }
        };

        match result {
            Ok(lists) => Listing::complete(lists),
            Err(source) => {
                warn!("[HierarchyEnumerator] skipping {}: {}", what, source);
                Listing {
                    items: Vec::new(),
                    skipped_branches: 1,
                }
            }
        }
    }

    /// The one leaf of a single-list run. Ancestor names come from the list
    /// record when the API returns them; a failed lookup falls back to
    /// placeholders and is reported as a skipped branch.
    pub async fn single_list(&self, list_id: &str) -> (Leaf, usize) {
        let what = format!("list {}", list_id);
        let api = &self.api;
        match call_with_retry(&self.policy, &what, || api.list(list_id)).await {
            Ok(list) => {
                let folder = list
                    .folder
                    .as_ref()
                    .and_then(|f| f.name.clone())
                    .filter(|name| !name.is_empty() && name != "hidden")
                    .unwrap_or_else(|| self.folderless_label.clone());
                let space = list
                    .space
                    .as_ref()
                    .and_then(|s| s.name.clone())
                    .unwrap_or_else(|| UNKNOWN_NAME.to_string());
                let provenance = Provenance::new(space, folder, list.name.clone());
                (
                    Leaf {
                        position: LeafPosition::default(),
                        list,
                        provenance,
                    },
                    0,
                )
            }
            Err(source) => {
                warn!(
                    "[HierarchyEnumerator] could not read {}, using placeholder names: {}",
                    what, source
                );
                let list = TaskList {
                    id: list_id.to_string(),
                    name: list_id.to_string(),
                    folder: None,
                    space: None,
                };
                let provenance = Provenance::new(UNKNOWN_NAME, UNKNOWN_NAME, list_id);
                (
                    Leaf {
                        position: LeafPosition::default(),
                        list,
                        provenance,
                    },
                    1,
                )
            }
        }
    }

    /// Walk the whole hierarchy eagerly and return every leaf in order
    pub async fn leaves(&self, root: &ExtractionRoot) -> Result<Plan> {
        match root {
            ExtractionRoot::SingleList { list_id } => {
                let (leaf, skipped_branches) = self.single_list(list_id).await;
                Ok(Plan {
                    leaves: vec![leaf],
                    skipped_branches,
                })
            }
            ExtractionRoot::Workspace { team_id } => {
                let mut plan = Plan::default();
                let spaces = self.spaces(team_id).await?;
                for (s, space) in spaces.iter().enumerate() {
                    let folders = self.folders(space).await;
                    plan.skipped_branches += folders.skipped_branches;
                    for (f, folder) in folders.items.iter().enumerate() {
                        let lists = self.lists(folder).await;
                        plan.skipped_branches += lists.skipped_branches;
                        for (l, list) in lists.items.into_iter().enumerate() {
                            plan.leaves.push(Leaf {
                                position: LeafPosition {
                                    space: s,
                                    folder: f,
                                    list: l,
                                },
                                provenance: Provenance::new(&space.name, folder.name(), &list.name),
                                list,
                            });
                        }
                    }
                }
                info!(
                    "[HierarchyEnumerator] team {}: {} leaves, {} branches skipped",
                    team_id,
                    plan.leaves.len(),
                    plan.skipped_branches
                );
                Ok(plan)
            }
        }
    }
}

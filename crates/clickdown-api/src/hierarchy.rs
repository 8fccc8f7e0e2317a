use serde::{Deserialize, Serialize};

/// A ClickUp team (the API's name for a workspace)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub private: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hidden: Option<bool>,
}

/// Minimal `{id, name}` reference embedded in other records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A list: the only node that owns tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub id: String,
    pub name: String,
    /// Owning folder as reported by `GET /list/{id}`. Folderless lists report
    /// a hidden placeholder folder here.
    #[serde(default)]
    pub folder: Option<NamedRef>,
    #[serde(default)]
    pub space: Option<NamedRef>,
}

/// Where a task was found. Attached by the engine at discovery time since
/// the task endpoint does not return this context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub space: String,
    pub folder: String,
    pub list: String,
}

impl Provenance {
    pub fn new(
        space: impl Into<String>,
        folder: impl Into<String>,
        list: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            folder: folder.into(),
            list: list.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_with_embedded_refs() {
        let json = r#"{
            "id": "901",
            "name": "Backlog",
            "folder": {"id": "77", "name": "Engineering", "hidden": false},
            "space": {"id": "12"}
        }"#;
        let list: TaskList = serde_json::from_str(json).unwrap();
        assert_eq!(list.folder.unwrap().name.as_deref(), Some("Engineering"));
        assert_eq!(list.space.unwrap().name, None);
    }
}

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::custom_field::CustomFieldValue;
use crate::hierarchy::Provenance;

/// One page of `GET /list/{id}/task`
#[derive(Debug, Default, Deserialize)]
pub struct TaskPageResponse {
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Set by the API on the final page of some lists. Absent on most responses.
    #[serde(default)]
    pub last_page: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub custom_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Option<Priority>,

    // Epoch milliseconds. The API sends these as strings, occasionally as numbers.
    #[serde(default, deserialize_with = "opt_lenient_string")]
    pub date_created: Option<String>,
    #[serde(default, deserialize_with = "opt_lenient_string")]
    pub date_updated: Option<String>,
    #[serde(default, deserialize_with = "opt_lenient_string")]
    pub date_closed: Option<String>,
    #[serde(default, deserialize_with = "opt_lenient_string")]
    pub date_done: Option<String>,
    #[serde(default, deserialize_with = "opt_lenient_string")]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "opt_lenient_string")]
    pub start_date: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub assignees: Vec<User>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,

    /// Milliseconds
    #[serde(default, deserialize_with = "opt_lenient_i64")]
    pub time_estimate: Option<i64>,
    /// Milliseconds
    #[serde(default, deserialize_with = "opt_lenient_i64")]
    pub time_spent: Option<i64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_fields: Vec<CustomFieldValue>,
    #[serde(default)]
    pub url: Option<String>,

    #[serde(skip)]
    pub provenance: Provenance,
}

impl Task {
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(rename = "type", default)]
    pub category: StatusCategory,
}

/// Lifecycle category of a status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    Open,
    Closed,
    #[default]
    Other,
}

impl StatusCategory {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "open" => StatusCategory::Open,
            "closed" | "done" => StatusCategory::Closed,
            _ => StatusCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Open => "open",
            StatusCategory::Closed => "closed",
            StatusCategory::Other => "other",
        }
    }
}

impl<'de> Deserialize<'de> for StatusCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = Option::<String>::deserialize(deserializer)?;
        Ok(tag
            .map(|t| StatusCategory::from_tag(&t))
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Priority {
    pub priority: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// Interpret an epoch-milliseconds string as a UTC timestamp
pub fn epoch_millis_to_utc(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value).unwrap_or_default())
}

fn opt_lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value))
}

fn opt_lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_from_api_payload() {
        let json = r##"{
            "id": "86abc",
            "name": "Write report",
            "status": {"status": "in progress", "color": "#d3d3d3", "type": "custom"},
            "priority": null,
            "date_created": "1700000000000",
            "date_updated": 1700000500000,
            "date_closed": null,
            "assignees": [{"id": 183, "username": "ana"}],
            "tags": null,
            "time_spent": "3600000",
            "custom_fields": [
                {"id": "cf1", "name": "Team", "type": "drop_down", "type_config": {}, "value": 0}
            ],
            "url": "https://app.clickup.com/t/86abc"
        }"##;

        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.date_created.as_deref(), Some("1700000000000"));
        assert_eq!(task.date_updated.as_deref(), Some("1700000500000"));
        assert_eq!(task.date_closed, None);
        assert_eq!(task.assignees[0].id, "183");
        assert!(task.tags.is_empty());
        assert_eq!(task.time_spent, Some(3_600_000));
        assert_eq!(task.status.category, StatusCategory::Other);
        assert_eq!(task.custom_fields.len(), 1);
        assert_eq!(task.provenance, Provenance::default());
    }

    #[test]
    fn test_status_category_mapping() {
        assert_eq!(StatusCategory::from_tag("open"), StatusCategory::Open);
        assert_eq!(StatusCategory::from_tag("done"), StatusCategory::Closed);
        assert_eq!(StatusCategory::from_tag("closed"), StatusCategory::Closed);
        assert_eq!(StatusCategory::from_tag("custom"), StatusCategory::Other);
    }

    #[test]
    fn test_user_display_falls_back_to_id() {
        let user = User {
            id: "42".to_string(),
            username: Some(String::new()),
            email: None,
        };
        assert_eq!(user.display_name(), "42");
    }

    #[test]
    fn test_epoch_millis_to_utc() {
        let ts = epoch_millis_to_utc("0").unwrap();
        assert_eq!(ts.timestamp(), 0);
        assert!(epoch_millis_to_utc("not a date").is_none());
    }
}

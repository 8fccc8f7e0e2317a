use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A custom field attached to a task, with its raw value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Type-specific configuration (dropdown options, rating scale, ...)
    #[serde(default)]
    pub type_config: serde_json::Value,
    /// Raw value. Its shape depends on `field_type`.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Declared type of a custom field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Dropdown,
    Labels,
    Users,
    Date,
    Checkbox,
    Rating,
    Location,
    ListRelationship,
    TaskRelationship,
    /// Any tag without dedicated handling; the original tag is kept
    Other(String),
}

impl FieldType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "drop_down" | "dropdown" => FieldType::Dropdown,
            "labels" => FieldType::Labels,
            "users" => FieldType::Users,
            "date" => FieldType::Date,
            "checkbox" => FieldType::Checkbox,
            "emoji" | "rating" => FieldType::Rating,
            "location" => FieldType::Location,
            "list_relationship" => FieldType::ListRelationship,
            "tasks" | "task_relationship" => FieldType::TaskRelationship,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            FieldType::Dropdown => "drop_down",
            FieldType::Labels => "labels",
            FieldType::Users => "users",
            FieldType::Date => "date",
            FieldType::Checkbox => "checkbox",
            FieldType::Rating => "emoji",
            FieldType::Location => "location",
            FieldType::ListRelationship => "list_relationship",
            FieldType::TaskRelationship => "tasks",
            FieldType::Other(tag) => tag,
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(FieldType::from_tag(&tag))
    }
}

use clickdown_api::{epoch_millis_to_utc, Task};
use std::fmt::Write;
use tracing::debug;

use crate::config::ExtractConfig;
use crate::resolver::FieldResolver;
use crate::schema::*;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Flattens tasks into rows aligned with a `SchemaRegistry`
#[derive(Debug, Clone)]
pub struct RowBuilder {
    resolver: FieldResolver,
    description_limit: usize,
    date_format: String,
}

impl RowBuilder {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            resolver: FieldResolver::new(config.locale.clone()),
            description_limit: config.description_limit,
            date_format: config.locale.date_format.clone(),
        }
    }

    /// One row for `task`. Custom fields not yet in `schema` are added to it,
    /// so the row is exactly `schema.len()` cells wide on return.
    pub fn build(&self, task: &Task, schema: &mut SchemaRegistry) -> Vec<String> {
        let mut row = vec![String::new(); schema.len()];

        let assignees = task
            .assignees
            .iter()
            .map(|u| u.display_name())
            .collect::<Vec<_>>()
            .join(", ");
        let tags = task
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let description = task
            .text_content
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(task.description.as_deref())
            .unwrap_or_default();

        let base = [
            (COL_ID, task.id.clone()),
            (COL_NAME, task.name.clone()),
            (COL_URL, task.url.clone().unwrap_or_default()),
            (COL_STATUS, task.status.status.clone()),
            (COL_STATUS_TYPE, task.status.category.as_str().to_string()),
            (
                COL_PRIORITY,
                task.priority
                    .as_ref()
                    .map(|p| p.priority.clone())
                    .unwrap_or_default(),
            ),
            (COL_ASSIGNEES, assignees),
            (COL_TAGS, tags),
            (COL_DUE_DATE, self.date_cell(task.due_date.as_deref())),
            (COL_DATE_CREATED, self.date_cell(task.date_created.as_deref())),
            (COL_DATE_UPDATED, self.date_cell(task.date_updated.as_deref())),
            (COL_DATE_CLOSED, self.date_cell(task.date_closed.as_deref())),
            (COL_DATE_DONE, self.date_cell(task.date_done.as_deref())),
            (COL_TIME_ESTIMATE, hours_cell(task.time_estimate)),
            (COL_TIME_SPENT, hours_cell(task.time_spent)),
            (COL_SPACE, task.provenance.space.clone()),
            (COL_FOLDER, task.provenance.folder.clone()),
            (COL_LIST, task.provenance.list.clone()),
            (COL_DESCRIPTION, truncate_chars(description, self.description_limit)),
        ];
        for (column, value) in base {
            put(schema, &mut row, column, value);
        }

        // Keyed by field name: two fields sharing a name share a column.
        // A field named like a base column never replaces the task's own cell.
        for field in &task.custom_fields {
            if BASE_COLUMNS.contains(&field.name.as_str()) {
                debug!(
                    "[RowBuilder] task {}: custom field {:?} shadows a base column, skipped",
                    task.id, field.name
                );
                continue;
            }
            let value = self.resolver.resolve(field);
            put(schema, &mut row, &field.name, value);
        }

        row
    }

    fn date_cell(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return String::new();
        };
        match epoch_millis_to_utc(raw) {
            Some(timestamp) => {
                let mut out = String::new();
                match write!(out, "{}", timestamp.format(&self.date_format)) {
                    Ok(()) => out,
                    Err(_) => raw.to_string(),
                }
            }
            None => raw.to_string(),
        }
    }
}

fn put(schema: &mut SchemaRegistry, row: &mut Vec<String>, column: &str, value: String) {
    let index = schema.observe(column);
    if index >= row.len() {
        row.resize(index + 1, String::new());
    }
    row[index] = value;
}

fn hours_cell(millis: Option<i64>) -> String {
    millis
        .map(|ms| format!("{:.2}", ms as f64 / MILLIS_PER_HOUR))
        .unwrap_or_default()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{fake_field, fake_task};
    use clickdown_api::{FieldType, Provenance, Tag, User};
    use serde_json::json;

    fn cell<'a>(schema: &SchemaRegistry, row: &'a [String], column: &str) -> &'a str {
        &row[schema.index_of(column).unwrap()]
    }

    #[test]
    fn test_base_cells() {
        let mut task = fake_task("t1", "Write docs")
            .with_provenance(Provenance::new("Ops", "Eng", "Backlog"));
        task.assignees = vec![User {
            id: "7".to_string(),
            username: Some("ana".to_string()),
            email: None,
        }];
        task.tags = vec![
            Tag {
                name: "docs".to_string(),
            },
            Tag {
                name: "q4".to_string(),
            },
        ];
        task.time_estimate = Some(5_400_000);

        let builder = RowBuilder::new(&ExtractConfig::default());
        let mut schema = SchemaRegistry::new();
        let row = builder.build(&task, &mut schema);

        assert_eq!(row.len(), BASE_COLUMNS.len());
        assert_eq!(cell(&schema, &row, COL_ID), "t1");
        assert_eq!(cell(&schema, &row, COL_STATUS_TYPE), "open");
        assert_eq!(cell(&schema, &row, COL_ASSIGNEES), "ana");
        assert_eq!(cell(&schema, &row, COL_TAGS), "docs, q4");
        assert_eq!(cell(&schema, &row, COL_DATE_CREATED), "14/11/2023");
        assert_eq!(cell(&schema, &row, COL_TIME_ESTIMATE), "1.50");
        assert_eq!(cell(&schema, &row, COL_TIME_SPENT), "");
        assert_eq!(cell(&schema, &row, COL_FOLDER), "Eng");
    }

    #[test]
    fn test_custom_fields_grow_the_schema() {
        let builder = RowBuilder::new(&ExtractConfig::default());
        let mut schema = SchemaRegistry::new();

        let first = builder.build(&fake_task("t1", "a"), &mut schema);
        let mut second_task = fake_task("t2", "b");
        second_task.custom_fields = vec![fake_field("Sprint", FieldType::Other("text".into()), json!("S12"))];
        let second = builder.build(&second_task, &mut schema);

        assert_eq!(first.len(), BASE_COLUMNS.len());
        assert_eq!(second.len(), BASE_COLUMNS.len() + 1);
        assert_eq!(cell(&schema, &second, "Sprint"), "S12");
    }

    #[test]
    fn test_custom_field_cannot_replace_a_base_cell() {
        let mut task = fake_task("t1", "a");
        task.custom_fields = vec![
            fake_field(COL_STATUS, FieldType::Other("text".into()), json!("shadow")),
            fake_field(COL_ID, FieldType::Other("text".into()), json!("other-id")),
        ];

        let mut schema = SchemaRegistry::new();
        let row = RowBuilder::new(&ExtractConfig::default()).build(&task, &mut schema);

        assert_eq!(row.len(), BASE_COLUMNS.len());
        assert_eq!(cell(&schema, &row, COL_ID), "t1");
        assert_eq!(cell(&schema, &row, COL_STATUS), task.status.status);
    }

    #[test]
    fn test_description_is_truncated_on_char_boundary() {
        let config = ExtractConfig {
            description_limit: 3,
            ..ExtractConfig::default()
        };
        let mut task = fake_task("t1", "a");
        task.description = Some("ação!".to_string());

        let mut schema = SchemaRegistry::new();
        let row = RowBuilder::new(&config).build(&task, &mut schema);
        assert_eq!(cell(&schema, &row, COL_DESCRIPTION), "açã");
    }

    #[test]
    fn test_unparseable_date_is_kept() {
        let mut task = fake_task("t1", "a");
        task.due_date = Some("soon".to_string());
        let mut schema = SchemaRegistry::new();
        let row = RowBuilder::new(&ExtractConfig::default()).build(&task, &mut schema);
        assert_eq!(cell(&schema, &row, COL_DUE_DATE), "soon");
    }
}

//! Display values for custom fields
//!
//! `FieldResolver::resolve` is total: every field record, however malformed,
//! yields a string. Anything that cannot be interpreted for its declared type
//! falls back to a readable rendering of the raw value.

use clickdown_api::{epoch_millis_to_utc, CustomFieldValue, FieldType};
use serde_json::Value;
use std::fmt::Write;

use crate::config::Locale;

const LIST_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Default)]
pub struct FieldResolver {
    locale: Locale,
}

impl FieldResolver {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn resolve(&self, field: &CustomFieldValue) -> String {
        let value = match &field.value {
            None | Some(Value::Null) => return String::new(),
            Some(value) => value,
        };

        let resolved = match field.field_type {
            FieldType::Dropdown | FieldType::Labels => resolve_options(&field.type_config, value),
            FieldType::Users => join_array(value, |user| first_text(user, &["username", "id"])),
            FieldType::Date => Some(self.resolve_date(value)),
            FieldType::Checkbox => Some(self.resolve_checkbox(value)),
            FieldType::Rating => field
                .type_config
                .get("count")
                .and_then(truthy_text)
                .map(|count| format!("{}/{}", display(value), count)),
            FieldType::Location => value.get("formatted_address").and_then(truthy_text),
            FieldType::ListRelationship | FieldType::TaskRelationship => {
                join_array(value, |item| first_text(item, &["name", "id"]))
            }
            FieldType::Other(_) => None,
        };

        resolved.unwrap_or_else(|| display(value))
    }

    fn resolve_date(&self, value: &Value) -> String {
        let raw = scalar_text(value);
        let Some(timestamp) = epoch_millis_to_utc(&raw) else {
            return display(value);
        };
        let mut out = String::new();
        // An unsupported format specifier surfaces as a fmt error, not a panic
        match write!(out, "{}", timestamp.format(&self.locale.date_format)) {
            Ok(()) => out,
            Err(_) => raw,
        }
    }

    fn resolve_checkbox(&self, value: &Value) -> String {
        let checked = matches!(value, Value::Bool(true))
            || matches!(value, Value::String(s) if s == "true");
        if checked {
            self.locale.yes.clone()
        } else {
            self.locale.no.clone()
        }
    }
}

/// Dropdown and label values: option ids or order indices, single or many.
/// Returns `None` without an option table so generic rendering applies.
fn resolve_options(type_config: &Value, value: &Value) -> Option<String> {
    let options = type_config.get("options")?.as_array()?;

    let lookup = |raw: &Value| -> String {
        options
            .iter()
            .find(|option| {
                option.get("id").is_some_and(|id| loosely_equal(id, raw))
                    || option
                        .get("orderindex")
                        .is_some_and(|index| loosely_equal(index, raw))
            })
            .and_then(|option| first_text(option, &["label", "name"]))
            .unwrap_or_else(|| display(raw))
    };

    Some(match value {
        Value::Array(values) => values
            .iter()
            .map(lookup)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        single => lookup(single),
    })
}

/// `Some` only for arrays; each element is rendered by `item` or, failing
/// that, generically.
fn join_array(value: &Value, item: impl Fn(&Value) -> Option<String>) -> Option<String> {
    let values = value.as_array()?;
    Some(
        values
            .iter()
            .map(|v| item(v).unwrap_or_else(|| display(v)))
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
    )
}

/// The first property of `value` among `keys` that holds something displayable
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| value.get(*key).and_then(truthy_text))
}

/// Text of a scalar, skipping empty and falsy values
fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        other => Some(scalar_text(other)),
    }
}

/// Ids arrive as strings in some payloads and numbers in others
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() || a.is_object() || b.is_object() {
        return false;
    }
    a == b || scalar_text(a) == scalar_text(b)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Generic rendering: scalars as text, arrays joined, objects by their
/// name/label/value property or as JSON.
fn display(value: &Value) -> String {
    match value {
        Value::Array(values) => values
            .iter()
            .map(display)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        Value::Object(_) => {
            first_text(value, &["name", "label", "value"]).unwrap_or_else(|| value.to_string())
        }
        scalar => scalar_text(scalar),
    }
}

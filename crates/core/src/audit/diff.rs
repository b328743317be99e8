use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::audit::FieldChange;
use crate::domain::service::ServiceRecord;

/// Shown in place of list values, which are not serialized into change rows.
pub const REDACTED_VALUE: &str = "...";

/// Flat view of every operator-editable field of a record, keyed by storage name.
///
/// Nested groups such as `origen` are walked into dotted keys (`origen.calle`). The derived
/// quotation and the change log itself are left out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditableSnapshot {
    fields: BTreeMap<String, Value>,
}

impl EditableSnapshot {
    pub fn capture(record: &ServiceRecord) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            "clientId".to_string(),
            record.client_id.as_ref().map(|id| Value::String(id.0.clone())).unwrap_or(Value::Null),
        );
        fields.insert("serviceType".to_string(), Value::String(record.service_type.clone()));
        flatten_into(&mut fields, "", to_value(&record.report));
        flatten_into(&mut fields, "", to_value(&record.assignment));
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One row per field whose serialized value differs, in field-name order.
pub fn diff_snapshots(before: &EditableSnapshot, after: &EditableSnapshot) -> Vec<FieldChange> {
    let mut names: Vec<&String> = before.fields.keys().chain(after.fields.keys()).collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .filter_map(|name| {
            let old = before.fields.get(name).unwrap_or(&Value::Null);
            let new = after.fields.get(name).unwrap_or(&Value::Null);
            if old == new {
                return None;
            }
            Some(FieldChange {
                field: name.clone(),
                old_value: display_value(old),
                new_value: display_value(new),
            })
        })
        .collect()
}

fn to_value<T: Serialize>(section: &T) -> Value {
    serde_json::to_value(section).unwrap_or(Value::Null)
}

fn flatten_into(fields: &mut BTreeMap<String, Value>, prefix: &str, value: Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let name = if prefix.is_empty() { key } else { format!("{prefix}.{key}") };
                flatten_into(fields, &name, nested);
            }
        }
        other if !prefix.is_empty() => {
            fields.insert(prefix.to_string(), other);
        }
        _ => {}
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => REDACTED_VALUE.to_string(),
    }
}

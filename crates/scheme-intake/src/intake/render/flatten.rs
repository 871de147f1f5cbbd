use serde_json::Value;

pub const KEY_SEPARATOR: &str = ".";
pub const LIST_SEPARATOR: &str = ", ";

/// Ordered label/value pairs handed to the renderer.
pub type FlatFields = Vec<(String, String)>;

/// Flatten nested JSON into printable pairs.
///
/// Object keys are joined with `.`, string lists collapse into one comma separated value and
/// any other list is expanded into indexed keys (`documents.0`, `documents.1`).
pub fn flatten(value: &Value) -> FlatFields {
    let mut fields = Vec::new();
    flatten_into(None, value, &mut fields);
    fields
}

fn flatten_into(prefix: Option<&str>, value: &Value, fields: &mut FlatFields) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let joined = join_key(prefix, key);
                flatten_into(Some(&joined), nested, fields);
            }
        }
        Value::Array(items) if items.iter().all(Value::is_string) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR);
            fields.push((leaf_key(prefix), joined));
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let joined = join_key(prefix, &index.to_string());
                flatten_into(Some(&joined), item, fields);
            }
        }
        Value::String(text) => fields.push((leaf_key(prefix), text.clone())),
        Value::Null => fields.push((leaf_key(prefix), String::new())),
        other => fields.push((leaf_key(prefix), other.to_string())),
    }
}

fn join_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{KEY_SEPARATOR}{key}"),
        None => key.to_string(),
    }
}

fn leaf_key(prefix: Option<&str>) -> String {
    prefix.unwrap_or("value").to_string()
}

use serde_json::{Map, Value};

use crate::table::{profile_table, Table};
use crate::types::{DataType, FileKind, Metadata, Structure};
use crate::{ProfileError, Result, SAMPLE_ROWS};

pub(crate) fn profile_json(bytes: &[u8]) -> Result<Metadata> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value {
        Value::Array(items) if matches!(items.first(), Some(Value::Object(_))) => {
            array_of_objects(items)
        }
        Value::Array(items) => Ok(array_of_values(items)),
        Value::Object(map) => Ok(object(map)),
        other => Ok(scalar(other)),
    }
}

fn array_of_objects(items: Vec<Value>) -> Result<Metadata> {
    let mut columns: Vec<String> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let Value::Object(obj) = item else {
            return Err(ProfileError::Malformed(format!(
                "array mixes objects with other values (item {i})"
            )));
        };
        for key in obj.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    let rows: Vec<Vec<Value>> = items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            columns
                .iter()
                .map(|c| obj.get(c).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>()
        })
        .collect();

    let mut meta = Metadata::completed(FileKind::Json, Structure::ArrayOfObjects);
    profile_table(&mut meta, &Table { columns, rows });
    meta.item_count = Some(items.len());
    meta.sample_data = items.into_iter().take(SAMPLE_ROWS).collect();
    Ok(meta)
}

fn array_of_values(items: Vec<Value>) -> Metadata {
    let table = Table {
        columns: vec!["value".to_string()],
        rows: items.iter().map(|v| vec![v.clone()]).collect(),
    };
    let mut meta = Metadata::completed(FileKind::Json, Structure::ArrayOfValues);
    profile_table(&mut meta, &table);
    if items.is_empty() {
        meta.data_types.insert("value".to_string(), DataType::Unknown);
    }
    meta.item_count = Some(items.len());
    meta.sample_data = items.into_iter().take(SAMPLE_ROWS).collect();
    meta
}

fn object(map: Map<String, Value>) -> Metadata {
    let table = Table {
        columns: map.keys().cloned().collect(),
        rows: vec![map.values().cloned().collect()],
    };
    let mut meta = Metadata::completed(FileKind::Json, Structure::Object);
    profile_table(&mut meta, &table);
    meta.key_count = Some(map.len());
    meta.sample_data = vec![Value::Object(map)];
    meta
}

fn scalar(value: Value) -> Metadata {
    let table = Table {
        columns: vec!["value".to_string()],
        rows: vec![vec![value.clone()]],
    };
    let mut meta = Metadata::completed(FileKind::Json, Structure::Value);
    profile_table(&mut meta, &table);
    meta.data_types
        .insert("value".to_string(), DataType::of_value(&value));
    meta.sample_data = vec![value];
    meta
}

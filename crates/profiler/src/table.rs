use std::collections::{HashMap, HashSet};

use serde_json::{Map, Number, Value};

use crate::stats;
use crate::types::{
    CategoricalStats, ColumnStats, Completeness, DataType, FileKind, Metadata, NumericStats,
    Structure, ValueCount,
};
use crate::{ProfileError, Result, SAMPLE_ROWS, TOP_VALUES};

/// Cell tokens read as missing values.
const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "#N/A",
];

/// Row-major table; every row has exactly `columns.len()` cells.
pub(crate) struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub(crate) fn row_object(&self, row: &[Value]) -> Value {
        let mut obj = Map::new();
        for (col, cell) in self.columns.iter().zip(row) {
            obj.insert(col.clone(), cell.clone());
        }
        Value::Object(obj)
    }
}

pub(crate) fn profile_csv(bytes: &[u8]) -> Result<Metadata> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = reader.records();
    let header = match records.next() {
        Some(rec) => rec?,
        None => return Err(ProfileError::Malformed("no columns to parse from file".into())),
    };
    let columns = dedupe_headers(header.iter());

    let mut rows = Vec::new();
    for rec in records {
        let rec = rec?;
        if rec.len() > columns.len() {
            let line = rec.position().map(|p| p.line()).unwrap_or(0);
            return Err(ProfileError::Malformed(format!(
                "expected {} fields in line {}, saw {}",
                columns.len(),
                line,
                rec.len()
            )));
        }
        let mut row: Vec<Value> = rec.iter().map(parse_cell).collect();
        row.resize(columns.len(), Value::Null);
        rows.push(row);
    }

    let table = Table { columns, rows };
    let mut meta = Metadata::completed(FileKind::Csv, Structure::Table);
    profile_table(&mut meta, &table);
    meta.sample_data = table
        .rows
        .iter()
        .take(SAMPLE_ROWS)
        .map(|r| table.row_object(r))
        .collect();
    meta.delimiter = Some(",".to_string());
    meta.has_header = Some(true);
    Ok(meta)
}

/// Blank headers become `Unnamed: i`; repeats get a `.n` suffix.
fn dedupe_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();
    for (i, name) in raw.enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {i}")
        } else {
            name.to_string()
        };
        let n = seen.entry(base.clone()).or_insert(0);
        if *n == 0 {
            out.push(base);
        } else {
            out.push(format!("{base}.{n}"));
        }
        *n += 1;
    }
    out
}

fn parse_cell(raw: &str) -> Value {
    let t = raw.trim();
    if NA_TOKENS.contains(&t) {
        return Value::Null;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = t.parse::<f64>() {
        // from_f64 rejects inf and NaN
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    if t.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if t.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(raw.to_string())
}

/// Fill shape, column types, statistics, completeness and duplicate count.
pub(crate) fn profile_table(meta: &mut Metadata, table: &Table) {
    let row_count = table.rows.len();
    meta.row_count = row_count;
    meta.column_count = table.columns.len();
    meta.columns = table.columns.clone();

    let mut total_nulls = 0;
    let mut columns_with_nulls = 0;
    for (idx, name) in table.columns.iter().enumerate() {
        let cells: Vec<&Value> = table.rows.iter().map(|r| &r[idx]).collect();
        let (dtype, col_stats) = profile_column(&cells);
        let nulls = col_stats.null_count();
        total_nulls += nulls;
        if nulls > 0 {
            columns_with_nulls += 1;
        }
        meta.data_types.insert(name.clone(), dtype);
        meta.statistics.insert(name.clone(), col_stats);
    }

    let rows_with_nulls = table
        .rows
        .iter()
        .filter(|r| r.iter().any(Value::is_null))
        .count();

    meta.completeness = Some(Completeness {
        overall_missing_percentage: stats::percentage(total_nulls, row_count * table.columns.len()),
        columns_with_nulls,
        rows_with_nulls,
    });
    meta.duplicate_rows = Some(count_duplicates(table.rows.iter().map(|r| {
        serde_json::to_string(r).unwrap_or_default()
    })));
}

fn profile_column(cells: &[&Value]) -> (DataType, ColumnStats) {
    let total = cells.len();
    let present: Vec<&Value> = cells.iter().copied().filter(|v| !v.is_null()).collect();
    let null_count = total - present.len();
    let null_percentage = stats::percentage(null_count, total);

    if present.iter().all(|v| v.is_number()) {
        let xs: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
        let dtype = if present.is_empty() {
            DataType::Empty
        } else if present.iter().all(|v| v.is_i64() || v.is_u64()) {
            DataType::Integer
        } else {
            DataType::Float
        };
        let numeric = NumericStats {
            min: stats::min(&xs),
            max: stats::max(&xs),
            mean: stats::mean(&xs),
            median: stats::median(&xs),
            std: stats::stddev_sample(&xs),
            null_count,
            null_percentage,
        };
        return (dtype, ColumnStats::Numeric(numeric));
    }

    let dtype = if present.iter().all(|v| v.is_boolean()) {
        DataType::Boolean
    } else if present.iter().all(|v| v.is_array()) {
        DataType::Array
    } else if present.iter().all(|v| v.is_object()) {
        DataType::Object
    } else {
        DataType::String
    };

    let (unique_count, top_values) = top_values(present.iter().map(|v| display_value(v)));
    let categorical = CategoricalStats {
        unique_count,
        null_count,
        null_percentage,
        top_values,
    };
    (dtype, ColumnStats::Categorical(categorical))
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Distinct count plus the most frequent values; ties keep first appearance.
fn top_values(values: impl Iterator<Item = String>) -> (usize, Vec<ValueCount>) {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<ValueCount> = Vec::new();
    for value in values {
        match index.get(&value) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(value.clone(), counts.len());
                counts.push(ValueCount { value, count: 1 });
            }
        }
    }
    let unique = counts.len();
    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(TOP_VALUES);
    (unique, counts)
}

/// Number of records equal to an earlier record.
pub(crate) fn count_duplicates(keys: impl Iterator<Item = String>) -> usize {
    let mut seen = HashSet::new();
    keys.filter(|k| !seen.insert(k.clone())).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_variants() {
        assert_eq!(parse_cell("42"), Value::from(42));
        assert_eq!(parse_cell(" 2.5 "), Value::from(2.5));
        assert_eq!(parse_cell("TRUE"), Value::Bool(true));
        assert_eq!(parse_cell("N/A"), Value::Null);
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("inf"), Value::String("inf".into()));
        assert_eq!(parse_cell("alice"), Value::String("alice".into()));
    }

    #[test]
    fn test_dedupe_headers() {
        let cols = dedupe_headers(["a", "", "a", "b", "a"].into_iter());
        assert_eq!(cols, vec!["a", "Unnamed: 1", "a.1", "b", "a.2"]);
    }

    #[test]
    fn test_top_values_ordering() {
        let vals = ["x", "y", "y", "z", "x", "y"].iter().map(|s| s.to_string());
        let (unique, top) = top_values(vals);
        assert_eq!(unique, 3);
        assert_eq!(top[0], ValueCount { value: "y".into(), count: 3 });
        assert_eq!(top[1], ValueCount { value: "x".into(), count: 2 });
        assert_eq!(top[2], ValueCount { value: "z".into(), count: 1 });
    }

    #[test]
    fn test_top_values_truncated_to_ten() {
        let vals = (0..25).map(|i| format!("v{i}"));
        let (unique, top) = top_values(vals);
        assert_eq!(unique, 25);
        assert_eq!(top.len(), TOP_VALUES);
        assert_eq!(top[0].value, "v0");
    }

    #[test]
    fn test_count_duplicates() {
        let keys = ["a", "b", "a", "a", "c"].iter().map(|s| s.to_string());
        assert_eq!(count_duplicates(keys), 2);
    }
}

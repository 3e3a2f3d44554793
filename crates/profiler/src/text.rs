use serde_json::json;

use crate::stats;
use crate::table::count_duplicates;
use crate::types::{Completeness, DataType, FileKind, Metadata, Structure, TokenEstimate};
use crate::{Result, SAMPLE_ROWS};

/// Rough characters-per-token ratio for English prose.
const CHARS_PER_TOKEN: usize = 4;

pub(crate) fn profile_text(bytes: &[u8]) -> Result<Metadata> {
    let text = std::str::from_utf8(bytes)?;
    let lines: Vec<&str> = text.lines().collect();

    let mut meta = Metadata::completed(FileKind::Text, Structure::Lines);
    meta.row_count = lines.len();
    meta.column_count = 1;
    meta.columns = vec!["text".to_string()];
    meta.data_types.insert("text".to_string(), DataType::String);
    meta.sample_data = lines
        .iter()
        .take(SAMPLE_ROWS)
        .map(|l| json!({ "text": l.trim() }))
        .collect();

    let lengths: Vec<f64> = lines.iter().map(|l| l.chars().count() as f64).collect();
    meta.line_length_stats = Some(stats::summarize(&lengths));

    let characters = text.chars().filter(|c| !c.is_whitespace()).count();
    meta.estimated_tokens = Some(TokenEstimate {
        estimated_total: characters / CHARS_PER_TOKEN,
        estimation_method: "character_based".to_string(),
        characters,
    });

    let blank = lines.iter().filter(|l| l.trim().is_empty()).count();
    meta.completeness = Some(Completeness {
        overall_missing_percentage: stats::percentage(blank, lines.len()),
        columns_with_nulls: usize::from(blank > 0),
        rows_with_nulls: blank,
    });
    meta.duplicate_rows = Some(count_duplicates(lines.iter().map(|l| l.to_string())));
    Ok(meta)
}

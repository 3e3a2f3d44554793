//! Scoring modules.
//!
//! Each module is a set of weighted criteria evaluated against the dataset's
//! profiling metadata. Criterion scores are on a 0–10 scale; the module score
//! is their weighted mean. Both are rounded to one decimal so reports are
//! reproducible.

use chrono::{DateTime, NaiveDate};
use profiler::{ColumnStats, Metadata, Structure};
use uuid::Uuid;

use crate::job::{CriterionScore, ModuleKind, ModuleScore};
use crate::{AssessmentError, Result};

/// Dataset facts a module may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub dataset_id: Uuid,
    pub name: &'a str,
    pub file_size: u64,
    pub metadata: &'a Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutcome {
    pub score: ModuleScore,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Default)]
struct Criterion {
    score: f64,
    findings: Vec<String>,
    recommendations: Vec<String>,
}

impl Criterion {
    fn scored(score: f64) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    fn finding(mut self, text: impl Into<String>) -> Self {
        self.findings.push(text.into());
        self
    }

    fn recommend(mut self, text: impl Into<String>) -> Self {
        self.recommendations.push(text.into());
        self
    }
}

type CriterionFn = fn(&ScoringInput<'_>) -> Criterion;

// weights within a module sum to 1
const QUALITY: &[(&str, f64, CriterionFn)] = &[
    ("completeness", 0.3, completeness),
    ("accuracy", 0.3, accuracy),
    ("consistency", 0.2, consistency),
    ("timeliness", 0.2, timeliness),
];

const ACCESSIBILITY: &[(&str, f64, CriterionFn)] = &[
    ("availability", 0.5, availability),
    ("volume", 0.5, volume),
];

fn criteria(kind: ModuleKind) -> &'static [(&'static str, f64, CriterionFn)] {
    match kind {
        ModuleKind::Quality => QUALITY,
        ModuleKind::Accessibility => ACCESSIBILITY,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Run one scoring module. Fails when the dataset could not be profiled.
pub fn run_module(kind: ModuleKind, input: &ScoringInput<'_>) -> Result<ModuleOutcome> {
    if input.metadata.is_failed() {
        let reason = input
            .metadata
            .error
            .clone()
            .unwrap_or_else(|| "profiling failed".to_string());
        return Err(AssessmentError::MetadataUnavailable(reason));
    }

    let mut scored = Vec::new();
    let mut findings = Vec::new();
    let mut recommendations = Vec::new();
    let mut weighted = 0.0;

    for (name, weight, eval) in criteria(kind) {
        let c = eval(input);
        let score = round1(c.score.clamp(0.0, 10.0));
        weighted += weight * score;
        scored.push(CriterionScore {
            name: (*name).to_string(),
            weight: *weight,
            score,
        });
        findings.extend(c.findings);
        recommendations.extend(c.recommendations);
    }

    let score = round1(weighted).clamp(0.0, 10.0);
    Ok(ModuleOutcome {
        score: ModuleScore {
            name: kind,
            score,
            criteria: scored,
        },
        findings,
        recommendations,
    })
}

// ---- quality ----

fn completeness(input: &ScoringInput<'_>) -> Criterion {
    let meta = input.metadata;
    let missing = meta
        .completeness
        .as_ref()
        .map(|c| c.overall_missing_percentage)
        .unwrap_or(0.0);
    let mut c = Criterion::scored(10.0 * (1.0 - missing / 100.0));
    if missing <= 0.0 {
        return c;
    }

    c = c.finding(format!("{missing:.1}% of values are missing"));
    let mut sparse: Vec<(&String, f64)> = meta
        .statistics
        .iter()
        .map(|(col, s)| (col, s.null_percentage()))
        .filter(|(_, pct)| *pct > 0.0)
        .collect();
    sparse.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (col, pct) in sparse.iter().take(3) {
        c = c.finding(format!("column '{col}' is {pct:.1}% empty"));
    }
    if c.score < 8.0 {
        let cols: Vec<&str> = sparse.iter().take(3).map(|(col, _)| col.as_str()).collect();
        c = if cols.is_empty() {
            c.recommend("Remove or fill blank records")
        } else {
            c.recommend(format!("Impute or drop missing values in: {}", cols.join(", ")))
        };
    }
    c
}

fn accuracy(input: &ScoringInput<'_>) -> Criterion {
    let meta = input.metadata;

    if let (Structure::Lines, Some(lengths)) = (
        meta.structure.unwrap_or(Structure::Value),
        meta.line_length_stats.as_ref(),
    ) {
        let extreme = lengths.std > 0.0 && (lengths.max - lengths.mean) / lengths.std > 3.0;
        let c = Criterion::scored(if extreme { 5.0 } else { 10.0 });
        return if extreme {
            c.finding(format!(
                "some lines are unusually long (max {:.0} chars, mean {:.1})",
                lengths.max, lengths.mean
            ))
            .recommend("Split or review overly long lines")
        } else {
            c
        };
    }

    let total = meta.statistics.len();
    if total == 0 {
        return Criterion::scored(10.0);
    }

    let mut numeric = 0usize;
    let mut outliers = Vec::new();
    let mut empty = Vec::new();
    for (col, stats) in &meta.statistics {
        if stats.null_count() > 0 && stats.null_percentage() >= 100.0 {
            empty.push(col.as_str());
        }
        if let ColumnStats::Numeric(n) = stats {
            let (Some(min), Some(max), Some(mean), Some(std)) = (n.min, n.max, n.mean, n.std) else {
                continue;
            };
            numeric += 1;
            if std > 0.0 && (max - mean).abs().max((min - mean).abs()) / std > 3.0 {
                outliers.push(col.as_str());
            }
        }
    }

    let outlier_frac = if numeric == 0 { 0.0 } else { outliers.len() as f64 / numeric as f64 };
    let empty_frac = empty.len() as f64 / total as f64;
    let mut c = Criterion::scored(10.0 - 5.0 * outlier_frac - 3.0 * empty_frac);
    if !outliers.is_empty() {
        c = c
            .finding(format!("values beyond 3 standard deviations in: {}", outliers.join(", ")))
            .recommend(format!("Review outliers in: {}", outliers.join(", ")));
    }
    if !empty.is_empty() {
        c = c
            .finding(format!("columns without any values: {}", empty.join(", ")))
            .recommend(format!("Drop empty columns: {}", empty.join(", ")));
    }
    c
}

fn consistency(input: &ScoringInput<'_>) -> Criterion {
    let meta = input.metadata;
    let rows = meta.row_count;
    let dups = meta.duplicate_rows.unwrap_or(0);
    if rows == 0 || dups == 0 {
        return Criterion::scored(10.0);
    }
    Criterion::scored(10.0 * (1.0 - dups as f64 / rows as f64))
        .finding(format!("{dups} of {rows} records are duplicates"))
        .recommend("Deduplicate records before training")
}

const TEMPORAL_TOKENS: &[&str] = &[
    "date", "time", "timestamp", "datetime", "created", "updated", "year", "month", "day",
];

/// Split on separators and on lower-to-upper case changes: `createdAt`,
/// `order_date`, `OrderDate`.
fn name_tokens(col: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in col.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn looks_temporal_name(col: &str) -> bool {
    name_tokens(col)
        .iter()
        .any(|tok| TEMPORAL_TOKENS.contains(&tok.as_str()))
}

fn looks_temporal_value(v: &str) -> bool {
    NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(v).is_ok()
}

fn timeliness(input: &ScoringInput<'_>) -> Criterion {
    let meta = input.metadata;
    let best = meta
        .statistics
        .iter()
        .filter(|(col, stats)| {
            looks_temporal_name(col)
                || matches!(stats, ColumnStats::Categorical(s)
                    if s.top_values.first().is_some_and(|v| looks_temporal_value(&v.value)))
        })
        .map(|(col, stats)| (col, 10.0 * (1.0 - stats.null_percentage() / 100.0)))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    match best {
        Some((col, score)) => {
            let c = Criterion::scored(score);
            if score < 10.0 {
                c.finding(format!("timestamp column '{col}' has gaps"))
            } else {
                c
            }
        }
        None => Criterion::scored(5.0)
            .finding("no date or time column found; recency cannot be verified")
            .recommend("Add a timestamp column so data recency can be tracked"),
    }
}

// ---- accessibility ----

fn availability(input: &ScoringInput<'_>) -> Criterion {
    let Some(structure) = input.metadata.structure else {
        return Criterion::scored(0.0);
    };
    let score = match structure {
        Structure::Table => 10.0,
        Structure::ArrayOfObjects => 9.0,
        Structure::Object => 7.0,
        Structure::ArrayOfValues | Structure::Lines => 6.0,
        Structure::Value => 3.0,
    };
    let c = Criterion::scored(score);
    match structure {
        Structure::ArrayOfValues | Structure::Value => c
            .finding("data has no named fields")
            .recommend("Provide records with named fields (CSV or an array of JSON objects)"),
        Structure::Lines => c
            .finding("unstructured text; records have no fields")
            .recommend("Add labels or structure if the text is meant for supervised training"),
        _ => c,
    }
}

fn volume(input: &ScoringInput<'_>) -> Criterion {
    let n = input.metadata.row_count;
    let score = if n == 0 { 0.0 } else { 2.5 * (n as f64).log10() };
    let c = Criterion::scored(score).finding(format!(
        "{n} records available ({} bytes)",
        input.file_size
    ));
    if score < 5.0 {
        c.recommend("Collect more records; 10000 or more reach the full volume score")
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profiler::{profile, FileKind};

    fn input<'a>(meta: &'a Metadata) -> ScoringInput<'a> {
        ScoringInput {
            dataset_id: Uuid::nil(),
            name: "test",
            file_size: 0,
            metadata: meta,
        }
    }

    fn criterion(outcome: &ModuleOutcome, name: &str) -> f64 {
        outcome
            .score
            .criteria
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.score)
            .unwrap()
    }

    #[test]
    fn test_failed_metadata_is_rejected() {
        let meta = Metadata::failed(FileKind::Csv, "bad csv");
        let err = run_module(ModuleKind::Quality, &input(&meta)).unwrap_err();
        assert_eq!(err, AssessmentError::MetadataUnavailable("bad csv".into()));
    }

    #[test]
    fn test_quality_on_clean_table_with_dates() {
        let csv = "id,signup_date,score\n1,2024-01-01,3.5\n2,2024-02-01,4.0\n3,2024-03-01,4.5\n";
        let meta = profile(csv.as_bytes(), FileKind::Csv);
        let out = run_module(ModuleKind::Quality, &input(&meta)).unwrap();

        assert_eq!(criterion(&out, "completeness"), 10.0);
        assert_eq!(criterion(&out, "accuracy"), 10.0);
        assert_eq!(criterion(&out, "consistency"), 10.0);
        assert_eq!(criterion(&out, "timeliness"), 10.0);
        assert_eq!(out.score.score, 10.0);
        assert!(out.recommendations.is_empty());
    }

    #[test]
    fn test_quality_penalises_gaps_and_duplicates() {
        let csv = "a,b\n1,x\n1,x\n,y\n4,\n";
        let meta = profile(csv.as_bytes(), FileKind::Csv);
        let out = run_module(ModuleKind::Quality, &input(&meta)).unwrap();

        // 2 of 8 cells missing
        assert_eq!(criterion(&out, "completeness"), 7.5);
        assert_eq!(criterion(&out, "consistency"), 7.5);
        assert_eq!(criterion(&out, "timeliness"), 5.0);
        // 0.3*7.5 + 0.3*10 + 0.2*7.5 + 0.2*5 = 7.75
        assert!((7.7..=7.8).contains(&out.score.score));
        assert!(out.findings.iter().any(|f| f.contains("25.0% of values are missing")));
        assert!(out
            .recommendations
            .iter()
            .any(|r| r.starts_with("Impute or drop missing values")));
    }

    #[test]
    fn test_accuracy_detects_outliers() {
        let mut csv = String::from("v\n");
        for _ in 0..20 {
            csv.push_str("10\n");
        }
        csv.push_str("1000\n");
        let meta = profile(csv.as_bytes(), FileKind::Csv);
        let out = run_module(ModuleKind::Quality, &input(&meta)).unwrap();
        assert_eq!(criterion(&out, "accuracy"), 5.0);
    }

    #[test]
    fn test_accessibility_scores_structure_and_volume() {
        let mut csv = String::from("x\n");
        for i in 0..100 {
            csv.push_str(&format!("{i}\n"));
        }
        let meta = profile(csv.as_bytes(), FileKind::Csv);
        let out = run_module(ModuleKind::Accessibility, &input(&meta)).unwrap();
        assert_eq!(criterion(&out, "availability"), 10.0);
        assert_eq!(criterion(&out, "volume"), 5.0);
        assert_eq!(out.score.score, 7.5);

        let scalar = profile(b"42", FileKind::Json);
        let out = run_module(ModuleKind::Accessibility, &input(&scalar)).unwrap();
        assert_eq!(criterion(&out, "availability"), 3.0);
        assert_eq!(criterion(&out, "volume"), 0.0);
    }

    #[test]
    fn test_text_datasets_score() {
        let meta = profile(b"first line\nsecond line\nthird line\n", FileKind::Text);
        let out = run_module(ModuleKind::Quality, &input(&meta)).unwrap();
        assert_eq!(criterion(&out, "accuracy"), 10.0);
        assert_eq!(criterion(&out, "timeliness"), 5.0);
        assert!((0.0..=10.0).contains(&out.score.score));
    }

    #[test]
    fn test_temporal_detection() {
        assert!(looks_temporal_name("created_at"));
        assert!(looks_temporal_name("OrderDate"));
        assert!(looks_temporal_name("createdAt"));
        assert!(looks_temporal_name("order-date"));
        assert!(looks_temporal_name("UPDATED"));
        assert!(!looks_temporal_name("candidate"));
        assert!(!looks_temporal_name("customerName"));
        assert_eq!(name_tokens("lastLoginTime2"), vec!["last", "login", "time2"]);
        assert!(looks_temporal_value("2023-11-05"));
        assert!(looks_temporal_value("2023-11-05T10:00:00Z"));
        assert!(!looks_temporal_value("yesterday"));
    }
}

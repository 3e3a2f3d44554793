use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::ModuleScore;
use crate::scoring::{ModuleOutcome, ScoringInput};

/// Final assessment report. Built once when a job completes and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub assessment_id: Uuid,
    pub dataset_id: Uuid,
    pub dataset_name: String,
    pub overall_score: f64,
    pub module_scores: Vec<ModuleScore>,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Unweighted mean of the module scores.
pub fn overall_score(scores: &[ModuleScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64
}

pub fn build_report(
    assessment_id: Uuid,
    input: &ScoringInput<'_>,
    outcomes: &[ModuleOutcome],
    now: DateTime<Utc>,
) -> Report {
    let module_scores: Vec<ModuleScore> = outcomes.iter().map(|o| o.score.clone()).collect();
    let overall = overall_score(&module_scores);

    let breakdown: Vec<String> = module_scores
        .iter()
        .map(|s| format!("{} {:.1}", s.name, s.score))
        .collect();
    let mut findings = vec![format!(
        "Dataset '{}' scored {:.1}/10 ({})",
        input.name,
        overall,
        breakdown.join(", ")
    )];
    findings.extend(outcomes.iter().flat_map(|o| o.findings.iter().cloned()));

    let mut recommendations: Vec<String> = Vec::new();
    for rec in outcomes.iter().flat_map(|o| o.recommendations.iter()) {
        if !recommendations.contains(rec) {
            recommendations.push(rec.clone());
        }
    }
    if recommendations.is_empty() {
        recommendations.push("No blocking issues found; the dataset is ready for use".to_string());
    }

    Report {
        assessment_id,
        dataset_id: input.dataset_id,
        dataset_name: input.name.to_string(),
        overall_score: overall,
        module_scores,
        findings,
        recommendations,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ModuleKind;
    use crate::scoring::run_module;
    use profiler::{profile, FileKind};

    #[test]
    fn test_report_is_never_empty() {
        let meta = profile(b"id,created\n1,2024-01-01\n2,2024-01-02\n", FileKind::Csv);
        let input = ScoringInput {
            dataset_id: Uuid::now_v7(),
            name: "events.csv",
            file_size: 40,
            metadata: &meta,
        };
        let outcomes: Vec<ModuleOutcome> = [ModuleKind::Quality, ModuleKind::Accessibility]
            .iter()
            .map(|k| run_module(*k, &input).unwrap())
            .collect();
        let report = build_report(Uuid::now_v7(), &input, &outcomes, Utc::now());

        assert_eq!(report.module_scores.len(), 2);
        assert!(report.findings[0].starts_with("Dataset 'events.csv' scored"));
        assert!(!report.recommendations.is_empty());
        let mean = (report.module_scores[0].score + report.module_scores[1].score) / 2.0;
        assert!((report.overall_score - mean).abs() < 1e-6);
    }

    #[test]
    fn test_overall_score_mean() {
        let scores = vec![
            ModuleScore { name: ModuleKind::Quality, score: 6.0, criteria: vec![] },
            ModuleScore { name: ModuleKind::Accessibility, score: 9.0, criteria: vec![] },
        ];
        assert_eq!(overall_score(&scores), 7.5);
        assert_eq!(overall_score(&[]), 0.0);
    }

    #[test]
    fn test_recommendations_deduplicated() {
        let meta = profile(b"a\n1\n", FileKind::Csv);
        let input = ScoringInput {
            dataset_id: Uuid::nil(),
            name: "tiny.csv",
            file_size: 4,
            metadata: &meta,
        };
        let outcome = run_module(ModuleKind::Accessibility, &input).unwrap();
        let twice = vec![outcome.clone(), outcome];
        let report = build_report(Uuid::nil(), &input, &twice, Utc::now());
        let unique: std::collections::HashSet<_> = report.recommendations.iter().collect();
        assert_eq!(unique.len(), report.recommendations.len());
    }
}

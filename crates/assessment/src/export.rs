use std::fmt::Write as _;
use std::str::FromStr;

use crate::report::Report;
use crate::{AssessmentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "html" => Ok(ExportFormat::Html),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            _ => Err(AssessmentError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "md",
        }
    }
}

/// Serialize a report. Output depends only on the report.
pub fn render(report: &Report, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => {
            serde_json::to_vec_pretty(report).map_err(|e| AssessmentError::Render(e.to_string()))
        }
        ExportFormat::Csv => render_csv(report),
        ExportFormat::Html => Ok(render_html(report).into_bytes()),
        ExportFormat::Markdown => Ok(render_markdown(report).into_bytes()),
    }
}

fn render_csv(report: &Report) -> Result<Vec<u8>> {
    let err = |e: csv::Error| AssessmentError::Render(e.to_string());
    let mut w = csv::Writer::from_writer(Vec::new());
    let mut row = |section: &str, item: &str, value: &str| {
        w.write_record([section, item, value]).map_err(err)
    };

    row("section", "item", "value")?;
    row("summary", "assessment_id", &report.assessment_id.to_string())?;
    row("summary", "dataset_id", &report.dataset_id.to_string())?;
    row("summary", "dataset_name", &report.dataset_name)?;
    row("summary", "overall_score", &format!("{:.2}", report.overall_score))?;
    row("summary", "created_at", &report.created_at.to_rfc3339())?;

    for m in &report.module_scores {
        row("module", m.name.as_str(), &format!("{:.1}", m.score))?;
        for c in &m.criteria {
            row("criterion", &format!("{}.{}", m.name, c.name), &format!("{:.1}", c.score))?;
        }
    }
    for (i, f) in report.findings.iter().enumerate() {
        row("finding", &(i + 1).to_string(), f)?;
    }
    for (i, r) in report.recommendations.iter().enumerate() {
        row("recommendation", &(i + 1).to_string(), r)?;
    }

    w.into_inner()
        .map_err(|e| AssessmentError::Render(e.to_string()))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_html(report: &Report) -> String {
    let name = escape_html(&report.dataset_name);
    let mut html = String::new();
    // writing to a String cannot fail
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>AI readiness: {name}</title></head>\n<body>\n\
         <h1>AI readiness report: {name}</h1>\n\
         <p>Dataset <code>{}</code>, generated {}</p>\n\
         <h2>Overall score: {:.1} / 10</h2>\n",
        report.dataset_id,
        report.created_at.to_rfc3339(),
        report.overall_score
    );

    html.push_str("<table>\n<tr><th>Module</th><th>Criterion</th><th>Score</th></tr>\n");
    for m in &report.module_scores {
        let _ = writeln!(html, "<tr><th>{}</th><td></td><td>{:.1}</td></tr>", m.name, m.score);
        for c in &m.criteria {
            let _ = writeln!(
                html,
                "<tr><td></td><td>{} ({:.0}%)</td><td>{:.1}</td></tr>",
                escape_html(&c.name),
                c.weight * 100.0,
                c.score
            );
        }
    }
    html.push_str("</table>\n");

    for (title, items) in [
        ("Findings", &report.findings),
        ("Recommendations", &report.recommendations),
    ] {
        let _ = writeln!(html, "<h2>{title}</h2>\n<ul>");
        for item in items {
            let _ = writeln!(html, "<li>{}</li>", escape_html(item));
        }
        html.push_str("</ul>\n");
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn render_markdown(report: &Report) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# AI readiness report: {}\n", report.dataset_name);
    let _ = writeln!(md, "- Dataset: `{}`", report.dataset_id);
    let _ = writeln!(md, "- Assessment: `{}`", report.assessment_id);
    let _ = writeln!(md, "- Generated: {}", report.created_at.to_rfc3339());
    let _ = writeln!(md, "- Overall score: **{:.1} / 10**\n", report.overall_score);

    md.push_str("| Module | Criterion | Weight | Score |\n|---|---|---|---|\n");
    for m in &report.module_scores {
        let _ = writeln!(md, "| {} | | | {:.1} |", m.name, m.score);
        for c in &m.criteria {
            let _ = writeln!(md, "| | {} | {:.2} | {:.1} |", c.name, c.weight, c.score);
        }
    }

    md.push_str("\n## Findings\n\n");
    for f in &report.findings {
        let _ = writeln!(md, "- {f}");
    }
    md.push_str("\n## Recommendations\n\n");
    for r in &report.recommendations {
        let _ = writeln!(md, "- {r}");
    }
    md
}

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::catalog::Source;
use crate::pipeline::{BatchReport, SourceOutcome};

pub fn render_report_table(report: &BatchReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Source", "Status", "Records", "+", "-", "~", "Digest", "Detail",
    ]);

    for source in &report.sources {
        let status = match &source.outcome {
            SourceOutcome::Unchanged => Cell::new("UNCHANGED"),
            SourceOutcome::Changed { .. } => Cell::new("CHANGED").fg(Color::Yellow),
            SourceOutcome::Failed { .. } => Cell::new("FAILED").fg(Color::Red),
        };
        let (added, removed, modified, detail) = match &source.outcome {
            SourceOutcome::Unchanged => (None, None, None, String::new()),
            SourceOutcome::Changed { summary, archive } => (
                Some(summary.added),
                Some(summary.removed),
                Some(summary.modified),
                archive
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "dry run".to_string()),
            ),
            SourceOutcome::Failed { stage, reason, .. } => {
                (None, None, None, format!("{stage}: {reason}"))
            }
        };
        table.add_row(Row::from(vec![
            Cell::new(&source.key),
            status,
            Cell::new(dash(source.records)),
            Cell::new(dash(added)),
            Cell::new(dash(removed)),
            Cell::new(dash(modified)),
            Cell::new(
                source
                    .digest
                    .as_deref()
                    .map(|d| d.chars().take(12).collect::<String>())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(detail),
        ]));
    }

    format!(
        "{table}\n{} changed, {} unchanged, {} failed",
        report.changed(),
        report.unchanged(),
        report.failed()
    )
}

pub fn render_sources_table(sources: &[Source]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Title", "Locator"]);
    for source in sources {
        table.add_row(vec![
            source.key.clone(),
            source.title.clone(),
            source.locator.clone(),
        ]);
    }
    table.to_string()
}

fn dash(value: Option<usize>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::DiffSummary;
    use crate::pipeline::{FailureKind, SourceReport, Stage};

    fn source_report(key: &str, outcome: SourceOutcome, digest: Option<&str>) -> SourceReport {
        SourceReport {
            key: key.to_string(),
            title: key.to_uppercase(),
            outcome,
            records: digest.map(|_| 2),
            digest: digest.map(str::to_string),
            elapsed_ms: 1,
        }
    }

    #[test]
    fn report_table_lists_sources_and_totals() {
        let report = BatchReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            sources: vec![
                source_report(
                    "umwelt-klima",
                    SourceOutcome::Changed {
                        summary: DiffSummary {
                            added: 1,
                            removed: 0,
                            modified: 0,
                        },
                        archive: None,
                    },
                    Some("0123456789abcdef"),
                ),
                source_report(
                    "politik-wahlen",
                    SourceOutcome::Failed {
                        stage: Stage::Fetching,
                        kind: FailureKind::Fetch,
                        reason: "timeout".to_string(),
                    },
                    None,
                ),
            ],
        };

        let rendered = render_report_table(&report);

        assert!(rendered.contains("Source"));
        assert!(rendered.contains("Digest"));
        assert!(rendered.contains("umwelt-klima"));
        assert!(rendered.contains("0123456789ab"));
        assert!(!rendered.contains("0123456789abc"));
        assert!(rendered.contains("dry run"));
        assert!(rendered.contains("fetching: timeout"));
        assert!(rendered.ends_with("1 changed, 0 unchanged, 1 failed"));
    }

    #[test]
    fn sources_table_shows_key_title_and_locator() {
        let sources = vec![Source::new("a", "Alpha", "https://example.org/a")];
        let rendered = render_sources_table(&sources);
        assert!(rendered.contains("Locator"));
        assert!(rendered.contains("Alpha"));
        assert!(rendered.contains("https://example.org/a"));
    }
}

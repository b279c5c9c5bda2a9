use anyhow::Result;

use crate::pipeline::{BatchReport, SourceOutcome};

pub fn report_to_csv(report: &BatchReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "key", "status", "records", "added", "removed", "modified", "archive", "stage", "reason",
        "digest",
    ])?;
    for source in &report.sources {
        let mut row = vec![
            source.key.clone(),
            source.outcome.label().to_string(),
            source.records.map(|r| r.to_string()).unwrap_or_default(),
        ];
        match &source.outcome {
            SourceOutcome::Unchanged => row.extend(vec![String::new(); 6]),
            SourceOutcome::Changed { summary, archive } => row.extend([
                summary.added.to_string(),
                summary.removed.to_string(),
                summary.modified.to_string(),
                archive
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                String::new(),
                String::new(),
            ]),
            SourceOutcome::Failed { stage, reason, .. } => row.extend([
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                stage.to_string(),
                reason.clone(),
            ]),
        }
        row.push(source.digest.clone().unwrap_or_default());
        writer.write_record(&row)?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::{FailureKind, SourceReport, Stage};

    #[test]
    fn writes_one_row_per_source() {
        let report = BatchReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            sources: vec![
                SourceReport {
                    key: "a".to_string(),
                    title: "A".to_string(),
                    outcome: SourceOutcome::Unchanged,
                    records: Some(3),
                    digest: Some("abc".to_string()),
                    elapsed_ms: 4,
                },
                SourceReport {
                    key: "b".to_string(),
                    title: "B".to_string(),
                    outcome: SourceOutcome::Failed {
                        stage: Stage::Loading,
                        kind: FailureKind::StorageRead,
                        reason: "denied".to_string(),
                    },
                    records: None,
                    digest: None,
                    elapsed_ms: 2,
                },
            ],
        };
        let csv = report_to_csv(&report).expect("csv");
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "a,unchanged,3,,,,,,,abc");
        assert_eq!(lines[2], "b,failed,,,,,,loading,denied,");
    }
}

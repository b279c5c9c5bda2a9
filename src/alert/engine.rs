use serde::{Deserialize, Serialize};

use crate::alert::rules::AlertEventKind;
use crate::config::AlertRulesConfig;
use crate::pipeline::{BatchReport, SourceOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub source: String,
    pub title: String,
    pub body: String,
}

pub fn evaluate_alerts(report: &BatchReport) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    for source in &report.sources {
        match &source.outcome {
            SourceOutcome::Unchanged => {}
            SourceOutcome::Changed { summary, archive } => {
                let mut body = format!(
                    "{} added, {} removed, {} modified",
                    summary.added, summary.removed, summary.modified
                );
                if let Some(path) = archive {
                    body.push_str(&format!("; archived at {}", path.display()));
                }
                events.push(AlertEvent {
                    kind: AlertEventKind::SourceChanged,
                    source: source.key.clone(),
                    title: format!("Catalog changed: {}", source.title),
                    body,
                });
            }
            SourceOutcome::Failed {
                stage,
                kind,
                reason,
            } => events.push(AlertEvent {
                kind: AlertEventKind::SourceFailed,
                source: source.key.clone(),
                title: format!("Observation failed: {}", source.title),
                body: format!("{stage} failed ({kind:?}): {reason}"),
            }),
        }
    }

    events
}

pub fn apply_alert_rules(alerts: Vec<AlertEvent>, rules: &AlertRulesConfig) -> Vec<AlertEvent> {
    alerts
        .into_iter()
        .filter(|event| event.kind.enabled(rules))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::DiffSummary;
    use crate::pipeline::{FailureKind, SourceReport, Stage};

    fn report(key: &str, outcome: SourceOutcome) -> SourceReport {
        SourceReport {
            key: key.to_string(),
            title: key.to_uppercase(),
            outcome,
            records: None,
            digest: None,
            elapsed_ms: 1,
        }
    }

    fn batch() -> BatchReport {
        BatchReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            sources: vec![
                report("a", SourceOutcome::Unchanged),
                report(
                    "b",
                    SourceOutcome::Changed {
                        summary: DiffSummary {
                            added: 1,
                            removed: 0,
                            modified: 2,
                        },
                        archive: None,
                    },
                ),
                report(
                    "c",
                    SourceOutcome::Failed {
                        stage: Stage::Fetching,
                        kind: FailureKind::Fetch,
                        reason: "timeout".to_string(),
                    },
                ),
            ],
        }
    }

    #[test]
    fn emits_one_event_per_change_or_failure() {
        let events = evaluate_alerts(&batch());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AlertEventKind::SourceChanged);
        assert_eq!(events[0].body, "1 added, 0 removed, 2 modified");
        assert_eq!(events[1].kind, AlertEventKind::SourceFailed);
        assert!(events[1].body.contains("timeout"));
    }

    #[test]
    fn rules_filter_disabled_kinds() {
        let rules = AlertRulesConfig {
            source_changed: false,
            source_failed: true,
        };
        let events = apply_alert_rules(evaluate_alerts(&batch()), &rules);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "c");
    }
}

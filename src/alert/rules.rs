use serde::{Deserialize, Serialize};

use crate::config::AlertRulesConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    SourceChanged,
    SourceFailed,
}

impl AlertEventKind {
    pub fn enabled(&self, rules: &AlertRulesConfig) -> bool {
        match self {
            Self::SourceChanged => rules.source_changed,
            Self::SourceFailed => rules.source_failed,
        }
    }
}

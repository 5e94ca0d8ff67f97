use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::classifier::Classification;
use crate::router::Route;

/// How much of the original input is retained in an audit record.
const MAX_AUDIT_TEXT: usize = 500;

/// What the pipeline did with a classified message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Generate,
    /// Hosted retry after a local-model connection failure.
    GenerateFallback,
    Refuse,
    AgeVerifyRequired,
}

/// One classification decision, as persisted to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub original_text: String,
    pub normalized_text: String,
    pub text_length: usize,
    pub label: String,
    pub confidence: f32,
    pub indicators: Vec<String>,
    pub route: String,
    pub route_locked: bool,
    pub age_verified: bool,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditRecord {
    pub fn new(
        conversation_id: Uuid,
        user_id: Uuid,
        original_text: &str,
        classification: &Classification,
        route: Route,
        route_locked: bool,
        age_verified: bool,
        action: AuditAction,
        reason: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            conversation_id,
            user_id,
            original_text: truncate(original_text, MAX_AUDIT_TEXT),
            normalized_text: truncate(&classification.normalized_text, MAX_AUDIT_TEXT),
            text_length: original_text.len(),
            label: classification.label.to_string(),
            confidence: classification.confidence,
            indicators: classification.indicators.clone(),
            route: route.to_string(),
            route_locked,
            age_verified,
            action,
            reason,
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

/// Append-only line-delimited JSON audit log on local disk.
///
/// One record per classification. Write failures are logged and dropped -
/// auditing must never fail a turn.
pub struct AuditLogger {
    file: Mutex<Option<File>>,
}

impl AuditLogger {
    pub fn open(path: &str) -> Self {
        if let Some(parent) = Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                error!(path, error = %e, "failed to open audit log");
                e
            })
            .ok();
        Self {
            file: Mutex::new(file),
        }
    }

    /// A logger that drops everything (tests, audit disabled).
    pub fn disabled() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    pub fn log(&self, record: &AuditRecord) {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit record");
                return;
            }
        };
        let mut guard = self.file.lock().unwrap();
        if let Some(file) = guard.as_mut() {
            if let Err(e) = writeln!(file, "{line}") {
                warn!(error = %e, "failed to write audit record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ContentLabel, PatternScores};

    fn classification() -> Classification {
        Classification {
            label: ContentLabel::Safe,
            confidence: 0.95,
            indicators: vec![],
            normalized_text: "hello".to_string(),
            scores: PatternScores::default(),
            judge: None,
        }
    }

    #[test]
    fn writes_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::open(path.to_str().unwrap());

        let record = AuditRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hello",
            &classification(),
            Route::Normal,
            false,
            false,
            AuditAction::Generate,
            None,
        );
        logger.log(&record);
        logger.log(&record);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.label, "SAFE");
        assert_eq!(parsed.action, AuditAction::Generate);
    }

    #[test]
    fn long_input_is_truncated() {
        let long = "x".repeat(2000);
        let record = AuditRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &long,
            &classification(),
            Route::Normal,
            false,
            false,
            AuditAction::Generate,
            None,
        );
        assert_eq!(record.original_text.len(), 500);
        assert_eq!(record.text_length, 2000);
    }

    #[test]
    fn disabled_logger_swallows_records() {
        let logger = AuditLogger::disabled();
        let record = AuditRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hello",
            &classification(),
            Route::Normal,
            false,
            false,
            AuditAction::Refuse,
            Some("NONCONSENSUAL".to_string()),
        );
        logger.log(&record); // must not panic
    }
}

use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    Diffed,
}

pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    last_packet: Option<Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        Ok(Self {
            mode,
            file: OpenOptions::new().create(true).append(true).open(path)?,
            last_packet: None,
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        self.record(
            "req",
            json!({ "method": method, "path": path, "body": body }),
        );
    }

    pub fn log_command(&mut self, action: &str, body: &Value) {
        self.record("cmd", json!({ "action": action, "body": body }));
    }

    pub fn log_status(&mut self, status: u16, body: &Value) {
        let fields = match (self.mode, self.last_packet.as_ref()) {
            (MessageLogMode::Full, _) => json!({ "status": status, "body": body }),
            (MessageLogMode::Diffed, None) => {
                json!({ "status": status, "full": true, "body": body })
            }
            (MessageLogMode::Diffed, Some(previous)) => {
                let changes: Vec<Value> = diff_json(previous, body)
                    .into_iter()
                    .map(|c| json!({ "path": c.path, "old": c.old, "new": c.new }))
                    .collect();
                json!({ "status": status, "changes": changes })
            }
        };
        self.record("status", fields);

        if self.mode == MessageLogMode::Diffed {
            self.last_packet = Some(body.clone());
        }
    }

    fn record(&mut self, dir: &str, mut fields: Value) {
        if let Value::Object(map) = &mut fields {
            map.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
            map.insert("dir".to_string(), json!(dir));
        }
        match serde_json::to_string(&fields) {
            Ok(line) => {
                if let Err(e) = writeln!(self.file, "{line}") {
                    warn!(error = %e, "failed to write message log entry");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode message log entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("POST", "/control/LoginPage.aspx/DoStandardLogin", None);

        let lines = read_lines(path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "POST");
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn diffed_mode_logs_full_first_then_changes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        logger.log_status(200, &json!({"status": {"temperature": 22.0}}));
        logger.log_status(200, &json!({"status": {"temperature": 23.0}}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["full"], true);
        assert!(lines[0]["body"].is_object());
        let changes = lines[1]["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["path"], "status.temperature");
    }

    #[test]
    fn diffed_mode_no_changes_logs_empty_array() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        let body = json!({"status": {"temperature": 22.0}});
        logger.log_status(200, &body);
        logger.log_status(200, &body);

        let lines = read_lines(path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["changes"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn log_command_captures_action() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_command("set_mode", &json!({"mode": 2, "desiredTempC": "24"}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "cmd");
        assert_eq!(lines[0]["action"], "set_mode");
        assert_eq!(lines[0]["body"]["mode"], 2);
    }
}

//! Activity log writer
//!
//! Drains the activity channel into a JSONL file (one event per line) and,
//! when enabled, mirrors each event to MQTT.

use crate::domain::activity::ActivityEvent;
use crate::io::mqtt_egress::MqttActivityPublisher;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Append-only JSONL sink
pub struct ActivityLog {
    file_path: String,
}

impl ActivityLog {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "activity_log_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write one event; returns true if it reached the file
    pub fn write_event(&self, event: &ActivityEvent) -> bool {
        // Empty path disables the file sink
        if self.file_path.is_empty() {
            return false;
        }

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(id = %event.id, error = %e, "activity_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => true,
            Err(e) => {
                error!(id = %event.id, kind = %event.kind.as_str(), error = %e, "activity_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "activity_written");

        Ok(())
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}

/// Activity writer actor
pub struct ActivityWriter {
    rx: mpsc::Receiver<ActivityEvent>,
    log: ActivityLog,
    mqtt: Option<MqttActivityPublisher>,
}

impl ActivityWriter {
    pub fn new(
        rx: mpsc::Receiver<ActivityEvent>,
        log: ActivityLog,
        mqtt: Option<MqttActivityPublisher>,
    ) -> Self {
        Self { rx, log, mqtt }
    }

    /// Run until shutdown, then drain what is already queued
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            file = %self.log.file_path(),
            mqtt_topic = %self.mqtt.as_ref().map(|m| m.topic()).unwrap_or("-"),
            "activity_writer_started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let mut drained = 0usize;
                        while let Ok(event) = self.rx.try_recv() {
                            self.handle(event).await;
                            drained += 1;
                        }
                        info!(drained = %drained, "activity_writer_shutdown");
                        return;
                    }
                }
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            info!("activity_channel_closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, event: ActivityEvent) {
        self.log.write_event(&event);
        if let Some(mqtt) = &self.mqtt {
            mqtt.publish(&event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::ActivityKind;
    use crate::domain::types::Severity;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn event(action: &str) -> ActivityEvent {
        ActivityEvent::new(ActivityKind::System, "stadium-north", json!({ "action": action }))
    }

    #[test]
    fn test_write_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("activity.jsonl");
        let log = ActivityLog::new(file_path.to_str().unwrap());

        let e = event("MONITOR_STARTED").with_severity(Severity::Low);
        assert!(log.write_event(&e));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["id"], e.id);
        assert_eq!(parsed["type"], "SYSTEM");
        assert_eq!(parsed["severity"], "LOW");
    }

    #[test]
    fn test_creates_parent_directories_and_appends() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("var").join("log").join("activity.jsonl");
        fs::create_dir_all(nested.parent().unwrap()).unwrap();
        fs::write(&nested, "{\"existing\":true}\n").unwrap();

        let log = ActivityLog::new(nested.to_str().unwrap());
        assert!(log.write_event(&event("A")));
        assert!(log.write_event(&event("B")));

        let content = fs::read_to_string(&nested).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("existing"));

        let fresh = dir.path().join("new").join("dir").join("activity.jsonl");
        assert!(ActivityLog::new(fresh.to_str().unwrap()).write_event(&event("C")));
        assert!(fresh.exists());
    }

    #[test]
    fn test_empty_path_disables_file() {
        let log = ActivityLog::new("");
        assert!(!log.write_event(&event("A")));
    }

    #[tokio::test]
    async fn test_writer_drains_on_shutdown() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("activity.jsonl");
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for i in 0..3 {
            tx.send(event(&format!("E{i}"))).await.unwrap();
        }
        let writer = ActivityWriter::new(rx, ActivityLog::new(file_path.to_str().unwrap()), None);
        let handle = tokio::spawn(writer.run(shutdown_rx));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_writer_stops_when_senders_gone() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("activity.jsonl");
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(event("ONLY")).await.unwrap();
        drop(tx);

        let writer = ActivityWriter::new(rx, ActivityLog::new(file_path.to_str().unwrap()), None);
        writer.run(shutdown_rx).await;

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}

//! One JSON line per event on stdout
//!
//! The line shape is the structured-log format the platform's log agent
//! ingests: `message`, `severity` and the labels under
//! `logging.googleapis.com/labels`.

use super::{LogEvent, LogSink, LogSinkError};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;

pub struct StdoutJsonSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl StdoutJsonSink {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Write lines somewhere other than stdout
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl Default for StdoutJsonSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Render an event as a single JSON line (no trailing newline)
pub fn to_json_line(event: &LogEvent) -> Result<String, LogSinkError> {
    Ok(serde_json::to_string(event)?)
}

#[async_trait]
impl LogSink for StdoutJsonSink {
    async fn emit(&self, event: &LogEvent) -> Result<(), LogSinkError> {
        let line = to_json_line(event)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| LogSinkError::Init("stdout writer poisoned".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLabels, Severity};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_writes_one_line_per_event() {
        let buf = SharedBuf::default();
        let sink = StdoutJsonSink::with_writer(Box::new(buf.clone()));

        for message in ["one", "two"] {
            sink.emit(&LogEvent {
                message: message.to_string(),
                severity: Severity::Info,
                labels: LogLabels::new("abc123", "desencriptar", "orders"),
            })
            .await
            .unwrap();
        }

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["message"], "one");
        assert_eq!(first["severity"], "INFO");
        assert_eq!(first["logging.googleapis.com/labels"]["process_id"], "abc123");
        assert_eq!(first["logging.googleapis.com/labels"]["enroute"], "yes");
    }
}

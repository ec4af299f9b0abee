use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines diagnostics sink. Writes are best effort; a failing log never
/// fails a render.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    /// Writes one event and bumps the counter for its `type` field.
    pub fn log_event(&self, event: Value) {
        if let Ok(mut state) = self.inner.lock() {
            if let Some(kind) = event.get("type").and_then(Value::as_str) {
                let entry = state.counters.entry(kind.to_string()).or_insert(0);
                *entry = entry.saturating_add(1);
            }
            let _ = writeln!(state.writer, "{event}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts: Map<String, Value> = counters
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect();
            let summary = serde_json::json!({
                "type": "debug.summary",
                "context": context,
                "counts": counts,
            });
            let _ = writeln!(state.writer, "{summary}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_and_sorted_summary_are_written_as_json_lines() {
        let path = std::env::temp_dir().join(format!(
            "evidence_report_debug_{}.jsonl",
            std::process::id()
        ));
        let logger = DebugLogger::new(&path).expect("create log");
        logger.log_event(serde_json::json!({"type": "layout.page_break", "page": 2}));
        logger.log_event(serde_json::json!({"type": "image.load_failed", "role": "logo_a"}));
        logger.log_event(serde_json::json!({"type": "image.load_failed", "role": "logo_b"}));
        logger.increment("steps", 3);
        logger.emit_summary("render");
        logger.flush();

        let text = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 4);
        let summary = &lines[3];
        assert_eq!(summary["type"], "debug.summary");
        assert_eq!(summary["counts"]["image.load_failed"], 2);
        assert_eq!(summary["counts"]["steps"], 3);
        let keys: Vec<&String> = summary["counts"]
            .as_object()
            .expect("counts object")
            .keys()
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        let _ = std::fs::remove_file(&path);
    }
}

//! Span exporters
//!
//! Finished spans are handed to a [`SpanExporter`]. The JSONL exporter appends
//! one line per span to `<trace_dir>/<trace_id>.jsonl`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::error::{AgentError, Result};
use crate::observability::span::{Span, SpanStatus};
use crate::store::validate_id;

/// Receives every span when it ends
pub trait SpanExporter: Send + Sync {
    fn export(&self, span: &Span) -> Result<()>;
}

/// Discards spans
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExporter;

impl SpanExporter for NoopExporter {
    fn export(&self, _span: &Span) -> Result<()> {
        Ok(())
    }
}

/// Keeps spans in memory, in export order
#[derive(Debug, Default)]
pub struct MemoryExporter {
    spans: Mutex<Vec<Span>>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything exported so far
    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn spans_named(&self, name: &str) -> Vec<Span> {
        self.spans()
            .into_iter()
            .filter(|s| s.name == name)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for MemoryExporter {
    fn export(&self, span: &Span) -> Result<()> {
        self.spans
            .lock()
            .map_err(|_| AgentError::Other("span buffer poisoned".to_string()))?
            .push(span.clone());
        Ok(())
    }
}

/// Append-only JSONL trace files, one per trace id
///
/// Export is synchronous and runs on the task that ends the span, including
/// from `Drop` when a span is cancelled. Each export is one short append of a
/// single line, so no blocking pool hop is taken.
#[derive(Debug)]
pub struct JsonlTraceExporter {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTraceExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding a trace
    pub fn trace_path(&self, trace_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", trace_id))
    }

    /// Read every span of a trace in file order. Blank lines are skipped.
    pub fn load(&self, trace_id: &str) -> Result<Vec<Span>> {
        validate_id(trace_id)?;
        let path = self.trace_path(trace_id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgentError::NotFound(format!("trace {}", trace_id)));
            }
            Err(e) => return Err(AgentError::Io(e)),
        };

        let mut spans = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let span: Span =
                serde_json::from_str(&line).map_err(|e| AgentError::CorruptRecord {
                    id: trace_id.to_string(),
                    reason: format!("line {}: {}", line_no + 1, e),
                })?;
            spans.push(span);
        }
        Ok(spans)
    }

    /// Trace ids with a file in the trace directory, sorted
    pub fn list_traces(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".jsonl").map(|id| id.to_string())
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl SpanExporter for JsonlTraceExporter {
    fn export(&self, span: &Span) -> Result<()> {
        validate_id(&span.trace_id)?;
        let line = serde_json::to_string(span)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AgentError::Other("trace writer poisoned".to_string()))?;

        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.trace_path(&span.trace_id))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// A span with its children, ordered by start time
#[derive(Debug, Clone)]
pub struct SpanTree {
    pub span: Span,
    pub children: Vec<SpanTree>,
}

impl SpanTree {
    /// Rebuild call trees from a flat span list.
    ///
    /// Spans whose parent is absent from the list are treated as roots.
    pub fn build(spans: Vec<Span>) -> Vec<SpanTree> {
        let known: std::collections::HashSet<String> =
            spans.iter().map(|s| s.span_id.clone()).collect();

        let mut by_parent: HashMap<Option<String>, Vec<Span>> = HashMap::new();
        for span in spans {
            let parent = span
                .parent_span_id
                .clone()
                .filter(|p| known.contains(p));
            by_parent.entry(parent).or_default().push(span);
        }

        fn attach(span: Span, by_parent: &mut HashMap<Option<String>, Vec<Span>>) -> SpanTree {
            let mut kids = by_parent
                .remove(&Some(span.span_id.clone()))
                .unwrap_or_default();
            kids.sort_by_key(|s| s.start_time);
            let children = kids.into_iter().map(|k| attach(k, by_parent)).collect();
            SpanTree { span, children }
        }

        let mut roots = by_parent.remove(&None).unwrap_or_default();
        roots.sort_by_key(|s| s.start_time);
        roots
            .into_iter()
            .map(|root| attach(root, &mut by_parent))
            .collect()
    }

    /// Number of spans in this subtree
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(SpanTree::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Indented text rendering, one span per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let status = match self.span.status {
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
            SpanStatus::Unset => "-",
        };
        let duration = self
            .span
            .duration_ms()
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "open".to_string());
        out.push_str(&format!(
            "{}{} [{}] {}\n",
            "  ".repeat(depth),
            self.span.name,
            status,
            duration
        ));
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn closed(name: &str, trace: &str, parent: Option<&Span>) -> Span {
        let mut span = Span::new(name, trace, parent.map(|p| p.span_id.clone()));
        span.end_time = Some(span.start_time);
        span.status = SpanStatus::Ok;
        span
    }

    #[test]
    fn test_jsonl_append_and_load() {
        let dir = TempDir::new().unwrap();
        let exporter = JsonlTraceExporter::new(dir.path().join("traces"));

        let root = closed("agent.send_message", "trace-a", None);
        let child = closed("provider.complete", "trace-a", Some(&root));
        exporter.export(&child).unwrap();
        exporter.export(&root).unwrap();
        exporter.export(&closed("agent.send_message", "trace-b", None)).unwrap();

        let spans = exporter.load("trace-a").unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "provider.complete");
        assert_eq!(exporter.list_traces().unwrap(), vec!["trace-a", "trace-b"]);
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let exporter = JsonlTraceExporter::new(dir.path());

        assert!(matches!(exporter.load("nope"), Err(AgentError::NotFound(_))));

        fs::write(dir.path().join("bad.jsonl"), "{\"name\": 3}\n").unwrap();
        assert!(matches!(
            exporter.load("bad"),
            Err(AgentError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_span_tree_build() {
        let root = closed("agent.send_message", "t", None);
        let iteration = closed("agent.iteration", "t", Some(&root));
        let provider = closed("provider.complete", "t", Some(&iteration));
        let orphan = {
            let mut s = closed("conversation.save", "t", None);
            s.parent_span_id = Some("missing".to_string());
            s
        };

        let trees = SpanTree::build(vec![provider, orphan, iteration, root]);
        assert_eq!(trees.len(), 2);

        let main = trees
            .iter()
            .find(|t| t.span.name == "agent.send_message")
            .unwrap();
        assert_eq!(main.len(), 3);
        assert_eq!(main.children[0].children[0].span.name, "provider.complete");
        assert!(main.render().contains("    provider.complete [ok]"));
    }

    #[test]
    fn test_memory_exporter() {
        let exporter = MemoryExporter::new();
        exporter.export(&closed("a", "t", None)).unwrap();
        exporter.export(&closed("b", "t", None)).unwrap();
        assert_eq!(exporter.spans().len(), 2);
        assert_eq!(exporter.spans_named("b").len(), 1);
        exporter.clear();
        assert!(exporter.spans().is_empty());
    }
}

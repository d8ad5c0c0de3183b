//! Offline inspection of dumped replicas.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use mergehub::core::{AutomergeReplica, FieldValue, Replica};

/// Heads, change count and root values of a dump.
#[derive(Debug)]
pub struct Inspection {
    pub heads: Vec<String>,
    pub changes: usize,
    pub values: Vec<(String, FieldValue)>,
}

pub fn inspect_bytes(content: &[u8]) -> anyhow::Result<Inspection> {
    let replica = AutomergeReplica::load(content).context("not a replica dump")?;
    Ok(Inspection {
        heads: replica.heads(),
        changes: replica.change_count(),
        values: replica.values()?.into_iter().collect(),
    })
}

pub fn inspect_file(path: &Path) -> anyhow::Result<Inspection> {
    let content =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    inspect_bytes(&content)
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Counter(n) => format!("{n} (counter)"),
        FieldValue::Int(n) => n.to_string(),
        FieldValue::Text(s) => format!("{s:?}"),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Other(s) => s.clone(),
    }
}

impl Inspection {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "changes: {}", self.changes);
        let _ = writeln!(out, "heads:");
        for head in &self.heads {
            let _ = writeln!(out, "  {head}");
        }
        let _ = writeln!(out, "values:");
        for (key, value) in &self.values {
            let _ = writeln!(out, "  {key} = {}", render_value(value));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergehub::core::Mutation;

    #[test]
    fn test_inspect_reports_counter() {
        let mut replica = AutomergeReplica::empty();
        replica.apply(&Mutation::increment("counter", 3)).unwrap();
        replica.apply(&Mutation::put("name", "hub")).unwrap();

        let inspection = inspect_bytes(&replica.save()).unwrap();
        assert_eq!(inspection.heads, replica.heads());
        assert_eq!(inspection.changes, 2);

        let rendered = inspection.render();
        assert!(rendered.contains("counter = 3 (counter)"));
        assert!(rendered.contains("name = \"hub\""));
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(inspect_bytes(b"not automerge").is_err());
    }

    #[test]
    fn test_inspect_file_reads_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.automerge");
        std::fs::write(&path, AutomergeReplica::empty().save()).unwrap();
        let inspection = inspect_file(&path).unwrap();
        assert!(inspection.values.is_empty());
        assert!(inspect_file(&dir.path().join("missing")).is_err());
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A named unit of benchmark work, or a composite aggregate of other stages.
///
/// Leaf stages come from a single definition file and carry an id, their
/// dependencies and a payload. Composite stages come from directories (or the
/// run root) and only hold children; they have an empty id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ids that must reach `Succeeded` before this stage may start.
    #[serde(default, alias = "depends_on")]
    pub dependencies: Vec<String>,

    #[serde(flatten)]
    pub payload: StagePayload,

    #[serde(skip)]
    pub children: Vec<Stage>,

    /// File or directory this stage was loaded from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Workload description carried by a leaf stage.
///
/// The engine treats it as opaque; stage runners interpret it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub session_params: BTreeMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,

    /// Resolved against the stage file's directory when loaded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_files: Vec<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cold_runs: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warm_runs: Option<u32>,

    #[serde(default)]
    pub random_execution: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_limit: Option<usize>,

    #[serde(default)]
    pub abort_on_error: bool,

    #[serde(default)]
    pub save_output: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Stage {
    /// Leaf stage with the given id and dependencies.
    pub fn new(id: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            id: id.into(),
            dependencies,
            ..Self::default()
        }
    }

    /// Empty composite stage, optionally remembering where it came from.
    pub fn composite(source: Option<PathBuf>) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: StagePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && !self.id.is_empty()
    }

    /// All leaf stages in composition order (depth-first, children in merge order).
    pub fn flatten(&self) -> Vec<&Stage> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Stage>) {
        if self.is_leaf() {
            out.push(self);
            return;
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }

    pub fn leaf_ids(&self) -> Vec<&str> {
        self.flatten().into_iter().map(|s| s.id.as_str()).collect()
    }

    /// Leaf ids joined with `_`, used to build a default run name.
    pub fn composed_name(&self) -> String {
        self.leaf_ids().join("_")
    }

    /// Human readable origin, for diagnostics.
    pub fn origin(&self) -> String {
        match &self.source {
            Some(path) => path.display().to_string(),
            None if self.id.is_empty() => "<root>".to_string(),
            None => format!("<stage {}>", self.id),
        }
    }

    /// Same id, dependency set and payload. Sources and children are ignored.
    pub fn same_definition(&self, other: &Stage) -> bool {
        if self.id != other.id || self.payload != other.payload {
            return false;
        }
        let mut a: Vec<&String> = self.dependencies.iter().collect();
        let mut b: Vec<&String> = other.dependencies.iter().collect();
        a.sort();
        a.dedup();
        b.sort();
        b.dedup();
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_definition() {
        let json = r#"{
            "id": "q1",
            "depends_on": ["setup"],
            "catalog": "hive",
            "schema": "tpch",
            "queries": ["select 1"],
            "cold_runs": 1,
            "warm_runs": 2,
            "session_params": {"query_max_memory": "1GB"}
        }"#;
        let stage: Stage = serde_json::from_str(json).unwrap();
        assert_eq!(stage.id, "q1");
        assert_eq!(stage.dependencies, vec!["setup".to_string()]);
        assert_eq!(stage.payload.catalog.as_deref(), Some("hive"));
        assert_eq!(stage.payload.warm_runs, Some(2));
        assert!(stage.is_leaf());
    }

    #[test]
    fn test_flatten_preserves_composition_order() {
        let mut root = Stage::composite(None);
        let mut dir = Stage::composite(None);
        dir.children.push(Stage::new("b", vec![]));
        dir.children.push(Stage::new("c", vec!["b".into()]));
        root.children.push(Stage::new("a", vec![]));
        root.children.push(dir);

        assert_eq!(root.leaf_ids(), vec!["a", "b", "c"]);
        assert_eq!(root.composed_name(), "a_b_c");
        assert!(!root.is_leaf());
    }

    #[test]
    fn test_same_definition_ignores_dependency_order() {
        let a = Stage::new("x", vec!["p".into(), "q".into()]);
        let b = Stage::new("x", vec!["q".into(), "p".into(), "p".into()]);
        assert!(a.same_definition(&b));

        let c = Stage::new("x", vec!["p".into()]);
        assert!(!a.same_definition(&c));
    }
}

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::GraphError;
use crate::stage::Stage;

/// Stage dependency graph (DAG) built from a merged stage tree.
///
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct StageGraph {
    /// Leaf stages: stage_id -> Stage
    pub nodes: BTreeMap<String, Stage>,

    /// Dependency edges: stage_id -> ids it depends on (deduplicated, declaration order)
    pub edges: BTreeMap<String, Vec<String>>,

    /// Reverse edges: stage_id -> ids that depend on it (sorted)
    pub reverse_edges: BTreeMap<String, Vec<String>>,

    ready_sets: Vec<Vec<String>>,
    order: Vec<String>,
}

/// Flatten, validate and order a (possibly composite) root stage.
pub fn parse_stage_graph(root: &Stage) -> Result<StageGraph, GraphError> {
    let mut graph = StageGraph::from_stage(root)?;
    graph.validate()?;
    graph.ready_sets = graph.topological_sort()?;
    graph.order = graph.ready_sets.concat();
    tracing::debug!(
        stages = graph.nodes.len(),
        levels = graph.ready_sets.len(),
        "stage graph built"
    );
    Ok(graph)
}

impl StageGraph {
    /// Construct the graph from every leaf of `root`. Identical duplicate
    /// definitions collapse into one node.
    pub fn from_stage(root: &Stage) -> Result<Self, GraphError> {
        let mut nodes: BTreeMap<String, Stage> = BTreeMap::new();
        let mut edges = BTreeMap::new();
        let mut reverse_edges: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for stage in root.flatten() {
            if let Some(existing) = nodes.get(&stage.id) {
                if existing.same_definition(stage) {
                    continue;
                }
                return Err(GraphError::DuplicateStageId(stage.id.clone()));
            }

            let mut seen = HashSet::new();
            let dependencies: Vec<String> = stage
                .dependencies
                .iter()
                .filter(|d| seen.insert(d.as_str()))
                .cloned()
                .collect();

            for dep in &dependencies {
                reverse_edges
                    .entry(dep.clone())
                    .or_default()
                    .push(stage.id.clone());
            }
            edges.insert(stage.id.clone(), dependencies);
            nodes.insert(stage.id.clone(), stage.clone());
        }

        for dependents in reverse_edges.values_mut() {
            dependents.sort();
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            ready_sets: Vec::new(),
            order: Vec::new(),
        })
    }

    /// Check every dependency resolves, then look for cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (stage_id, dependencies) in &self.edges {
            for dep in dependencies {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::UnresolvedDependency {
                        stage: stage_id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(GraphError::CyclicDependency(cycle));
        }

        Ok(())
    }

    /// Topological sort using Kahn's algorithm.
    ///
    /// Returns ready sets: every stage of a set has all its dependencies in
    /// earlier sets. Each set is sorted by id, so the partition is a pure
    /// function of the graph.
    pub fn topological_sort(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut sets: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| id.to_string())
            .collect();
        let mut processed = 0;

        while !current.is_empty() {
            processed += current.len();

            let mut next = BTreeSet::new();
            for stage_id in &current {
                for dependent in self.dependents(stage_id) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.insert(dependent.clone());
                        }
                    }
                }
            }

            sets.push(std::mem::take(&mut current));
            current = next.into_iter().collect();
        }

        if processed != self.nodes.len() {
            let stuck: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(GraphError::CyclicDependency(stuck));
        }

        Ok(sets)
    }

    /// Depth-first search with an explicit recursion stack. Returns the cycle
    /// path (first node repeated at the end) if one exists.
    fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        let mut on_stack = HashSet::new();

        for stage_id in self.nodes.keys() {
            if !visited.contains(stage_id.as_str()) {
                if let Some(cycle) =
                    self.dfs_cycle(stage_id, &mut visited, &mut stack, &mut on_stack)
                {
                    return Some(cycle);
                }
            }
        }

        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        on_stack: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        stack.push(node);
        on_stack.insert(node);

        for dep in self.dependencies(node) {
            if on_stack.contains(dep.as_str()) {
                let pos = stack.iter().position(|x| *x == dep.as_str())?;
                let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            if !visited.contains(dep.as_str()) {
                if let Some(cycle) = self.dfs_cycle(dep, visited, stack, on_stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        on_stack.remove(node);
        None
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.nodes.get(id)
    }

    pub fn dependencies(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents(&self, id: &str) -> &[String] {
        self.reverse_edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every stage reachable through reverse edges from `id`, sorted.
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        let mut stack: Vec<&str> = vec![id];
        while let Some(current) = stack.pop() {
            for dependent in self.dependents(current) {
                if out.insert(dependent.clone()) {
                    stack.push(dependent);
                }
            }
        }
        out.into_iter().collect()
    }

    /// Groups of stages that can run together, in dependency order.
    pub fn ready_sets(&self) -> &[Vec<String>] {
        &self.ready_sets
    }

    /// A linearization where every stage follows all of its dependencies.
    pub fn order(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn root(stages: &[(&str, &[&str])]) -> Stage {
        let mut root = Stage::composite(None);
        for (id, deps) in stages {
            root.children
                .push(Stage::new(*id, deps.iter().map(|d| d.to_string()).collect()));
        }
        root
    }

    fn assert_valid_order(graph: &StageGraph) {
        let pos: HashMap<&str, usize> = graph
            .order()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        assert_eq!(pos.len(), graph.len());
        for (id, deps) in &graph.edges {
            for dep in deps {
                assert!(pos[dep.as_str()] < pos[id.as_str()], "{dep} must precede {id}");
            }
        }
    }

    #[test]
    fn test_ready_sets_example() {
        let graph = parse_stage_graph(&root(&[("a", &[]), ("b", &[]), ("c", &["b"])])).unwrap();
        assert_eq!(
            graph.ready_sets(),
            &[vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]
        );
        assert_valid_order(&graph);
    }

    #[test]
    fn test_ready_sets_ties_broken_by_id() {
        let first = parse_stage_graph(&root(&[("z", &[]), ("m", &[]), ("a", &["z", "m"])])).unwrap();
        let second = parse_stage_graph(&root(&[("a", &["m", "z"]), ("m", &[]), ("z", &[])])).unwrap();
        assert_eq!(first.ready_sets(), second.ready_sets());
        assert_eq!(first.ready_sets()[0], vec!["m".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_diamond_order() {
        let graph = parse_stage_graph(&root(&[
            ("load", &[]),
            ("q1", &["load"]),
            ("q2", &["load"]),
            ("report", &["q1", "q2"]),
        ]))
        .unwrap();
        assert_eq!(graph.ready_sets().len(), 3);
        assert_valid_order(&graph);
        assert_eq!(
            graph.transitive_dependents("load"),
            vec!["q1".to_string(), "q2".to_string(), "report".to_string()]
        );
    }

    #[test]
    fn test_generated_chains_are_ordered() {
        for width in 1..6 {
            for depth in 1..6 {
                let mut stages: Vec<(String, Vec<String>)> = Vec::new();
                for level in 0..depth {
                    for col in 0..width {
                        let id = format!("s{level}_{col}");
                        let deps = if level == 0 {
                            vec![]
                        } else {
                            (0..width)
                                .filter(|c| (c + col) % 2 == 0)
                                .map(|c| format!("s{}_{c}", level - 1))
                                .collect()
                        };
                        stages.push((id, deps));
                    }
                }
                stages.reverse();
                let mut r = Stage::composite(None);
                for (id, deps) in stages {
                    r.children.push(Stage::new(id, deps));
                }
                let graph = parse_stage_graph(&r).unwrap();
                assert_valid_order(&graph);
            }
        }
    }

    #[test]
    fn test_two_node_cycle_names_both() {
        let err = parse_stage_graph(&root(&[("A", &["B"]), ("B", &["A"])])).unwrap_err();
        match &err {
            GraphError::CyclicDependency(cycle) => {
                assert!(cycle.contains(&"A".to_string()));
                assert!(cycle.contains(&"B".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("A -> B -> A"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = parse_stage_graph(&root(&[("a", &["a"])])).unwrap_err();
        assert_eq!(
            err,
            GraphError::CyclicDependency(vec!["a".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_longer_cycle_behind_valid_prefix() {
        let err = parse_stage_graph(&root(&[
            ("start", &[]),
            ("x", &["start", "z"]),
            ("y", &["x"]),
            ("z", &["y"]),
        ]))
        .unwrap_err();
        let GraphError::CyclicDependency(cycle) = err else {
            panic!("expected cycle");
        };
        for id in ["x", "y", "z"] {
            assert!(cycle.contains(&id.to_string()));
        }
        assert!(!cycle.contains(&"start".to_string()));
    }

    #[test]
    fn test_unresolved_dependency() {
        let err = parse_stage_graph(&root(&[("a", &["zzz"]), ("b", &[])])).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnresolvedDependency {
                stage: "a".to_string(),
                missing: "zzz".to_string(),
            }
        );
        assert!(err.stage_ids().contains(&"zzz"));
    }

    #[test]
    fn test_conflicting_duplicate_leaf() {
        let err = parse_stage_graph(&root(&[("a", &[]), ("a", &["b"]), ("b", &[])])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStageId("a".to_string()));
    }

    #[test]
    fn test_identical_duplicate_leaf_collapses() {
        let graph = parse_stage_graph(&root(&[("a", &[]), ("a", &[])])).unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_duplicate_dependency_counts_once() {
        let graph = parse_stage_graph(&root(&[("a", &[]), ("b", &["a", "a"])])).unwrap();
        assert_eq!(graph.dependencies("b"), &["a".to_string()]);
        assert_eq!(graph.ready_sets().len(), 2);
    }

    #[test]
    fn test_empty_root() {
        let graph = parse_stage_graph(&Stage::composite(None)).unwrap();
        assert!(graph.is_empty());
        assert!(graph.ready_sets().is_empty());
    }
}

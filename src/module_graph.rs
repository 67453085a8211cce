//! # Module Dependency Graph (C2, §3.4)
//!
//! Nodes are module names; an edge `A -> B` means `A` imports from `B`.
//! Supports topological ordering, cycle detection with the full cycle path,
//! and missing-import detection.

use std::collections::{HashMap, HashSet};

use crate::error::ModuleGraphError;

/// A dependency graph over module names.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    /// module name -> names it imports from
    edges: HashMap<String, Vec<String>>,
}

impl ModuleGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module and the modules it imports from. Safe to call once
    /// per module; a module with no imports still needs an entry so it's
    /// considered a known node.
    pub fn add_module(&mut self, name: impl Into<String>, imports: Vec<String>) {
        self.edges.insert(name.into(), imports);
    }

    /// `true` if `name` was registered via `add_module`.
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Verify every import target names a registered module.
    ///
    /// Returns the name of the first dangling target found; iteration order
    /// over modules is their insertion order for determinism in tests.
    pub fn check_missing_imports(&self) -> Result<(), ModuleGraphError> {
        for imports in self.edges.values() {
            for target in imports {
                if !self.edges.contains_key(target) {
                    return Err(ModuleGraphError::ModuleNotFound(target.clone()));
                }
            }
        }
        Ok(())
    }

    /// DFS-based cycle detection. Returns the first cycle found, as a path
    /// `A -> B -> ... -> A` (first and last elements equal).
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut state: HashMap<&str, VisitState> = HashMap::new();
        let mut stack: Vec<String> = Vec::new();

        let mut names: Vec<&String> = self.edges.keys().collect();
        names.sort();

        for start in names {
            if state.get(start.as_str()).is_none() {
                if let Some(cycle) = self.dfs_cycle(start, &mut state, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        state: &mut HashMap<&'a str, VisitState>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        state.insert(node, VisitState::InProgress);
        stack.push(node.to_string());

        if let Some(imports) = self.edges.get(node) {
            let mut sorted_imports = imports.clone();
            sorted_imports.sort();
            for next in &sorted_imports {
                match state.get(next.as_str()) {
                    Some(VisitState::InProgress) => {
                        let start = stack.iter().position(|n| n == next).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..].to_vec();
                        cycle.push(next.clone());
                        return Some(cycle);
                    }
                    Some(VisitState::Done) => continue,
                    None => {
                        if let Some(cycle) = self.dfs_cycle(next, state, stack) {
                            return Some(cycle);
                        }
                    }
                }
            }
        }

        stack.pop();
        state.insert(node, VisitState::Done);
        None
    }

    /// A topological order, dependencies first. Mutually independent
    /// modules are ordered stably (by name) but the relative order between
    /// them is otherwise unspecified, per §3.4.
    ///
    /// Callers must have already checked for missing imports and cycles;
    /// this performs no validation and will silently drop unreachable
    /// cycles' members if called on an invalid graph (use
    /// `check_missing_imports` / `find_cycle` first).
    pub fn topological_order(&self) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut order: Vec<String> = Vec::new();

        let mut names: Vec<&String> = self.edges.keys().collect();
        names.sort();

        for name in names {
            self.visit_topo(name, &mut visited, &mut order);
        }
        order
    }

    fn visit_topo<'a>(&'a self, node: &'a str, visited: &mut HashSet<&'a str>, order: &mut Vec<String>) {
        if visited.contains(node) {
            return;
        }
        visited.insert(node);
        if let Some(imports) = self.edges.get(node) {
            let mut sorted_imports = imports.clone();
            sorted_imports.sort();
            for next in &sorted_imports {
                self.visit_topo(next, visited, order);
            }
        }
        order.push(node.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topo_order_places_dependency_first() {
        let mut g = ModuleGraph::new();
        g.add_module("A", vec!["B".to_string()]);
        g.add_module("B", vec![]);

        let order = g.topological_order();
        let pos_a = order.iter().position(|m| m == "A").unwrap();
        let pos_b = order.iter().position(|m| m == "B").unwrap();
        assert!(pos_b < pos_a);
    }

    #[test]
    fn missing_import_detected() {
        let mut g = ModuleGraph::new();
        g.add_module("A", vec!["Ghost".to_string()]);
        let err = g.check_missing_imports().unwrap_err();
        assert_eq!(err, ModuleGraphError::ModuleNotFound("Ghost".to_string()));
    }

    #[test]
    fn cycle_is_detected_with_full_path() {
        let mut g = ModuleGraph::new();
        g.add_module("A", vec!["B".to_string()]);
        g.add_module("B", vec!["A".to_string()]);

        let cycle = g.find_cycle().expect("cycle expected");
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&"A".to_string()));
        assert!(cycle.contains(&"B".to_string()));
    }

    #[test]
    fn no_cycle_in_dag() {
        let mut g = ModuleGraph::new();
        g.add_module("A", vec!["B".to_string(), "C".to_string()]);
        g.add_module("B", vec!["C".to_string()]);
        g.add_module("C", vec![]);
        assert!(g.find_cycle().is_none());
    }
}

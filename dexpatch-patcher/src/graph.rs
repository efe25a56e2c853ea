//! Patch dependency ordering.

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Named nodes with declared dependencies, kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    dependencies: Vec<Vec<String>>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node. Dependencies may name nodes declared later; they
    /// are checked when an order is computed.
    pub fn add(&mut self, name: impl Into<String>, dependencies: Vec<String>) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicatePatch(name));
        }
        self.index.insert(name.clone(), self.names.len());
        self.names.push(name);
        self.dependencies.push(dependencies);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Every node, dependencies first. Ties keep declaration order.
    pub fn order(&self) -> Result<Vec<String>> {
        let roots: Vec<&str> = self.names.iter().map(String::as_str).collect();
        self.order_from(&roots)
    }

    /// `roots` and everything they transitively depend on, dependencies
    /// first. Fails on the first cycle found, naming its members.
    pub fn order_from(&self, roots: &[&str]) -> Result<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.names.len()];
        let mut path = Vec::new();
        let mut out = Vec::new();
        for root in roots {
            let i = *self
                .index
                .get(*root)
                .ok_or_else(|| Error::UnknownPatch(root.to_string()))?;
            self.visit(i, &mut marks, &mut path, &mut out)?;
        }
        Ok(out.into_iter().map(|i| self.names[i].clone()).collect())
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        out: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|&n| self.names[n].clone()).collect();
                cycle.push(self.names[node].clone());
                return Err(Error::CyclicDependency { cycle });
            }
            Mark::Unvisited => {}
        }
        marks[node] = Mark::InProgress;
        path.push(node);
        for dependency in &self.dependencies[node] {
            let next = *self.index.get(dependency).ok_or_else(|| Error::UnknownDependency {
                patch: self.names[node].clone(),
                dependency: dependency.clone(),
            })?;
            self.visit(next, marks, path, out)?;
        }
        path.pop();
        marks[node] = Mark::Done;
        out.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `("a", "b c")` declares `a` depending on `b` then `c`.
    fn graph(nodes: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (name, deps) in nodes {
            g.add(*name, deps.split_whitespace().map(str::to_string).collect())
                .unwrap();
        }
        g
    }

    #[test]
    fn dependencies_come_first_in_declaration_order() {
        let g = graph(&[
            ("hide-shorts", "settings litho-filter"),
            ("settings", "integrations"),
            ("litho-filter", "integrations"),
            ("integrations", ""),
            ("opus", ""),
        ]);
        assert_eq!(
            g.order().unwrap(),
            ["integrations", "settings", "litho-filter", "hide-shorts", "opus"]
        );
    }

    #[test]
    fn shared_dependency_listed_once() {
        let g = graph(&[("a", "c"), ("b", "c"), ("c", "")]);
        assert_eq!(g.order().unwrap(), ["c", "a", "b"]);
    }

    #[test]
    fn three_cycle_names_members() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a")]);
        match g.order() {
            Err(Error::CyclicDependency { cycle }) => assert_eq!(cycle, ["a", "b", "c", "a"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("a", "a")]);
        assert!(matches!(g.order(), Err(Error::CyclicDependency { cycle }) if cycle == ["a", "a"]));
    }

    #[test]
    fn subset_order_pulls_in_dependencies_only() {
        let g = graph(&[("a", "b"), ("b", ""), ("c", "")]);
        assert_eq!(g.order_from(&["a"]).unwrap(), ["b", "a"]);
        assert!(matches!(g.order_from(&["zzz"]), Err(Error::UnknownPatch(_))));
    }

    #[test]
    fn unknown_dependency_and_duplicates() {
        let mut g = graph(&[("a", "missing")]);
        assert!(matches!(
            g.order(),
            Err(Error::UnknownDependency { ref dependency, .. }) if dependency == "missing"
        ));
        assert!(matches!(g.add("a", vec![]), Err(Error::DuplicatePatch(_))));
    }
}

//! Fallback definitions and the delegation graph.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::operation::Operation;

/// Hops a single call may take through delegated fallbacks.
pub const MAX_FALLBACK_DEPTH: usize = 8;

/// What to do when a service is blocked or its call failed.
#[derive(Clone)]
pub enum Fallback {
    /// Route the call to another service's registered provider, through
    /// that service's own breaker, limiter and fallback.
    Delegate(String),
    /// Run a collaborator-supplied operation with the same arguments.
    Handler(Arc<dyn Operation>),
    /// Answer with a fixed value, typically a cached default.
    Static(Value),
}

impl Fallback {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delegate(_) => "delegate",
            Self::Handler(_) => "handler",
            Self::Static(_) => "static",
        }
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delegate(target) => f.debug_tuple("Delegate").field(target).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
        }
    }
}

/// Delegation edges between services. Kept acyclic.
#[derive(Debug, Clone, Default)]
pub struct FallbackGraph {
    edges: HashMap<String, String>,
}

impl FallbackGraph {
    /// Add or replace the delegation `from -> to`.
    ///
    /// Fails with the offending path when the edge would close a cycle;
    /// the graph is left unchanged in that case.
    pub fn link(&mut self, from: &str, to: &str) -> Result<(), Vec<String>> {
        let mut path = vec![from.to_string(), to.to_string()];
        if from == to {
            return Err(path);
        }

        let mut current = to;
        while let Some(next) = self.edges.get(current) {
            path.push(next.clone());
            if next == from {
                return Err(path);
            }
            current = next;
        }

        self.edges.insert(from.to_string(), to.to_string());
        Ok(())
    }

    pub fn unlink(&mut self, from: &str) -> Option<String> {
        self.edges.remove(from)
    }

    pub fn target(&self, from: &str) -> Option<&str> {
        self.edges.get(from).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_accepted() {
        let mut graph = FallbackGraph::default();
        assert!(graph.link("a", "b").is_ok());
        assert!(graph.link("b", "c").is_ok());
        assert_eq!(graph.target("a"), Some("b"));
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let mut graph = FallbackGraph::default();
        graph.link("a", "b").unwrap();
        graph.link("b", "c").unwrap();

        let path = graph.link("c", "a").unwrap_err();
        assert_eq!(path, vec!["c", "a", "b", "c"]);
        assert_eq!(graph.target("c"), None);

        assert_eq!(graph.link("d", "d").unwrap_err(), vec!["d", "d"]);
    }

    #[test]
    fn test_relink_replaces_edge() {
        let mut graph = FallbackGraph::default();
        graph.link("a", "b").unwrap();
        graph.link("b", "c").unwrap();
        // a -> c replaces a -> b; no cycle is formed.
        graph.link("a", "c").unwrap();
        assert_eq!(graph.target("a"), Some("c"));

        graph.unlink("b");
        assert!(graph.link("c", "b").is_ok());
    }
}

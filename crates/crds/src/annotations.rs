//! Hold-off and re-init annotations.
//!
//! Both annotations share one value format: an empty string targets every
//! node, otherwise the value is a comma-separated list of node names.

/// Pauses scanning on the listed nodes (or all nodes when empty)
pub const HOLDOFF_ANNOTATION: &str = "fileintegrity.microscaler.io/holdoff";

/// Requests a database re-initialization on the listed nodes
pub const REINIT_ANNOTATION: &str = "fileintegrity.microscaler.io/re-init";

/// Which nodes an annotation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeScope {
    /// Empty annotation value
    All,
    /// Explicit node list
    Nodes(Vec<String>),
}

impl NodeScope {
    /// Parse an annotation value
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return Self::All;
        }
        Self::Nodes(
            value
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether the scope covers the given node
    #[must_use]
    pub fn contains(&self, node: &str) -> bool {
        match self {
            Self::All => true,
            Self::Nodes(nodes) => nodes.iter().any(|n| n == node),
        }
    }

    /// Render back to the annotation value
    #[must_use]
    pub fn to_annotation_value(&self) -> String {
        match self {
            Self::All => String::new(),
            Self::Nodes(nodes) => nodes.join(","),
        }
    }
}

/// Result of editing a node-list annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationChange {
    /// Nothing to patch
    Unchanged,
    /// Set the annotation to this value
    Set(String),
    /// Delete the annotation
    Remove,
}

/// Add `node` to an annotation value.
///
/// An absent annotation becomes a single-node list. An all-nodes value
/// already covers the node and is left alone.
#[must_use]
pub fn add_node(current: Option<&str>, node: &str) -> AnnotationChange {
    let Some(current) = current else {
        return AnnotationChange::Set(node.to_string());
    };
    match NodeScope::parse(current) {
        NodeScope::All => AnnotationChange::Unchanged,
        NodeScope::Nodes(mut nodes) => {
            if nodes.iter().any(|n| n == node) {
                return AnnotationChange::Unchanged;
            }
            nodes.push(node.to_string());
            AnnotationChange::Set(NodeScope::Nodes(nodes).to_annotation_value())
        }
    }
}

/// Remove `node` from an annotation value.
///
/// Removing the last listed node deletes the annotation. An all-nodes
/// value is never narrowed by a single-node removal.
#[must_use]
pub fn remove_node(current: Option<&str>, node: &str) -> AnnotationChange {
    let Some(current) = current else {
        return AnnotationChange::Unchanged;
    };
    match NodeScope::parse(current) {
        NodeScope::All => AnnotationChange::Unchanged,
        NodeScope::Nodes(nodes) => {
            if !nodes.iter().any(|n| n == node) {
                return AnnotationChange::Unchanged;
            }
            let remaining: Vec<String> = nodes.into_iter().filter(|n| n != node).collect();
            if remaining.is_empty() {
                AnnotationChange::Remove
            } else {
                AnnotationChange::Set(NodeScope::Nodes(remaining).to_annotation_value())
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::*;

/// Filter and collapse selections applied to a [`GraphModel`] before layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub label_filter: String,
    pub type_filters: BTreeSet<String>,
    pub edge_label_filter: String,
    pub collapsed: BTreeSet<String>,
}

impl ViewState {
    pub fn has_active_filters(&self) -> bool {
        !self.label_filter.trim().is_empty()
            || !self.type_filters.is_empty()
            || !self.edge_label_filter.trim().is_empty()
    }

    pub fn toggle_collapsed(&mut self, id: &str) {
        if !self.collapsed.remove(id) {
            self.collapsed.insert(id.to_string());
        }
    }

    /// Nodes and edges that remain visible, in model order.
    ///
    /// Descendants of collapsed nodes are hidden using the full edge set, so
    /// a node stays hidden even when the edge leading to it was filtered out.
    pub fn apply(&self, model: &GraphModel) -> (Vec<Node>, Vec<Edge>) {
        let filtering = self.has_active_filters();
        let label_filter = self.label_filter.trim().to_lowercase();
        let edge_filter = self.edge_label_filter.trim().to_lowercase();

        let nodes: Vec<&Node> = model
            .nodes
            .iter()
            .filter(|node| {
                (label_filter.is_empty() || node.label.to_lowercase().contains(&label_filter))
                    && (self.type_filters.is_empty() || self.type_filters.contains(&node.kind))
            })
            .collect();
        let visible: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();

        let edges: Vec<&Edge> = model
            .edges
            .iter()
            .filter(|edge| {
                visible.contains(edge.source.as_str())
                    && visible.contains(edge.target.as_str())
                    && (edge_filter.is_empty()
                        || edge
                            .label
                            .as_deref()
                            .is_some_and(|label| label.to_lowercase().contains(&edge_filter)))
            })
            .collect();

        let nodes: Vec<&Node> = if edge_filter.is_empty() {
            nodes
        } else {
            let touched: HashSet<&str> = edges
                .iter()
                .flat_map(|edge| [edge.source.as_str(), edge.target.as_str()])
                .collect();
            nodes
                .into_iter()
                .filter(|node| touched.contains(node.id.as_str()))
                .collect()
        };

        let hidden: HashSet<String> = self
            .collapsed
            .iter()
            .flat_map(|id| descendants(id, &model.edges))
            .collect();

        let nodes: Vec<Node> = nodes
            .into_iter()
            .filter(|node| !hidden.contains(&node.id))
            .cloned()
            .collect();

        if nodes.is_empty() && (filtering || !self.collapsed.is_empty()) {
            return (Vec::new(), Vec::new());
        }

        let remaining: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
        let edges: Vec<Edge> = edges
            .into_iter()
            .filter(|edge| remaining.contains(edge.source.as_str()) && remaining.contains(edge.target.as_str()))
            .cloned()
            .collect();

        (nodes, edges)
    }
}

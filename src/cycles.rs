//! Back-edge removal that turns an arbitrary relation set into a DAG.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::*;

/// Removes back edges found by a depth-first walk so the remaining edges form
/// a DAG.
///
/// Roots are tried in `nodes` order and neighbours in `edges` order, so the
/// result only depends on input ordering. Each time a neighbour is found on
/// the current path, the first surviving edge between the pair is dropped.
/// Parallel edges that participate in the same cycle are only dropped one
/// per encounter; the result is acyclic but not necessarily a simple graph.
///
/// Edges whose endpoints are not in `nodes` are tolerated. An edge whose
/// source is never reached by the walk is always kept.
pub fn break_cycles(nodes: &[Node], edges: &[Edge]) -> Vec<Edge> {
    let adjacency = adjacency(edges);
    let mut removed = vec![false; edges.len()];
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut visited: HashSet<&str> = HashSet::new();

    for node in nodes {
        let root = node.id.as_str();
        if visited.contains(root) {
            continue;
        }

        // (node id, index of the next outgoing edge to inspect)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        on_path.insert(root);
        visited.insert(root);

        while let Some(frame) = stack.last_mut() {
            let (current, cursor) = *frame;
            let outgoing = adjacency.get(current).map(Vec::as_slice).unwrap_or(&[]);

            let Some(&edge_idx) = outgoing.get(cursor) else {
                on_path.remove(current);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            let neighbour = edges[edge_idx].target.as_str();
            if on_path.contains(neighbour) {
                let candidate = outgoing
                    .iter()
                    .copied()
                    .find(|&idx| !removed[idx] && edges[idx].target == neighbour);
                if let Some(idx) = candidate {
                    warn!(
                        edge = %edges[idx].id,
                        "cycle detected and broken: edge from {current} to {neighbour} removed"
                    );
                    removed[idx] = true;
                }
            }

            if visited.insert(neighbour) {
                on_path.insert(neighbour);
                stack.push((neighbour, 0));
            }
        }
    }

    edges
        .iter()
        .zip(removed)
        .filter(|(_, removed)| !removed)
        .map(|(edge, _)| edge.clone())
        .collect()
}

/// Returns the node ids along one directed cycle, if the graph has any.
///
/// The first id is repeated implicitly: `["a", "b"]` means `a → b → a`.
pub fn find_cycle(nodes: &[Node], edges: &[Edge]) -> Option<Vec<String>> {
    let adjacency = adjacency(edges);
    let mut visited: HashSet<&str> = HashSet::new();

    let roots = nodes
        .iter()
        .map(|node| node.id.as_str())
        .chain(edges.iter().map(|edge| edge.source.as_str()));

    for root in roots {
        if visited.contains(root) {
            continue;
        }

        let mut path: Vec<&str> = vec![root];
        let mut on_path: HashMap<&str, usize> = HashMap::from([(root, 0)]);
        let mut cursors: Vec<usize> = vec![0];
        visited.insert(root);

        while let Some(&current) = path.last() {
            let depth = path.len() - 1;
            let outgoing = adjacency.get(current).map(Vec::as_slice).unwrap_or(&[]);

            let Some(&edge_idx) = outgoing.get(cursors[depth]) else {
                on_path.remove(current);
                path.pop();
                cursors.pop();
                continue;
            };
            cursors[depth] += 1;

            let neighbour = edges[edge_idx].target.as_str();
            if let Some(&start) = on_path.get(neighbour) {
                return Some(path[start..].iter().map(|id| id.to_string()).collect());
            }
            if visited.insert(neighbour) {
                on_path.insert(neighbour, path.len());
                path.push(neighbour);
                cursors.push(0);
            }
        }
    }

    None
}

pub fn is_acyclic(nodes: &[Node], edges: &[Edge]) -> bool {
    find_cycle(nodes, edges).is_none()
}

fn adjacency(edges: &[Edge]) -> HashMap<&str, Vec<usize>> {
    let mut adjacency: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        adjacency.entry(edge.source.as_str()).or_default().push(idx);
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| Node::new(*id, *id, DEFAULT_NODE_KIND)).collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
        pairs
            .iter()
            .enumerate()
            .map(|(idx, (from, to))| Edge::new(format!("e{idx}"), *from, *to))
            .collect()
    }

    fn ids(edges: &[Edge]) -> Vec<&str> {
        edges.iter().map(|edge| edge.id.as_str()).collect()
    }

    #[test]
    fn keeps_acyclic_input_untouched() {
        let nodes = nodes(&["A", "B", "C"]);
        let input = edges(&[("A", "B"), ("B", "C")]);
        assert_eq!(break_cycles(&nodes, &input), input);
    }

    #[test]
    fn removes_self_loop() {
        let nodes = nodes(&["A"]);
        let input = edges(&[("A", "A")]);
        assert!(break_cycles(&nodes, &input).is_empty());
    }

    #[test]
    fn breaks_triangle_by_dropping_closing_edge() {
        let nodes = nodes(&["A", "B", "C"]);
        let input = edges(&[("A", "B"), ("B", "C"), ("C", "A")]);
        let output = break_cycles(&nodes, &input);

        assert_eq!(output.len(), 2);
        assert_eq!(ids(&output), vec!["e0", "e1"]);
        assert!(is_acyclic(&nodes, &output));
    }

    #[test]
    fn root_order_decides_which_edge_goes() {
        let nodes = nodes(&["B", "A"]);
        let input = edges(&[("A", "B"), ("B", "A")]);
        let output = break_cycles(&nodes, &input);
        assert_eq!(ids(&output), vec!["e1"]);
    }

    #[test]
    fn covers_disconnected_components() {
        let nodes = nodes(&["A", "B", "C", "D", "E"]);
        let input = edges(&[("A", "B"), ("B", "A"), ("C", "D"), ("D", "C")]);
        let output = break_cycles(&nodes, &input);
        assert_eq!(ids(&output), vec!["e0", "e2"]);
    }

    #[test]
    fn removes_each_parallel_back_edge_it_walks() {
        let nodes = nodes(&["A", "B"]);
        let input = edges(&[("A", "B"), ("B", "A"), ("B", "A")]);
        let output = break_cycles(&nodes, &input);
        assert_eq!(ids(&output), vec!["e0"]);
    }

    #[test]
    fn keeps_parallel_forward_edges() {
        let nodes = nodes(&["A", "B"]);
        let input = edges(&[("A", "B"), ("A", "B"), ("B", "A")]);
        let output = break_cycles(&nodes, &input);
        assert_eq!(ids(&output), vec!["e0", "e1"]);
    }

    #[test]
    fn tolerates_dangling_endpoints() {
        let nodes = nodes(&["A", "B"]);
        let input = edges(&[("A", "B"), ("B", "ghost"), ("phantom", "A")]);
        let output = break_cycles(&nodes, &input);
        assert_eq!(output, input);
    }

    #[test]
    fn survives_deep_chains_without_recursion() {
        let count = 50_000;
        let ids: Vec<String> = (0..count).map(|idx| format!("n{idx}")).collect();
        let nodes: Vec<Node> = ids.iter().map(|id| Node::new(id, id, "x")).collect();
        let mut input: Vec<Edge> = ids
            .windows(2)
            .enumerate()
            .map(|(idx, pair)| Edge::new(format!("e{idx}"), &pair[0], &pair[1]))
            .collect();
        input.push(Edge::new("back", &ids[count - 1], &ids[0]));

        let output = break_cycles(&nodes, &input);
        assert_eq!(output.len(), count - 1);
        assert!(output.iter().all(|edge| edge.id != "back"));
    }

    #[test]
    fn find_cycle_reports_path() {
        let nodes = nodes(&["A", "B", "C"]);
        let input = edges(&[("A", "B"), ("B", "C"), ("C", "B")]);
        assert_eq!(find_cycle(&nodes, &input), Some(vec!["B".to_string(), "C".to_string()]));
        assert_eq!(
            find_cycle(&nodes, &edges(&[("A", "A")])),
            Some(vec!["A".to_string()])
        );
        assert_eq!(find_cycle(&nodes, &edges(&[("A", "B")])), None);
    }

    fn arb_graph() -> impl Strategy<Value = (Vec<Node>, Vec<Edge>)> {
        (1usize..12).prop_flat_map(|count| {
            prop::collection::vec((0..count, 0..count), 0..40).prop_map(move |pairs| {
                let nodes: Vec<Node> = (0..count)
                    .map(|idx| Node::new(format!("n{idx}"), format!("node {idx}"), "x"))
                    .collect();
                let edges: Vec<Edge> = pairs
                    .into_iter()
                    .enumerate()
                    .map(|(idx, (from, to))| {
                        Edge::new(format!("e{idx}"), format!("n{from}"), format!("n{to}"))
                    })
                    .collect();
                (nodes, edges)
            })
        })
    }

    proptest! {
        #[test]
        fn output_is_always_acyclic((nodes, edges) in arb_graph()) {
            let output = break_cycles(&nodes, &edges);
            prop_assert!(is_acyclic(&nodes, &output));
        }

        #[test]
        fn output_is_ordered_subset((nodes, edges) in arb_graph()) {
            let output = break_cycles(&nodes, &edges);
            let mut remaining = edges.iter();
            for kept in &output {
                prop_assert!(remaining.any(|edge| edge == kept));
            }
        }

        #[test]
        fn acyclic_input_passes_through((nodes, edges) in arb_graph()) {
            let forward: Vec<Edge> = edges
                .into_iter()
                .filter(|edge| edge.source < edge.target)
                .collect();
            prop_assert_eq!(break_cycles(&nodes, &forward), forward);
        }
    }
}

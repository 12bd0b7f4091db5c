use kgviz::{
    Direction, GraphModel, LayoutConfig, ViewState, break_cycles, estimate_node_height, is_acyclic, layout,
    parse_line_numbers, try_layout,
};

const CAUSAL_GRAPH: &str = r#"Here is the graph you asked for.

```json
{
  "result": {
    "title": "Digoxin in diastolic heart failure",
    "nodes": [
      {"id": "main", "label": "Effect of digoxin in elderly patients with diastolic HF and CKD", "type": "mainConcept",
       "source_quote": "We studied digoxin.", "source_lines": "Linhas: 1-3"},
      {"id": "mech", "label": "Na/K-ATPase inhibition", "type": "mechanism", "source_lines": "Linhas: 40-41"},
      {"id": "hosp", "label": "Fewer HF hospitalizations", "type": "finding", "source_lines": "Linhas: 80, 82"},
      {"id": "tox", "label": "Digoxin toxicity", "type": "riskFactor"},
      {"id": "note", "label": "Unrelated remark", "type": "insight"}
    ],
    "edges": [
      {"id": "e1", "source": "main", "target": "mech", "label": "operates_via", "strength": "forte", "nature": "neutra"},
      {"id": "e2", "source": "mech", "target": "hosp", "label": "reduces", "strength": "moderada", "nature": "negativa"},
      {"id": "e3", "source": "mech", "target": "tox", "label": "causes", "strength": "fraca", "nature": "positiva"},
      {"id": "e4", "source": "tox", "target": "main", "label": "limits"},
      {"id": "e5", "source": "hosp", "target": "ghost"}
    ]
  }
}
```"#;

#[test]
fn extraction_to_positioned_graph() {
    let model = GraphModel::from_json(CAUSAL_GRAPH).unwrap();
    assert_eq!(model.title.as_deref(), Some("Digoxin in diastolic heart failure"));
    assert_eq!(model.nodes.len(), 5);

    let edge_ids: Vec<&str> = model.edges.iter().map(|edge| edge.id.as_str()).collect();
    assert_eq!(edge_ids, vec!["e1", "e2", "e3"]);
    assert!(is_acyclic(&model.nodes, &model.edges));

    let config = LayoutConfig::default();
    for direction in [Direction::TopDown, Direction::BottomTop, Direction::LeftRight, Direction::RightLeft] {
        let result = try_layout(&model.nodes, &model.edges, direction, &config).unwrap();
        assert_eq!(result.nodes.len(), model.nodes.len());
        assert_eq!(result.edges, model.edges);

        for (placed, original) in result.nodes.iter().zip(&model.nodes) {
            assert_eq!(&placed.node, original);
            assert_eq!(placed.height, estimate_node_height(&original.label, &config));
            assert!(placed.position.x >= 0.0 && placed.position.y >= 0.0);
            assert!(placed.position.x + placed.width <= result.size.width + 1e-3);
            assert!(placed.position.y + placed.height <= result.size.height + 1e-3);
        }
    }
}

#[test]
fn nodes_in_a_rank_never_overlap() {
    let model = GraphModel::from_json(CAUSAL_GRAPH).unwrap();
    let result = model.layout(Direction::TopDown, &LayoutConfig::default());

    for (idx, a) in result.nodes.iter().enumerate() {
        for b in &result.nodes[idx + 1..] {
            let overlap_x = a.position.x < b.position.x + b.width && b.position.x < a.position.x + a.width;
            let overlap_y = a.position.y < b.position.y + b.height && b.position.y < a.position.y + a.height;
            assert!(
                !(overlap_x && overlap_y),
                "{} overlaps {}",
                a.node.id,
                b.node.id
            );
        }
    }
}

#[test]
fn collapsed_view_lays_out_remaining_nodes() {
    let model = GraphModel::from_json(CAUSAL_GRAPH).unwrap();
    let view = ViewState {
        collapsed: ["mech".to_string()].into_iter().collect(),
        ..ViewState::default()
    };
    let (nodes, edges) = view.apply(&model);
    let ids: Vec<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec!["main", "mech", "note"]);

    let result = layout(&nodes, &edges, Direction::LeftRight, &LayoutConfig::default());
    assert_eq!(result.nodes.len(), 3);
}

#[test]
fn provenance_lines_resolve() {
    let model = GraphModel::from_json(CAUSAL_GRAPH).unwrap();
    let hosp = model.node("hosp").unwrap();
    assert_eq!(parse_line_numbers(hosp.source_lines.as_deref()), vec![80, 82]);
    assert!(parse_line_numbers(model.node("tox").unwrap().source_lines.as_deref()).is_empty());
}

#[test]
fn raw_cycles_are_broken_before_layout() {
    let model = GraphModel::from_json(CAUSAL_GRAPH).unwrap();
    let mut edges = model.edges.clone();
    edges.push(kgviz::Edge::new("back", "hosp", "main"));

    assert!(try_layout(&model.nodes, &edges, Direction::TopDown, &LayoutConfig::default()).is_err());
    let acyclic = break_cycles(&model.nodes, &edges);
    assert!(try_layout(&model.nodes, &acyclic, Direction::TopDown, &LayoutConfig::default()).is_ok());
}

//! Conversion of LLM extraction output into the uniform node/edge model.
//!
//! Four shapes are understood: flat `triplets`, a hierarchical `result`
//! graph, knowledge-base `kb` concept records and a list of causal events.

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use crate::*;

const KB_FALLBACK_QUOTE: &str = "Source from KB";
const KB_FALLBACK_LINES: &str = "Linhas: N/A";
const CAUSAL_FALLBACK_LINES: &str = "N/A";
const AGENT_KIND: &str = "agent";
const AFFECTED_KIND: &str = "affectedEntity";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Triplets,
    Graph,
    KnowledgeBase,
    CausalEvents,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityRef {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Triplet {
    #[serde(default)]
    pub s: Option<EntityRef>,
    #[serde(default)]
    pub p: Option<String>,
    #[serde(default)]
    pub o: Option<EntityRef>,
    #[serde(default)]
    pub source_quote: Option<String>,
    #[serde(default)]
    pub source_lines: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TripletDocument {
    triplets: Vec<Triplet>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphDocument {
    result: RawGraph,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGraph {
    #[serde(default)]
    title: Option<String>,
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<RawEdge>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNode {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    source_quote: Option<String>,
    #[serde(default)]
    source_lines: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEdge {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    strength: Option<EdgeStrength>,
    #[serde(default)]
    nature: Option<EdgeNature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeNugget {
    #[serde(default)]
    pub nug: Option<String>,
    #[serde(default)]
    pub s_quo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedConcept {
    pub typ: String,
    pub c_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeBaseConcept {
    pub c_id: String,
    pub c_con: String,
    #[serde(default)]
    pub c_rel: Option<String>,
    #[serde(default)]
    pub k_nug: Vec<KnowledgeNugget>,
    #[serde(default)]
    pub r_con: Vec<RelatedConcept>,
}

#[derive(Debug, Clone, Deserialize)]
struct KnowledgeBaseDocument {
    kb: Vec<KnowledgeBaseConcept>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalEntity {
    pub label: String,
    #[serde(default)]
    pub normalized_label: Option<String>,
    #[serde(rename = "ontologyID", default)]
    pub ontology_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RelationQualifier {
    #[serde(rename = "explicitly causal")]
    ExplicitlyCausal,
    #[serde(rename = "strongly implied causal")]
    StronglyImplied,
    #[serde(rename = "weakly implied causal")]
    WeaklyImplied,
    #[serde(rename = "correlational")]
    Correlational,
}

impl RelationQualifier {
    pub fn strength(self) -> EdgeStrength {
        match self {
            RelationQualifier::ExplicitlyCausal | RelationQualifier::StronglyImplied => EdgeStrength::Strong,
            RelationQualifier::WeaklyImplied => EdgeStrength::Weak,
            RelationQualifier::Correlational => EdgeStrength::Moderate,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalEvent {
    pub has_agent: CausalEntity,
    pub has_affected_entity: CausalEntity,
    pub has_causal_relationship: String,
    pub relation_qualifier: RelationQualifier,
    #[serde(rename = "CausalMechanism", default)]
    pub causal_mechanism: Option<String>,
    #[serde(default)]
    pub has_evidence: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    pub supporting_quote: String,
    #[serde(rename = "source_lines", default)]
    pub source_lines: Option<String>,
}

/// Valence of a causal relationship name such as `cajal:inhibits`.
pub fn relationship_nature(relationship: &str) -> EdgeNature {
    let lowered = relationship.to_lowercase();
    if ["increase", "promote", "cause"].iter().any(|cue| lowered.contains(cue)) {
        EdgeNature::Positive
    } else if ["decrease", "inhibit", "prevent"].iter().any(|cue| lowered.contains(cue)) {
        EdgeNature::Negative
    } else {
        EdgeNature::Neutral
    }
}

impl GraphModel {
    /// Parses raw extraction output (possibly wrapped in prose or a fenced
    /// block), detects its shape and returns an acyclic model.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_json_with_format(text).map(|(model, _)| model)
    }

    pub fn from_json_with_format(text: &str) -> Result<(Self, SourceFormat)> {
        let block = extract_json_block(text);
        let value: Value =
            serde_json::from_str(block).context("extraction output is not valid JSON")?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<(Self, SourceFormat)> {
        let object = match value {
            Value::Array(items) => {
                let items = Value::Array(items);
                if let Ok(events) = Vec::<CausalEvent>::deserialize(&items) {
                    return Ok((Self::from_causal_events(&events), SourceFormat::CausalEvents));
                }
                let triplets = Vec::<Triplet>::deserialize(&items)
                    .context("array is neither a causal event list nor a triplet list")?;
                return Ok((Self::from_triplets(&triplets), SourceFormat::Triplets));
            }
            Value::Object(object) => object,
            other => bail!("extraction output must be a JSON object or array, found {}", kind_of(&other)),
        };

        if let Some(events) = object.get("causalEvents").filter(|events| events.is_array()) {
            match Vec::<CausalEvent>::deserialize(events) {
                Ok(events) => return Ok((Self::from_causal_events(&events), SourceFormat::CausalEvents)),
                Err(err) => debug!("causalEvents does not match the event schema: {err}"),
            }
        }

        let value = Value::Object(object);
        if value.get("result").is_some() {
            let document = GraphDocument::deserialize(&value).context("invalid 'result' graph")?;
            return Ok((Self::from_raw_graph(document.result), SourceFormat::Graph));
        }
        if value.get("kb").is_some() {
            let document =
                KnowledgeBaseDocument::deserialize(&value).context("invalid 'kb' knowledge base")?;
            let triplets = knowledge_base_triplets(&document.kb);
            return Ok((Self::from_triplets(&triplets), SourceFormat::KnowledgeBase));
        }
        if value.get("triplets").is_some() {
            let document = TripletDocument::deserialize(&value).context("invalid 'triplets' list")?;
            return Ok((Self::from_triplets(&document.triplets), SourceFormat::Triplets));
        }
        if value.get("nodes").is_some() {
            let graph = RawGraph::deserialize(&value).context("invalid node/edge graph")?;
            return Ok((Self::from_raw_graph(graph), SourceFormat::Graph));
        }

        Err(anyhow!(
            "invalid JSON structure: the root key must be 'result', 'triplets' or 'kb', or an array of causal events"
        ))
    }

    pub fn from_triplets(triplets: &[Triplet]) -> Self {
        let mut nodes: Vec<Node> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut edges = Vec::new();

        for (index, triplet) in triplets.iter().enumerate() {
            let subject = entity_label(triplet.s.as_ref());
            let object = entity_label(triplet.o.as_ref());

            for (label, entity) in [(subject, triplet.s.as_ref()), (object, triplet.o.as_ref())] {
                let Some(label) = label else {
                    continue;
                };
                if seen.insert(label.to_string()) {
                    let kind = entity
                        .and_then(|entity| entity.kind.clone())
                        .filter(|kind| !kind.is_empty())
                        .unwrap_or_else(|| DEFAULT_NODE_KIND.to_string());
                    nodes.push(
                        Node::new(label, label, kind)
                            .with_provenance(triplet.source_quote.clone(), triplet.source_lines.clone()),
                    );
                }
            }

            let predicate = triplet.p.as_deref().filter(|p| !p.is_empty());
            if let (Some(subject), Some(object), Some(predicate)) = (subject, object, predicate) {
                edges.push(
                    Edge::new(format!("e-{index}-{subject}-{object}"), subject, object).with_label(predicate),
                );
            }
        }

        Self::finish(None, nodes, edges)
    }

    fn from_raw_graph(graph: RawGraph) -> Self {
        let nodes: Vec<Node> = graph
            .nodes
            .into_iter()
            .map(|raw| {
                let label = raw.label.unwrap_or_else(|| raw.id.clone());
                let kind = raw
                    .kind
                    .filter(|kind| !kind.is_empty())
                    .unwrap_or_else(|| DEFAULT_NODE_KIND.to_string());
                Node::new(raw.id, label, kind).with_provenance(raw.source_quote, raw.source_lines)
            })
            .collect();

        let mut edges = Vec::new();
        for (index, raw) in graph.edges.into_iter().enumerate() {
            let (Some(source), Some(target)) = (
                raw.source.filter(|s| !s.is_empty()),
                raw.target.filter(|t| !t.is_empty()),
            ) else {
                warn!(index, "dropping edge without both endpoints");
                continue;
            };
            let id = raw.id.unwrap_or_else(|| format!("e-{index}-{source}-{target}"));
            edges.push(Edge {
                id,
                source,
                target,
                label: raw.label,
                strength: raw.strength,
                nature: raw.nature,
            });
        }

        let title = graph
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GRAPH_TITLE.to_string());
        Self::finish(Some(title), nodes, edges)
    }

    pub fn from_causal_events(events: &[CausalEvent]) -> Self {
        let mut nodes: Vec<Node> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut edges = Vec::new();

        for (index, event) in events.iter().enumerate() {
            let lines = event
                .source_lines
                .clone()
                .unwrap_or_else(|| CAUSAL_FALLBACK_LINES.to_string());
            let agent = event.has_agent.label.as_str();
            let affected = event.has_affected_entity.label.as_str();

            for (label, kind) in [(agent, AGENT_KIND), (affected, AFFECTED_KIND)] {
                if label.is_empty() || !seen.insert(label.to_string()) {
                    continue;
                }
                nodes.push(
                    Node::new(label, label, kind)
                        .with_provenance(Some(event.supporting_quote.clone()), Some(lines.clone())),
                );
            }

            if agent.is_empty() || affected.is_empty() {
                continue;
            }
            let relationship = event.has_causal_relationship.as_str();
            let label = relationship.replacen("cajal:", "", 1);
            let mut edge = Edge::new(format!("e-{index}-{agent}-{affected}"), agent, affected).with_label(label);
            edge.strength = Some(event.relation_qualifier.strength());
            edge.nature = Some(relationship_nature(relationship));
            edges.push(edge);
        }

        Self::finish(None, nodes, edges)
    }

    /// Drops edges with unknown endpoints, marks nodes that have outgoing
    /// edges and removes back edges.
    fn finish(title: Option<String>, mut nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let (edges, dangling): (Vec<Edge>, Vec<Edge>) = {
            let known: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
            edges
                .into_iter()
                .partition(|edge| known.contains(edge.source.as_str()) && known.contains(edge.target.as_str()))
        };
        for edge in &dangling {
            warn!(edge = %edge.id, "dropping edge {} -> {} with unknown endpoint", edge.source, edge.target);
        }

        let sources: HashSet<String> = edges.iter().map(|edge| edge.source.clone()).collect();
        for node in &mut nodes {
            node.has_children = sources.contains(&node.id);
        }

        let edges = break_cycles(&nodes, &edges);
        debug!(nodes = nodes.len(), edges = edges.len(), "built graph model");
        Self { title, nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Ids of every node reachable from `id`, in breadth-first order.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        descendants(id, &self.edges)
    }

    pub fn layout(&self, direction: Direction, config: &LayoutConfig) -> Layout {
        layout(&self.nodes, &self.edges, direction, config)
    }
}

/// Ids of every node reachable from `id` over `edges`, in breadth-first
/// order. `id` itself is included only when it lies on a cycle.
pub fn descendants(id: &str, edges: &[Edge]) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        children.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
    }

    let mut found: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([id]);

    while let Some(current) = queue.pop_front() {
        for &child in children.get(current).map(Vec::as_slice).unwrap_or(&[]) {
            if seen.insert(child) {
                found.push(child.to_string());
                queue.push_back(child);
            }
        }
    }

    found
}

fn entity_label(entity: Option<&EntityRef>) -> Option<&str> {
    entity
        .and_then(|entity| entity.label.as_deref())
        .filter(|label| !label.is_empty())
}

/// Turns related-concept links of a knowledge base into triplets. Links to
/// concepts that are not in the base are skipped.
pub fn knowledge_base_triplets(concepts: &[KnowledgeBaseConcept]) -> Vec<Triplet> {
    let by_id: HashMap<&str, &KnowledgeBaseConcept> =
        concepts.iter().map(|concept| (concept.c_id.as_str(), concept)).collect();

    let mut triplets = Vec::new();
    for concept in concepts {
        let quote = concept
            .k_nug
            .first()
            .and_then(|nugget| nugget.s_quo.clone())
            .filter(|quote| !quote.is_empty())
            .unwrap_or_else(|| KB_FALLBACK_QUOTE.to_string());

        for relation in &concept.r_con {
            let Some(target) = by_id.get(relation.c_id.as_str()) else {
                continue;
            };
            triplets.push(Triplet {
                s: Some(EntityRef {
                    label: Some(concept.c_con.clone()),
                    kind: concept.c_rel.clone(),
                }),
                p: Some(relation.typ.clone()),
                o: Some(EntityRef {
                    label: Some(target.c_con.clone()),
                    kind: target.c_rel.clone(),
                }),
                source_quote: Some(quote.clone()),
                source_lines: Some(KB_FALLBACK_LINES.to_string()),
            });
        }
    }
    triplets
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

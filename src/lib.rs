use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod cycles;
pub mod json;
pub mod layout;
pub mod model;
pub mod text;
pub mod view;

pub use cycles::*;
pub use json::*;
pub use layout::*;
pub use model::*;
pub use text::*;
pub use view::*;

pub const NODE_WIDTH: f32 = 200.0;
pub const NODE_BASE_HEIGHT: f32 = 40.0;
pub const NODE_LINE_HEIGHT: f32 = 20.0;
pub const NODE_CHARS_PER_LINE: usize = 25;
pub const NODE_SEPARATION: f32 = 120.0;
pub const RANK_SEPARATION: f32 = 180.0;
pub const EDGE_SEPARATION: f32 = 10.0;
pub const ORDERING_PASSES: usize = 8;
pub const MAX_LINE_SPAN: u32 = 10_000;
pub const DEFAULT_NODE_KIND: &str = "default";
pub const DEFAULT_GRAPH_TITLE: &str = "Generated Graph";
pub const EDGE_STROKE_NEUTRAL: &str = "#A0AEC0";
pub const EDGE_STROKE_POSITIVE: &str = "#48BB78";
pub const EDGE_STROKE_NEGATIVE: &str = "#F56565";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "TB", alias = "TD")]
    TopDown,
    #[serde(rename = "LR")]
    LeftRight,
    #[serde(rename = "BT")]
    BottomTop,
    #[serde(rename = "RL")]
    RightLeft,
}

impl Direction {
    pub fn as_token(&self) -> &'static str {
        match self {
            Direction::TopDown => "TB",
            Direction::LeftRight => "LR",
            Direction::BottomTop => "BT",
            Direction::RightLeft => "RL",
        }
    }

    /// Ranks advance along the x axis.
    pub fn is_horizontal(&self) -> bool {
        matches!(self, Direction::LeftRight | Direction::RightLeft)
    }

    /// Ranks advance toward the origin.
    pub fn is_reversed(&self) -> bool {
        matches!(self, Direction::BottomTop | Direction::RightLeft)
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let direction = match raw.trim().to_ascii_uppercase().as_str() {
            "TB" | "TD" => Direction::TopDown,
            "LR" => Direction::LeftRight,
            "BT" => Direction::BottomTop,
            "RL" => Direction::RightLeft,
            other => bail!("unsupported rank direction '{other}' (expected TB, BT, LR or RL)"),
        };
        Ok(direction)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default = "default_node_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_lines: Option<String>,
    #[serde(default)]
    pub has_children: bool,
}

fn default_node_kind() -> String {
    DEFAULT_NODE_KIND.to_string()
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: kind.into(),
            source_quote: None,
            source_lines: None,
            has_children: false,
        }
    }

    pub fn with_provenance(mut self, quote: Option<String>, lines: Option<String>) -> Self {
        self.source_quote = quote;
        self.source_lines = lines;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<EdgeStrength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nature: Option<EdgeNature>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
            strength: None,
            nature: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    pub fn style(&self) -> EdgeStyle {
        let stroke = match self.nature {
            Some(EdgeNature::Positive) => EDGE_STROKE_POSITIVE,
            Some(EdgeNature::Negative) => EDGE_STROKE_NEGATIVE,
            _ => EDGE_STROKE_NEUTRAL,
        };
        let (stroke_width, dashed) = match self.strength {
            Some(EdgeStrength::Strong) => (3.0, false),
            Some(EdgeStrength::Weak) => (1.0, true),
            _ => (2.0, false),
        };
        EdgeStyle {
            stroke,
            stroke_width,
            dashed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStrength {
    #[serde(alias = "forte")]
    Strong,
    #[serde(alias = "moderada")]
    Moderate,
    #[serde(alias = "fraca")]
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeNature {
    #[serde(alias = "positiva")]
    Positive,
    #[serde(alias = "negativa")]
    Negative,
    #[serde(alias = "neutra")]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeStyle {
    pub stroke: &'static str,
    pub stroke_width: f32,
    pub dashed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedNode {
    #[serde(flatten)]
    pub node: Node,
    /// Top-left corner.
    pub position: Point,
    pub width: f32,
    pub height: f32,
}

impl PositionedNode {
    pub fn center(&self) -> Point {
        Point {
            x: self.position.x + self.width / 2.0,
            y: self.position.y + self.height / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direction_tokens() {
        let cases = [
            ("TB", Direction::TopDown),
            ("td", Direction::TopDown),
            ("LR", Direction::LeftRight),
            (" bt ", Direction::BottomTop),
            ("RL", Direction::RightLeft),
        ];

        for (input, expected) in cases {
            assert_eq!(input.parse::<Direction>().unwrap(), expected, "direction mismatch for {input}");
        }
        assert!("diagonal".parse::<Direction>().is_err());
    }

    #[test]
    fn accepts_portuguese_edge_qualifiers() {
        let edge: Edge = serde_json::from_str(
            r#"{"id":"e1","source":"a","target":"b","strength":"forte","nature":"negativa"}"#,
        )
        .unwrap();
        assert_eq!(edge.strength, Some(EdgeStrength::Strong));
        assert_eq!(edge.nature, Some(EdgeNature::Negative));

        let round = serde_json::to_value(&edge).unwrap();
        assert_eq!(round["strength"], "strong");
        assert_eq!(round["nature"], "negative");
    }

    #[test]
    fn edge_style_follows_strength_and_nature() {
        let mut edge = Edge::new("e", "a", "b");
        assert_eq!(
            edge.style(),
            EdgeStyle {
                stroke: EDGE_STROKE_NEUTRAL,
                stroke_width: 2.0,
                dashed: false
            }
        );

        edge.nature = Some(EdgeNature::Positive);
        edge.strength = Some(EdgeStrength::Weak);
        let style = edge.style();
        assert_eq!(style.stroke, EDGE_STROKE_POSITIVE);
        assert_eq!(style.stroke_width, 1.0);
        assert!(style.dashed);

        edge.nature = Some(EdgeNature::Negative);
        edge.strength = Some(EdgeStrength::Strong);
        let style = edge.style();
        assert_eq!(style.stroke, EDGE_STROKE_NEGATIVE);
        assert_eq!(style.stroke_width, 3.0);
    }

    #[test]
    fn node_kind_defaults_when_missing() {
        let node: Node = serde_json::from_str(r#"{"id":"n","label":"N"}"#).unwrap();
        assert_eq!(node.kind, DEFAULT_NODE_KIND);
        assert!(!node.has_children);
    }
}

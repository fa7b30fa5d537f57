//! Transform descriptors and their extraction from free-form replies

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    #[serde(alias = "mirrorX", alias = "MirrorX")]
    MirrorX,
    #[serde(alias = "mirrorY", alias = "MirrorY")]
    MirrorY,
    #[serde(alias = "Rotate")]
    Rotate,
    #[serde(alias = "arcFlipX", alias = "ArcFlipX")]
    ArcFlipX,
    #[serde(alias = "arcFlipY", alias = "ArcFlipY")]
    ArcFlipY,
}

impl TransformKind {
    /// Whether this kind only changes arc angles
    pub fn is_arc_flip(self) -> bool {
        matches!(self, TransformKind::ArcFlipX | TransformKind::ArcFlipY)
    }

    pub fn label(self) -> &'static str {
        match self {
            TransformKind::MirrorX => "mirror left/right",
            TransformKind::MirrorY => "mirror up/down",
            TransformKind::Rotate => "rotate",
            TransformKind::ArcFlipX => "flip arc swing left/right",
            TransformKind::ArcFlipY => "flip arc swing up/down",
        }
    }
}

/// Which element kinds a transform touches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformScope {
    #[default]
    All,
    #[serde(alias = "arcs_only", alias = "circlesOnly")]
    CirclesOnly,
    #[serde(alias = "linesOnly")]
    LinesOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDescriptor {
    #[serde(alias = "type")]
    pub kind: TransformKind,
    #[serde(default, alias = "target")]
    pub scope: TransformScope,
    #[serde(default, alias = "axisX", skip_serializing_if = "Option::is_none")]
    pub axis_x: Option<f64>,
    #[serde(default, alias = "axisY", skip_serializing_if = "Option::is_none")]
    pub axis_y: Option<f64>,
    #[serde(
        default,
        alias = "angle",
        alias = "angleDegrees",
        skip_serializing_if = "Option::is_none"
    )]
    pub angle_degrees: Option<f64>,
    #[serde(
        default,
        alias = "cx",
        alias = "centerX",
        skip_serializing_if = "Option::is_none"
    )]
    pub center_x: Option<f64>,
    #[serde(
        default,
        alias = "cy",
        alias = "centerY",
        skip_serializing_if = "Option::is_none"
    )]
    pub center_y: Option<f64>,
    /// Restricts arc changes to these positions among arcs
    #[serde(
        default,
        alias = "arcIndices",
        alias = "circle_indices",
        skip_serializing_if = "Option::is_none"
    )]
    pub arc_indices: Option<BTreeSet<usize>>,
}

impl TransformDescriptor {
    #[cfg(test)]
    pub fn new(kind: TransformKind) -> Self {
        Self {
            kind,
            scope: TransformScope::All,
            axis_x: None,
            axis_y: None,
            angle_degrees: None,
            center_x: None,
            center_y: None,
            arc_indices: None,
        }
    }

    /// One-line human description
    pub fn summary(&self) -> String {
        let mut text = self.kind.label().to_string();
        if let Some(angle) = self.angle_degrees {
            text.push_str(&format!(" {angle}°"));
        }
        if let Some(indices) = &self.arc_indices {
            let list: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
            text.push_str(&format!(" (arcs {})", list.join(",")));
        }
        text
    }
}

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[A-Za-z]*\s*([\s\S]*?)\s*```").expect("code block pattern is valid")
});

/// Find a transform descriptor in a completion reply.
///
/// Fenced code blocks are tried first; otherwise the smallest brace-balanced
/// fragment mentioning `"type"` or `"kind"` that parses wins. `None` is a
/// normal outcome meaning "acknowledge without changing geometry".
pub fn extract_descriptor(text: &str) -> Option<TransformDescriptor> {
    for caps in CODE_BLOCK.captures_iter(text) {
        if let Ok(descriptor) = serde_json::from_str(&caps[1]) {
            return Some(descriptor);
        }
    }

    let mut fragments: Vec<&str> = json_fragments(text)
        .filter(|f| f.contains("\"type\"") || f.contains("\"kind\""))
        .collect();
    fragments.sort_by_key(|f| f.len());
    fragments
        .into_iter()
        .find_map(|f| serde_json::from_str(f).ok())
}

/// Every brace-balanced `{...}` substring, string literals respected
fn json_fragments(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| {
            let mut depth = 0usize;
            let mut in_string = false;
            let mut escaped = false;
            for (offset, c) in text[start..].char_indices() {
                if in_string {
                    match c {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '"' => in_string = false,
                        _ => {}
                    }
                    continue;
                }
                match c {
                    '"' => in_string = true,
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(&text[start..start + offset + 1]);
                        }
                    }
                    _ => {}
                }
            }
            None
        })
}

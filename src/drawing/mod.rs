//! Best-effort decoder for Jw_cad `.jww` drawing files
//!
//! Only the header is decoded with any confidence. Geometry and labels come
//! from two independent heuristic scans over the whole buffer, so results
//! are a sketch of the drawing and never a faithful parse.

mod labels;
mod records;

use std::fmt::{self, Write as _};
use std::path::Path;

use encoding_rs::SHIFT_JIS;
use serde::Serialize;

pub use labels::{Label, LabelKind, normalize_width};
pub use records::RecordTypes;

use crate::error::{BridgeError, Result};
use crate::geometry::{BoundingBox, Point, normalize_degrees};

const MAGIC: &[u8] = b"JwwData";
const VERSION_OFFSET: usize = 8;
const MEMO_OFFSET: usize = 12;

const DOOR_SPAN: std::ops::RangeInclusive<f64> = 80.0..=100.0;
const FLOOR_PLAN_MIN_ORTHOGONALITY: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn length(&self) -> f64 {
        (self.end.x - self.start.x).hypot(self.end.y - self.start.y)
    }

    /// Horizontal or vertical within one drawing unit
    pub fn is_orthogonal(&self) -> bool {
        (self.end.x - self.start.x).abs() < 1.0 || (self.end.y - self.start.y).abs() < 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcShape {
    pub center: Point,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl ArcShape {
    pub fn span(&self) -> f64 {
        normalize_degrees(self.end_angle - self.start_angle)
    }

    /// A quarter swing, the usual door symbol
    pub fn is_door_like(&self) -> bool {
        DOOR_SPAN.contains(&self.span())
    }
}

/// Paper size code from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DrawingSize(pub u32);

impl DrawingSize {
    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "A0",
            1 => "A1",
            2 => "A2",
            3 => "A3",
            4 => "A4",
            8 => "2A",
            9 => "3A",
            10 => "4A",
            11 => "5A",
            12 => "10m",
            13 => "50m",
            14 => "100m",
            _ => return None,
        })
    }
}

impl fmt::Display for DrawingSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "unknown({})", self.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingType {
    FloorPlanLike,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawingInsights {
    pub bounding_box: Option<BoundingBox>,
    pub orthogonality_ratio: f64,
    pub door_arcs: usize,
    pub drawing_type: DrawingType,
}

impl DrawingInsights {
    pub fn compute(lines: &[Segment], arcs: &[ArcShape], labels: &[Label]) -> Self {
        let bounding_box = BoundingBox::from_points(lines.iter().flat_map(|l| [l.start, l.end]));
        let orthogonality_ratio = if lines.is_empty() {
            0.0
        } else {
            lines.iter().filter(|l| l.is_orthogonal()).count() as f64 / lines.len() as f64
        };
        let has_room = labels.iter().any(|l| l.kind == LabelKind::RoomLabel);
        let drawing_type = if has_room && orthogonality_ratio >= FLOOR_PLAN_MIN_ORTHOGONALITY {
            DrawingType::FloorPlanLike
        } else {
            DrawingType::Unknown
        };
        Self {
            bounding_box,
            orthogonality_ratio,
            door_arcs: arcs.iter().filter(|a| a.is_door_like()).count(),
            drawing_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryDrawingDocument {
    pub version: u32,
    pub memo: String,
    pub size: Option<DrawingSize>,
    pub lines: Vec<Segment>,
    pub arcs: Vec<ArcShape>,
    pub labels: Vec<Label>,
}

/// Read and decode a drawing file
pub fn decode_drawing(path: &Path, types: &RecordTypes) -> Result<BinaryDrawingDocument> {
    let data = std::fs::read(path).map_err(|e| BridgeError::read(path, e))?;
    let doc = decode_bytes(&data, types)
        .ok_or_else(|| BridgeError::UnrecognizedFormat(path.to_path_buf()))?;
    log::info!(
        "decoded {}: version {}, {} lines, {} arcs, {} labels",
        path.display(),
        doc.version,
        doc.lines.len(),
        doc.arcs.len(),
        doc.labels.len()
    );
    Ok(doc)
}

/// Decode an in-memory drawing; `None` when the magic is absent
pub fn decode_bytes(data: &[u8], types: &RecordTypes) -> Option<BinaryDrawingDocument> {
    if !data.starts_with(MAGIC) {
        return None;
    }
    let version = read_u32(data, VERSION_OFFSET).unwrap_or(0);
    let (memo, size) = match read_memo(data, MEMO_OFFSET) {
        Some((memo, next)) => (memo, read_u32(data, next).map(DrawingSize)),
        None => (String::new(), None),
    };

    let scan = records::scan_records(data, types);
    let mut labels = labels::scan_labels(data);
    for label in &mut labels {
        label.position = scan
            .texts
            .iter()
            .find(|t| normalize_width(&t.text) == label.text)
            .map(|t| t.position);
    }

    Some(BinaryDrawingDocument {
        version,
        memo,
        size,
        lines: scan.lines,
        arcs: scan.arcs,
        labels,
    })
}

impl BinaryDrawingDocument {
    pub fn insights(&self) -> DrawingInsights {
        DrawingInsights::compute(&self.lines, &self.arcs, &self.labels)
    }

    /// Plain-text digest for prompts and `inspect`
    pub fn summary(&self, max_lines: usize, max_arcs: usize) -> String {
        let insights = self.insights();
        let mut out = String::new();
        let _ = writeln!(out, "Drawing (format version {})", self.version);
        if !self.memo.is_empty() {
            let _ = writeln!(out, "Memo: {}", self.memo);
        }
        if let Some(size) = self.size {
            let _ = writeln!(out, "Paper: {size}");
        }
        let _ = writeln!(
            out,
            "Lines: {}  Arcs: {}  Labels: {}",
            self.lines.len(),
            self.arcs.len(),
            self.labels.len()
        );
        if let Some(bbox) = insights.bounding_box {
            let _ = writeln!(
                out,
                "Extent: ({:.1},{:.1}) to ({:.1},{:.1})  {:.0} x {:.0}",
                bbox.min_x,
                bbox.min_y,
                bbox.max_x,
                bbox.max_y,
                bbox.width(),
                bbox.height()
            );
        }
        let _ = writeln!(
            out,
            "Orthogonal lines: {:.0}%  Door-like arcs: {}  Type: {}",
            insights.orthogonality_ratio * 100.0,
            insights.door_arcs,
            match insights.drawing_type {
                DrawingType::FloorPlanLike => "floor plan",
                DrawingType::Unknown => "unknown",
            }
        );

        for (kind, heading) in [
            (LabelKind::RoomLabel, "Rooms"),
            (LabelKind::Dimension, "Dimensions"),
            (LabelKind::PlainText, "Text"),
        ] {
            let texts: Vec<&str> = self
                .labels
                .iter()
                .filter(|l| l.kind == kind)
                .map(|l| l.text.as_str())
                .collect();
            if !texts.is_empty() {
                let _ = writeln!(out, "{heading}: {}", texts.join(", "));
            }
        }

        if !self.lines.is_empty() {
            let mut longest: Vec<&Segment> = self.lines.iter().collect();
            longest.sort_by(|a, b| b.length().total_cmp(&a.length()));
            let shown = longest.len().min(max_lines);
            let _ = writeln!(out, "\nLongest lines ({shown}):");
            for line in &longest[..shown] {
                let _ = writeln!(
                    out,
                    "  ({:.1},{:.1}) -> ({:.1},{:.1}) length {:.1}",
                    line.start.x,
                    line.start.y,
                    line.end.x,
                    line.end.y,
                    line.length()
                );
            }
        }

        if !self.arcs.is_empty() {
            let shown = self.arcs.len().min(max_arcs);
            let _ = writeln!(out, "\nArcs ({shown}):");
            for arc in &self.arcs[..shown] {
                let _ = writeln!(
                    out,
                    "  center ({:.1},{:.1}) radius {:.1} angles {:.1}..{:.1}{}",
                    arc.center.x,
                    arc.center.y,
                    arc.radius,
                    arc.start_angle,
                    arc.end_angle,
                    if arc.is_door_like() { "  [door swing]" } else { "" }
                );
            }
        }
        out
    }
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Length-prefixed memo: one length byte, or `0xFF` followed by a u16 length
fn read_memo(data: &[u8], offset: usize) -> Option<(String, usize)> {
    let (len, start) = match *data.get(offset)? {
        0xFF => {
            let bytes = data.get(offset + 1..offset + 3)?;
            (u16::from_le_bytes([bytes[0], bytes[1]]) as usize, offset + 3)
        }
        n => (n as usize, offset + 1),
    };
    let bytes = data.get(start..start + len)?;
    let (memo, _) = SHIFT_JIS.decode_without_bom_handling(bytes);
    Some((memo.trim().to_string(), start + len))
}

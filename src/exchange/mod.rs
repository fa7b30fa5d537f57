//! Jw_cad external-transform exchange file (`JWC_TEMP.TXT`)
//!
//! The file is line oriented. Every line is decoded into a [`DrawingElement`]
//! that remembers its raw text, so writing the elements back reproduces the
//! input byte for byte except for the lines a transform actually touched and
//! the `hq` sentinel, whose removal tells Jw_cad the transform has run.

mod file;

use std::collections::BTreeMap;

use crate::geometry::{Point, format_number};

pub use file::{read_exchange_file, read_first_line, write_exchange_file};

/// First-line token meaning "selection not yet processed"
pub const EXECUTED_SENTINEL: &str = "hq";

/// Token introducing an arc/circle record
pub const ARC_TOKEN: &str = "ci";

const HEADER_PREFIXES: &[&str] = &["hk", "hs", "hn", "hcw", "hch", "hcd", "hcc", "hp"];
const ATTRIBUTE_PREFIXES: &[&str] = &["lg", "ly", "lc", "lt", "lw"];
const TEXT_PREFIXES: &[&str] = &["ch", "cv", "cs", "cn"];

/// Line segment endpoints
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineCoords {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineCoords {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn start(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    pub fn end(&self) -> Point {
        Point::new(self.x2, self.y2)
    }

    pub fn from_points(start: Point, end: Point) -> Self {
        Self::new(start.x, start.y, end.x, end.y)
    }

    pub fn length(&self) -> f64 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    /// Render as an exchange-file line
    pub fn to_raw(&self) -> String {
        format!(
            "{} {} {} {}",
            format_number(self.x1),
            format_number(self.y1),
            format_number(self.x2),
            format_number(self.y2)
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineRecord {
    pub coords: LineCoords,
    pub raw: String,
}

/// `ci cx cy r [start end [trailing...]]`
#[derive(Clone, Debug, PartialEq)]
pub struct ArcRecord {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    /// Start/end angles in degrees; `None` for a full circle record
    pub angles: Option<(f64, f64)>,
    /// Tokens after `ci`, kept verbatim for re-emission
    pub fields: Vec<String>,
    pub raw: String,
}

impl ArcRecord {
    fn parse(raw: &str, parts: &[&str]) -> Option<Self> {
        let fields: Vec<String> = parts[1..].iter().map(|s| s.to_string()).collect();
        let number = |i: usize| fields.get(i).and_then(|f| f.parse::<f64>().ok());
        let center_x = number(0)?;
        let center_y = number(1)?;
        let radius = number(2)?;
        let angles = number(3).zip(number(4));
        Some(Self {
            center_x,
            center_y,
            radius,
            angles,
            fields,
            raw: raw.to_string(),
        })
    }

    pub fn center(&self) -> Point {
        Point::new(self.center_x, self.center_y)
    }

    /// Fields following the angles (or the radius for circles)
    pub fn trailing_fields(&self) -> &[String] {
        let skip = if self.angles.is_some() { 5 } else { 3 };
        self.fields.get(skip..).unwrap_or_default()
    }

    /// Angular span in degrees, normalized into `[0, 360)`
    pub fn span(&self) -> Option<f64> {
        self.angles
            .map(|(start, end)| crate::geometry::normalize_degrees(end - start))
    }

    /// Re-emit the record with new angles, keeping the center and radius
    /// tokens exactly as they were written.
    pub fn with_angles(&self, start: f64, end: f64) -> String {
        let mut tokens = vec![ARC_TOKEN.to_string()];
        tokens.extend(self.fields.iter().take(3).cloned());
        tokens.push(format_number(start));
        tokens.push(format_number(end));
        tokens.extend(self.trailing_fields().iter().cloned());
        tokens.join(" ")
    }

    /// Re-emit the record with a new center and, if present, new angles
    pub fn with_center(&self, center: Point, angles: Option<(f64, f64)>) -> String {
        let mut tokens = vec![
            ARC_TOKEN.to_string(),
            format_number(center.x),
            format_number(center.y),
            self.fields[2].clone(),
        ];
        if let Some((start, end)) = angles {
            tokens.push(format_number(start));
            tokens.push(format_number(end));
        }
        tokens.extend(self.trailing_fields().iter().cloned());
        tokens.join(" ")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextRecord {
    /// Leading token (`ch`, `cv`, `cs`, `cn`...)
    pub code: String,
    pub fields: Vec<String>,
    pub raw: String,
}

/// One line of the exchange file
#[derive(Clone, Debug, PartialEq)]
pub enum DrawingElement {
    Line(LineRecord),
    Arc(ArcRecord),
    Text(TextRecord),
    Header(String),
    Attribute(String),
    Point(String),
    Executed(String),
    Blank(String),
    Other(String),
}

impl DrawingElement {
    /// Original text of the line, without its line terminator
    pub fn raw(&self) -> &str {
        match self {
            DrawingElement::Line(line) => &line.raw,
            DrawingElement::Arc(arc) => &arc.raw,
            DrawingElement::Text(text) => &text.raw,
            DrawingElement::Header(raw)
            | DrawingElement::Attribute(raw)
            | DrawingElement::Point(raw)
            | DrawingElement::Executed(raw)
            | DrawingElement::Blank(raw)
            | DrawingElement::Other(raw) => raw,
        }
    }

    /// Classify a single line. Never fails: anything unrecognized or
    /// malformed becomes [`DrawingElement::Other`].
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split_whitespace().collect();
        let Some(&code) = parts.first() else {
            return DrawingElement::Blank(raw.to_string());
        };

        if code == EXECUTED_SENTINEL {
            DrawingElement::Executed(raw.to_string())
        } else if code == "hd" || HEADER_PREFIXES.iter().any(|p| code.starts_with(p)) {
            DrawingElement::Header(raw.to_string())
        } else if ATTRIBUTE_PREFIXES.iter().any(|p| code.starts_with(p)) {
            DrawingElement::Attribute(raw.to_string())
        } else if code == ARC_TOKEN {
            match ArcRecord::parse(raw, &parts) {
                Some(arc) => DrawingElement::Arc(arc),
                None => {
                    log::debug!("malformed arc record kept verbatim: {raw}");
                    DrawingElement::Other(raw.to_string())
                }
            }
        } else if TEXT_PREFIXES.iter().any(|p| code.starts_with(p)) {
            DrawingElement::Text(TextRecord {
                code: code.to_string(),
                fields: parts[1..].iter().map(|s| s.to_string()).collect(),
                raw: raw.to_string(),
            })
        } else if code == "pt" {
            DrawingElement::Point(raw.to_string())
        } else if parts.len() == 4 {
            let numbers: Option<Vec<f64>> = parts.iter().map(|p| p.parse().ok()).collect();
            match numbers.as_deref() {
                Some(&[x1, y1, x2, y2]) => DrawingElement::Line(LineRecord {
                    coords: LineCoords::new(x1, y1, x2, y2),
                    raw: raw.to_string(),
                }),
                _ => DrawingElement::Other(raw.to_string()),
            }
        } else {
            DrawingElement::Other(raw.to_string())
        }
    }
}

/// Terminator of one source line, reused on write-back
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Sparse set of replacements produced by the transform engine.
///
/// Keys are running indices among lines (resp. arcs) only. Missing keys
/// mean "unchanged".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Modifications {
    pub lines: BTreeMap<usize, LineCoords>,
    pub arcs: BTreeMap<usize, String>,
}

/// A decoded exchange file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeDocument {
    pub elements: Vec<DrawingElement>,
    pub raw_lines: Vec<String>,
    /// Terminator of each element's source line
    pub line_endings: Vec<LineEnding>,
    /// First terminator in the file; closes a last line that had none
    pub line_ending: LineEnding,
}

impl ExchangeDocument {
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        let mut first_ending = None;

        for piece in text.split_inclusive('\n') {
            let (line, ending) = if let Some(line) = piece.strip_suffix("\r\n") {
                (line, Some(LineEnding::CrLf))
            } else if let Some(line) = piece.strip_suffix('\n') {
                (line, Some(LineEnding::Lf))
            } else {
                (piece.trim_end_matches('\r'), None)
            };
            first_ending = first_ending.or(ending);

            doc.raw_lines.push(line.to_string());
            doc.elements.push(DrawingElement::parse(line));
            doc.line_endings.push(ending.unwrap_or_default());
        }

        doc.line_ending = first_ending.unwrap_or_default();
        if let (Some(last), false) = (doc.line_endings.last_mut(), text.ends_with('\n')) {
            *last = doc.line_ending;
        }
        doc
    }

    pub fn lines(&self) -> impl Iterator<Item = &LineRecord> {
        self.elements.iter().filter_map(|e| match e {
            DrawingElement::Line(line) => Some(line),
            _ => None,
        })
    }

    pub fn arcs(&self) -> impl Iterator<Item = &ArcRecord> {
        self.elements.iter().filter_map(|e| match e {
            DrawingElement::Arc(arc) => Some(arc),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextRecord> {
        self.elements.iter().filter_map(|e| match e {
            DrawingElement::Text(text) => Some(text),
            _ => None,
        })
    }

    /// Walk the elements in order, dropping every `hq` marker and substituting
    /// the modified lines/arcs. Each line keeps its own terminator, and
    /// non-empty output always ends with one.
    pub fn serialize(&self, modifications: &Modifications) -> String {
        let mut out = String::new();
        let mut line_idx = 0;
        let mut arc_idx = 0;

        for (i, element) in self.elements.iter().enumerate() {
            let ending = self.line_endings.get(i).copied().unwrap_or(self.line_ending);
            let text: std::borrow::Cow<'_, str> = match element {
                DrawingElement::Executed(_) => continue,
                DrawingElement::Line(line) => {
                    let idx = line_idx;
                    line_idx += 1;
                    match modifications.lines.get(&idx) {
                        Some(coords) if *coords != line.coords => coords.to_raw().into(),
                        _ => line.raw.as_str().into(),
                    }
                }
                DrawingElement::Arc(arc) => {
                    let idx = arc_idx;
                    arc_idx += 1;
                    match modifications.arcs.get(&idx) {
                        Some(raw) => raw.as_str().into(),
                        None => arc.raw.as_str().into(),
                    }
                }
                other => other.raw().into(),
            };
            out.push_str(&text);
            out.push_str(ending.as_str());
        }

        out
    }
}

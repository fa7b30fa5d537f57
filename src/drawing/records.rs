//! Pass A: speculative `(type, size, payload)` record scan
//!
//! The record layout is reverse-engineered, so every offset is just a
//! candidate. A header with an implausible size costs one byte of progress;
//! any other header is skipped whole, known type or not. Nothing here ever
//! fails the whole scan.

use std::ops::RangeInclusive;

use encoding_rs::SHIFT_JIS;
use serde::{Deserialize, Serialize};

use super::{ArcShape, Segment};
use crate::geometry::Point;

/// Where pass A starts: right after the magic and the version word
pub const RECORD_SCAN_START: usize = 12;

const MAX_RECORD_SIZE: usize = 512;
const MAX_COORDINATE: f64 = 1_000_000.0;
const MAX_RADIUS: f64 = 100_000.0;
const MIN_LINE_LENGTH: f64 = 0.1;

/// Upper bound on lines and on arcs collected from one file
pub const MAX_ENTITIES: usize = 2000;

/// Record type ranges believed to carry lines, arcs and placed text.
///
/// These are best-effort guesses, not format knowledge; they are kept in
/// configuration so they can be adjusted without a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypes {
    pub lines: RangeInclusive<u16>,
    pub arcs: RangeInclusive<u16>,
    pub texts: RangeInclusive<u16>,
}

impl Default for RecordTypes {
    fn default() -> Self {
        Self {
            lines: 0x10..=0x13,
            arcs: 0x20..=0x23,
            texts: 0x30..=0x35,
        }
    }
}

/// A text string found inside a text record, with its insertion point
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub position: Point,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct RecordScan {
    pub lines: Vec<Segment>,
    pub arcs: Vec<ArcShape>,
    pub texts: Vec<PlacedText>,
}

enum Entity {
    Line(Segment),
    Arc(ArcShape),
    Text(PlacedText),
}

/// Outcome of probing one offset
enum Probe {
    /// No plausible record header here; advance one byte
    NoMatch,
    /// A plausible record header; skip its payload, keeping the entity if the
    /// type is known and the payload decodes
    Record { len: usize, entity: Option<Entity> },
}

pub fn scan_records(data: &[u8], types: &RecordTypes) -> RecordScan {
    let mut scan = RecordScan::default();
    let mut offset = RECORD_SCAN_START;

    while offset + 4 <= data.len() {
        match probe(data, offset, types) {
            Probe::NoMatch => offset += 1,
            Probe::Record { len, entity } => {
                match entity {
                    Some(Entity::Line(line)) if scan.lines.len() < MAX_ENTITIES => {
                        scan.lines.push(line)
                    }
                    Some(Entity::Arc(arc)) if scan.arcs.len() < MAX_ENTITIES => scan.arcs.push(arc),
                    Some(Entity::Text(text)) if scan.texts.len() < MAX_ENTITIES => {
                        scan.texts.push(text)
                    }
                    _ => {}
                }
                offset += len;
            }
        }
    }

    log::debug!(
        "record scan: {} lines, {} arcs, {} placed texts",
        scan.lines.len(),
        scan.arcs.len(),
        scan.texts.len()
    );
    scan
}

fn probe(data: &[u8], offset: usize, types: &RecordTypes) -> Probe {
    let Some(record_type) = read_u16(data, offset) else {
        return Probe::NoMatch;
    };
    let size = read_u16(data, offset + 2).unwrap_or(0) as usize;
    if size == 0 || size > MAX_RECORD_SIZE || offset + 4 + size > data.len() {
        return Probe::NoMatch;
    }
    let payload = &data[offset + 4..offset + 4 + size];

    let entity = if types.lines.contains(&record_type) && size >= 32 {
        decode_line(payload).map(Entity::Line)
    } else if types.arcs.contains(&record_type) && size >= 40 {
        decode_arc(payload).map(Entity::Arc)
    } else if types.texts.contains(&record_type) && size >= 19 {
        decode_text(payload).map(Entity::Text)
    } else {
        None
    };

    Probe::Record {
        len: 4 + size,
        entity,
    }
}

fn decode_line(payload: &[u8]) -> Option<Segment> {
    let [x1, y1, x2, y2] = read_f64s::<4>(payload)?;
    if ![x1, y1, x2, y2].iter().all(|v| v.abs() < MAX_COORDINATE) {
        return None;
    }
    let segment = Segment {
        start: Point::new(x1, y1),
        end: Point::new(x2, y2),
    };
    (segment.length() >= MIN_LINE_LENGTH).then_some(segment)
}

fn decode_arc(payload: &[u8]) -> Option<ArcShape> {
    let [cx, cy, radius, start_angle, end_angle] = read_f64s::<5>(payload)?;
    let plausible = cx.abs() < MAX_COORDINATE
        && cy.abs() < MAX_COORDINATE
        && radius > 0.0
        && radius < MAX_RADIUS
        && start_angle.is_finite()
        && end_angle.is_finite();
    plausible.then(|| ArcShape {
        center: Point::new(cx, cy),
        radius,
        start_angle,
        end_angle,
    })
}

/// `x: f64, y: f64, len: u8, len bytes of Shift_JIS`
fn decode_text(payload: &[u8]) -> Option<PlacedText> {
    let [x, y] = read_f64s::<2>(payload)?;
    if !(x.abs() < MAX_COORDINATE && y.abs() < MAX_COORDINATE) {
        return None;
    }
    let len = *payload.get(16)? as usize;
    let bytes = payload.get(17..17 + len)?;
    let text = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes)?;
    let text = text.trim();
    (!text.is_empty() && !text.chars().any(char::is_control)).then(|| PlacedText {
        position: Point::new(x, y),
        text: text.to_string(),
    })
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_f64s<const N: usize>(payload: &[u8]) -> Option<[f64; N]> {
    let mut values = [0.0; N];
    for (i, value) in values.iter_mut().enumerate() {
        let bytes: [u8; 8] = payload.get(i * 8..i * 8 + 8)?.try_into().ok()?;
        *value = f64::from_le_bytes(bytes);
    }
    Some(values)
}

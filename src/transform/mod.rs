//! Geometric transform engine
//!
//! Pure functions over decoded exchange elements. The result is a sparse
//! [`Modifications`] set: the writer leaves every element without an entry
//! exactly as it was read.

mod descriptor;

use crate::exchange::{ArcRecord, DrawingElement, LineCoords, Modifications};
use crate::geometry::{BoundingBox, Point, normalize_degrees};

pub use descriptor::{TransformDescriptor, TransformKind, TransformScope, extract_descriptor};

/// Result of [`apply`] plus bookkeeping for the operator
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformOutcome {
    pub modifications: Modifications,
    /// Lines whose coordinates actually changed
    pub lines_changed: usize,
    /// Arcs whose text actually changed
    pub arcs_changed: usize,
    /// Arcs that were in scope but could not be transformed (no angle
    /// fields for a flip, or any arc under `Rotate`)
    pub arcs_skipped: usize,
}

/// Center of the box around all line endpoints and arc bounding circles
pub fn default_center(elements: &[DrawingElement]) -> Point {
    let points = elements.iter().flat_map(|e| match e {
        DrawingElement::Line(line) => vec![line.coords.start(), line.coords.end()],
        DrawingElement::Arc(arc) => vec![
            Point::new(arc.center_x - arc.radius, arc.center_y - arc.radius),
            Point::new(arc.center_x + arc.radius, arc.center_y + arc.radius),
        ],
        _ => Vec::new(),
    });
    BoundingBox::from_points(points)
        .map(|bbox| bbox.center())
        .unwrap_or_default()
}

/// Apply `descriptor` to `elements`.
///
/// Every line gets an entry in the line map (unchanged coordinates when it
/// is out of scope) and every arc an entry in the arc map (its original text
/// when untouched), so callers can tell "considered" from "absent".
pub fn apply(elements: &[DrawingElement], descriptor: &TransformDescriptor) -> TransformOutcome {
    let center = default_center(elements);
    let axis_x = descriptor.axis_x.unwrap_or(center.x);
    let axis_y = descriptor.axis_y.unwrap_or(center.y);
    let pivot = Point::new(
        descriptor.center_x.unwrap_or(center.x),
        descriptor.center_y.unwrap_or(center.y),
    );
    let angle = descriptor.angle_degrees.unwrap_or(0.0);

    let kind = descriptor.kind;
    let lines_in_scope = !kind.is_arc_flip() && descriptor.scope != TransformScope::CirclesOnly;
    let arcs_in_scope = kind.is_arc_flip() || descriptor.scope != TransformScope::LinesOnly;

    let mut outcome = TransformOutcome::default();
    let mut line_idx = 0;
    let mut arc_idx = 0;

    for element in elements {
        match element {
            DrawingElement::Line(line) => {
                let coords = if lines_in_scope {
                    transform_line(&line.coords, kind, axis_x, axis_y, angle, pivot)
                } else {
                    line.coords
                };
                if coords != line.coords {
                    outcome.lines_changed += 1;
                }
                outcome.modifications.lines.insert(line_idx, coords);
                line_idx += 1;
            }
            DrawingElement::Arc(arc) => {
                let selected = descriptor
                    .arc_indices
                    .as_ref()
                    .is_none_or(|set| set.contains(&arc_idx));
                let replacement = if selected && arcs_in_scope {
                    let new_raw = transform_arc(arc, kind, axis_x, axis_y);
                    if new_raw.is_none() {
                        outcome.arcs_skipped += 1;
                    }
                    new_raw
                } else {
                    None
                };
                let raw = replacement.unwrap_or_else(|| arc.raw.clone());
                if raw != arc.raw {
                    outcome.arcs_changed += 1;
                }
                outcome.modifications.arcs.insert(arc_idx, raw);
                arc_idx += 1;
            }
            _ => {}
        }
    }

    if kind == TransformKind::Rotate && outcome.arcs_skipped > 0 {
        log::warn!(
            "rotate only moves lines; {} arc(s) left unchanged",
            outcome.arcs_skipped
        );
    }

    outcome
}

fn transform_line(
    coords: &LineCoords,
    kind: TransformKind,
    axis_x: f64,
    axis_y: f64,
    angle: f64,
    pivot: Point,
) -> LineCoords {
    let map = |p: Point| match kind {
        TransformKind::MirrorX => p.mirror_x(axis_x),
        TransformKind::MirrorY => p.mirror_y(axis_y),
        TransformKind::Rotate => p.rotate(angle, pivot),
        TransformKind::ArcFlipX | TransformKind::ArcFlipY => p,
    };
    LineCoords::from_points(map(coords.start()), map(coords.end()))
}

/// Angles after a left/right reflection; start and end swap roles so the
/// arc stays counter-clockwise.
fn flip_angles_x((start, end): (f64, f64)) -> (f64, f64) {
    (normalize_degrees(180.0 - end), normalize_degrees(180.0 - start))
}

/// Angles after an up/down reflection
fn flip_angles_y((start, end): (f64, f64)) -> (f64, f64) {
    (normalize_degrees(360.0 - end), normalize_degrees(360.0 - start))
}

/// New raw text for an arc, or `None` when the transform cannot apply
fn transform_arc(arc: &ArcRecord, kind: TransformKind, axis_x: f64, axis_y: f64) -> Option<String> {
    match kind {
        TransformKind::ArcFlipX => arc
            .angles
            .map(flip_angles_x)
            .map(|(s, e)| arc.with_angles(s, e)),
        TransformKind::ArcFlipY => arc
            .angles
            .map(flip_angles_y)
            .map(|(s, e)| arc.with_angles(s, e)),
        TransformKind::MirrorX => Some(arc.with_center(
            arc.center().mirror_x(axis_x),
            arc.angles.map(flip_angles_x),
        )),
        TransformKind::MirrorY => Some(arc.with_center(
            arc.center().mirror_y(axis_y),
            arc.angles.map(flip_angles_y),
        )),
        // Arc rotation is not supported; arcs keep their position.
        TransformKind::Rotate => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::exchange::ExchangeDocument;

    fn parse(text: &str) -> Vec<DrawingElement> {
        ExchangeDocument::parse(text).elements
    }

    fn serialize(elements: &[DrawingElement], modifications: &Modifications) -> String {
        let doc = ExchangeDocument {
            elements: elements.to_vec(),
            ..ExchangeDocument::default()
        };
        doc.serialize(modifications)
    }

    fn descriptor(kind: TransformKind) -> TransformDescriptor {
        TransformDescriptor::new(kind)
    }

    #[test]
    fn test_mirror_x_line_example() {
        let elements = parse("0 0 100 0\n");
        let mut d = descriptor(TransformKind::MirrorX);
        d.axis_x = Some(50.0);
        let outcome = apply(&elements, &d);
        assert_eq!(
            outcome.modifications.lines[&0],
            LineCoords::new(100.0, 0.0, 0.0, 0.0)
        );
        assert_eq!(serialize(&elements, &outcome.modifications), "100 0 0 0\n");
    }

    #[test]
    fn test_arc_flip_x_example() {
        let elements = parse("ci 500 500 800 90 180\n");
        let outcome = apply(&elements, &descriptor(TransformKind::ArcFlipX));
        assert_eq!(outcome.modifications.arcs[&0], "ci 500 500 800 0 90");
        assert_eq!(outcome.arcs_changed, 1);
    }

    #[test]
    fn test_arc_flip_keeps_center_and_radius() {
        let elements = parse("ci 123.456 -78.9 812.5 30 120 1 0\n");
        for kind in [TransformKind::ArcFlipX, TransformKind::ArcFlipY] {
            let outcome = apply(&elements, &descriptor(kind));
            let flipped = parse(&outcome.modifications.arcs[&0]);
            let DrawingElement::Arc(arc) = &flipped[0] else {
                panic!("flipped arc did not parse as an arc");
            };
            assert_eq!(arc.center_x.to_bits(), 123.456f64.to_bits());
            assert_eq!(arc.center_y.to_bits(), (-78.9f64).to_bits());
            assert_eq!(arc.radius.to_bits(), 812.5f64.to_bits());
            assert_eq!(arc.trailing_fields(), ["1", "0"]);
        }
    }

    #[test]
    fn test_arc_flip_x_twice_is_identity() {
        let elements = parse("ci 0 0 900 270 0\n");
        let once = apply(&elements, &descriptor(TransformKind::ArcFlipX));
        let once_elements = parse(&once.modifications.arcs[&0]);
        let twice = apply(&once_elements, &descriptor(TransformKind::ArcFlipX));
        assert_eq!(twice.modifications.arcs[&0], "ci 0 0 900 270 0");
    }

    #[test]
    fn test_arc_flip_y_angles() {
        let elements = parse("ci 0 0 10 0 90\n");
        let outcome = apply(&elements, &descriptor(TransformKind::ArcFlipY));
        assert_eq!(outcome.modifications.arcs[&0], "ci 0 0 10 270 0");
    }

    #[test]
    fn test_arc_flip_leaves_lines_alone() {
        let text = "0.0 0 100 0\nci 50 0 50 0 90\n";
        let elements = parse(text);
        let outcome = apply(&elements, &descriptor(TransformKind::ArcFlipX));
        assert_eq!(outcome.lines_changed, 0);
        assert!(outcome.modifications.lines.contains_key(&0));
        assert_eq!(
            serialize(&elements, &outcome.modifications),
            "0.0 0 100 0\nci 50 0 50 90 180\n"
        );
    }

    #[test]
    fn test_mirror_x_is_involution() {
        let elements = parse("12.5 -3 88.25 41\n-7 0 3 9\n");
        let mut d = descriptor(TransformKind::MirrorX);
        d.axis_x = Some(17.3);
        let once = apply(&elements, &d);
        let mirrored = parse(&serialize(&elements, &once.modifications));
        let twice = apply(&mirrored, &d);
        let originals: Vec<LineCoords> = ExchangeDocument::parse("12.5 -3 88.25 41\n-7 0 3 9\n")
            .lines()
            .map(|l| l.coords)
            .collect();
        for (i, original) in originals.iter().enumerate() {
            let back = twice.modifications.lines[&i];
            assert!((back.x1 - original.x1).abs() < 1e-9);
            assert!((back.x2 - original.x2).abs() < 1e-9);
            assert_eq!(back.y1, original.y1);
            assert_eq!(back.y2, original.y2);
        }
    }

    #[test]
    fn test_selective_arc_targeting() {
        let text = "ci 0 0 10 0 90\nci 100 0 10 0 90\nci 200 0 10 0 90\n";
        let elements = parse(text);
        let mut d = descriptor(TransformKind::ArcFlipX);
        d.arc_indices = Some(BTreeSet::from([1]));
        let outcome = apply(&elements, &d);
        assert_eq!(outcome.modifications.arcs[&0], "ci 0 0 10 0 90");
        assert_eq!(outcome.modifications.arcs[&1], "ci 100 0 10 90 180");
        assert_eq!(outcome.modifications.arcs[&2], "ci 200 0 10 0 90");
        assert_eq!(outcome.arcs_changed, 1);
    }

    #[test]
    fn test_default_axis_uses_bounding_box() {
        // lines span x 0..100, the arc's circle spans 150..250 -> center x = 125
        let elements = parse("0 0 100 0\nci 200 0 50 0 90\n");
        let outcome = apply(&elements, &descriptor(TransformKind::MirrorX));
        assert_eq!(
            outcome.modifications.lines[&0],
            LineCoords::new(250.0, 0.0, 150.0, 0.0)
        );
        assert_eq!(outcome.modifications.arcs[&0], "ci 50 0 50 90 180");
    }

    #[test]
    fn test_mirror_y_moves_arc_center() {
        let elements = parse("ci 10 20 5 0 90\n");
        let mut d = descriptor(TransformKind::MirrorY);
        d.axis_y = Some(0.0);
        let outcome = apply(&elements, &d);
        assert_eq!(outcome.modifications.arcs[&0], "ci 10 -20 5 270 0");
    }

    #[test]
    fn test_scope_lines_only_and_circles_only() {
        let elements = parse("0 0 10 0\nci 5 5 1 0 90\n");
        let mut d = descriptor(TransformKind::MirrorX);
        d.axis_x = Some(0.0);

        d.scope = TransformScope::LinesOnly;
        let outcome = apply(&elements, &d);
        assert_eq!(outcome.lines_changed, 1);
        assert_eq!(outcome.arcs_changed, 0);

        d.scope = TransformScope::CirclesOnly;
        let outcome = apply(&elements, &d);
        assert_eq!(outcome.lines_changed, 0);
        assert_eq!(outcome.modifications.arcs[&0], "ci -5 5 1 90 180");
    }

    #[test]
    fn test_rotate_moves_lines_but_not_arcs() {
        let elements = parse("10 0 20 0\nci 15 0 5 0 90\n");
        let mut d = descriptor(TransformKind::Rotate);
        d.angle_degrees = Some(90.0);
        d.center_x = Some(0.0);
        d.center_y = Some(0.0);
        let outcome = apply(&elements, &d);
        let line = outcome.modifications.lines[&0];
        assert!(line.x1.abs() < 1e-9 && (line.y1 - 10.0).abs() < 1e-9);
        assert!(line.x2.abs() < 1e-9 && (line.y2 - 20.0).abs() < 1e-9);
        // known limitation: arcs are not rotated
        assert_eq!(outcome.modifications.arcs[&0], "ci 15 0 5 0 90");
        assert_eq!(outcome.arcs_skipped, 1);
    }

    #[test]
    fn test_circle_without_angles_cannot_flip() {
        let elements = parse("ci 1 2 3\n");
        let outcome = apply(&elements, &descriptor(TransformKind::ArcFlipX));
        assert_eq!(outcome.modifications.arcs[&0], "ci 1 2 3");
        assert_eq!(outcome.arcs_skipped, 1);

        let mut d = descriptor(TransformKind::MirrorX);
        d.axis_x = Some(0.0);
        let outcome = apply(&elements, &d);
        assert_eq!(outcome.modifications.arcs[&0], "ci -1 2 3");
    }
}

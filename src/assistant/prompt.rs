//! Text handed to the completion service

use std::fmt::Write as _;

use crate::exchange::ExchangeDocument;

const MAX_LISTED_LINES: usize = 30;
const MAX_LISTED_TEXTS: usize = 10;
const MAX_RAW_LINES: usize = 30;

const TRANSFORM_RULES: &str = r#"You help edit a Jw_cad selection by choosing one geometric transform.
When a change is wanted, answer with exactly one JSON object in a ```json code block:

  {"type": "<kind>", ...}

kinds:
  mirror_x    reflect across a vertical line; optional "axis_x"
  mirror_y    reflect across a horizontal line; optional "axis_y"
  rotate      rotate lines by "angle" degrees about optional "cx", "cy" (arcs stay put)
  arc_flip_x  swap an arc's swing left/right, keeping its center and radius
  arc_flip_y  swap an arc's swing up/down, keeping its center and radius

optional:
  "target": "all" | "circles_only" | "lines_only"
  "circle_indices": [n, ...]   only these arcs (numbers from the arc list below)

To change which way a door opens, find the quarter arc of the door swing
(marked [door swing], radius roughly 700-1000), put its number in
"circle_indices" and use arc_flip_x or arc_flip_y, never mirror_x.
If nothing should change, reply in prose without JSON.
"#;

/// Numbered digest of the current selection
pub fn selection_context(document: &ExchangeDocument) -> String {
    let lines: Vec<_> = document.lines().collect();
    let arcs: Vec<_> = document.arcs().collect();
    let texts: Vec<_> = document.texts().collect();

    let mut ctx = String::new();
    let _ = writeln!(
        ctx,
        "Selection: {} lines, {} texts, {} arcs",
        lines.len(),
        texts.len(),
        arcs.len()
    );

    if !lines.is_empty() {
        let _ = writeln!(ctx, "\nLines (mm):");
        for (i, line) in lines.iter().take(MAX_LISTED_LINES).enumerate() {
            let c = &line.coords;
            let _ = writeln!(
                ctx,
                "  line {}: ({:.2},{:.2}) -> ({:.2},{:.2})  length {:.2}",
                i + 1,
                c.x1,
                c.y1,
                c.x2,
                c.y2,
                c.length()
            );
        }
        if lines.len() > MAX_LISTED_LINES {
            let _ = writeln!(ctx, "  ... {} more", lines.len() - MAX_LISTED_LINES);
        }
    }

    if !arcs.is_empty() {
        let _ = writeln!(ctx, "\nArcs (use these numbers in circle_indices):");
        for (i, arc) in arcs.iter().enumerate() {
            let _ = write!(
                ctx,
                "  [arc {i}] {}\n    center ({:.2},{:.2}) radius {:.2}",
                arc.raw, arc.center_x, arc.center_y, arc.radius
            );
            if let (Some((start, end)), Some(span)) = (arc.angles, arc.span()) {
                let _ = write!(ctx, " start {start:.1} end {end:.1}");
                if (80.0..=100.0).contains(&span) {
                    ctx.push_str(" [door swing]");
                } else if (170.0..=190.0).contains(&span) {
                    ctx.push_str(" [half circle]");
                } else if span < 5.0 {
                    ctx.push_str(" [full circle]");
                }
            }
            ctx.push('\n');
        }
    }

    if !texts.is_empty() {
        let _ = writeln!(ctx, "\nTexts:");
        for text in texts.iter().take(MAX_LISTED_TEXTS) {
            let _ = writeln!(ctx, "  {}", text.raw);
        }
    }

    let _ = writeln!(ctx, "\nFirst {MAX_RAW_LINES} raw lines:");
    for raw in document.raw_lines.iter().take(MAX_RAW_LINES) {
        let _ = writeln!(ctx, "  {raw}");
    }
    ctx
}

/// Full system prompt: rules, optional drawing digest, then the selection
pub fn system_prompt(
    selection: Option<&str>,
    drawing_summary: Option<&str>,
    has_image: bool,
) -> String {
    let mut prompt = TRANSFORM_RULES.to_string();
    if has_image {
        prompt.push_str(
            "\nA screenshot of the drawing is attached to the request. Use it to locate the \
             element the user means and pick the matching arc number.\n",
        );
    }
    if let Some(summary) = drawing_summary {
        let _ = write!(prompt, "\nWhole drawing:\n{summary}");
    }
    if let Some(selection) = selection {
        let _ = write!(prompt, "\nCurrent selection (transform target):\n{selection}");
    }
    prompt
}

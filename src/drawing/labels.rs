//! Pass B: length-prefixed string scan and label classification

use std::collections::HashSet;
use std::sync::LazyLock;

use encoding_rs::SHIFT_JIS;
use regex::Regex;
use serde::Serialize;

use crate::geometry::Point;

const MIN_LABEL_BYTES: usize = 2;
const MAX_LABEL_BYTES: usize = 120;
const MIN_LABEL_CHARS: usize = 2;

/// Upper bound on labels kept from one file
pub const MAX_LABELS: usize = 200;

/// Words that name a room or a room-sized area
const ROOM_KEYWORDS: &[&str] = &[
    "洋室", "和室", "居間", "食堂", "台所", "寝室", "子供室", "書斎", "客間", "納戸", "玄関",
    "廊下", "浴室", "洗面", "脱衣", "便所", "トイレ", "階段", "収納", "押入", "物入", "クローゼット",
    "WIC", "SIC", "バルコニー", "ベランダ", "テラス", "ホール", "キッチン", "リビング", "ダイニング",
    "LDK", "DK", "WC", "UB", "帖", "畳",
];

static DIMENSION: LazyLock<Regex> = LazyLock::new(|| {
    let number = r"(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?";
    let pattern = format!(
        r"^(?:{number}|{number}\s*[xX×*]\s*{number}|(?:R|Φ|φ|Ø|ø|⌀)\s*=?\s*{number})$"
    );
    Regex::new(&pattern).expect("dimension pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Dimension,
    RoomLabel,
    PlainText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub text: String,
    pub kind: LabelKind,
    /// Insertion point, when a text record carried the same string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
}

pub fn scan_labels(data: &[u8]) -> Vec<Label> {
    let mut labels = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0;

    while offset + 1 < data.len() && labels.len() < MAX_LABELS {
        let len = data[offset] as usize;
        if (MIN_LABEL_BYTES..=MAX_LABEL_BYTES).contains(&len) {
            if let Some(chunk) = data.get(offset + 1..offset + 1 + len) {
                if let Some(label) = probe_label(chunk) {
                    if seen.insert(label.text.clone()) {
                        labels.push(label);
                    }
                    offset += 1 + len;
                    continue;
                }
            }
        }
        offset += 1;
    }

    log::debug!("label scan: {} labels", labels.len());
    labels
}

fn probe_label(chunk: &[u8]) -> Option<Label> {
    let decoded = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(chunk)?;
    let clean: String = decoded.chars().filter(|c| !c.is_control()).collect();
    let clean = clean.trim();
    if clean.chars().count() < MIN_LABEL_CHARS {
        return None;
    }

    let text = normalize_width(clean);
    let kind = if DIMENSION.is_match(&text) {
        LabelKind::Dimension
    } else if !clean.chars().any(is_east_asian) {
        return None;
    } else if ROOM_KEYWORDS.iter().any(|k| text.contains(k)) {
        LabelKind::RoomLabel
    } else {
        LabelKind::PlainText
    };

    Some(Label {
        text,
        kind,
        position: None,
    })
}

/// Kana, CJK ideographs and full-width forms
fn is_east_asian(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{9fff}' | '\u{ff00}'..='\u{ffef}')
}

/// Fold full-width ASCII variants and the ideographic space to their
/// half-width forms
pub fn normalize_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{ff01}'..='\u{ff5e}' => char::from_u32(c as u32 - 0xfee0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

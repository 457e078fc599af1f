//! Sticky-note extraction from raw Mural widgets
//!
//! Widgets arrive as loosely shaped JSON. Content is pulled from a fixed
//! set of text fields, cleaned, filtered, and tagged with a colour class
//! that decides which report table the note belongs to.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const CONTENT_FIELDS: [&str; 6] = ["htmlText", "text", "title", "content", "description", "label"];
const NOTE_TYPES: [&str; 6] = ["sticky_note", "stickyNote", "sticky", "text", "textWidget", "shape"];

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref SCENARIO_LABEL: Regex =
        Regex::new(r"(?i)Very high scenario at 90%\s*\(\s*(?:2020|2040|2060|2080|2099)\s*\)").unwrap();
    static ref NUMERIC_ENTITY: Regex = Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").unwrap();
}

/// Colour class of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteColor {
    Yellow,
    #[serde(rename = "Dark Red")]
    DarkRed,
    Orange,
    Green,
    Blue,
    White,
    Other,
}

impl NoteColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteColor::Yellow => "Yellow",
            NoteColor::DarkRed => "Dark Red",
            NoteColor::Orange => "Orange",
            NoteColor::Green => "Green",
            NoteColor::Blue => "Blue",
            NoteColor::White => "White",
            NoteColor::Other => "Other",
        }
    }
}

const KNOWN_CODES: [(NoteColor, &[&str]); 6] = [
    (
        NoteColor::Yellow,
        &["#FCF281", "#FFFF00", "255,255,0", "#FFEB3B", "#FFD700", "#FDD835", "#FFC107"],
    ),
    (
        NoteColor::DarkRed,
        &["#BF0C0C", "191,12,12", "#D32F2F", "#C62828", "#B71C1C", "#FF0000", "#CC0000"],
    ),
    (
        NoteColor::Orange,
        &["#FFC061", "255,192,97", "#FF9800", "#F57C00", "#EF6C00", "#FFA500", "#FF8C00"],
    ),
    (
        NoteColor::Green,
        &["#AAED92", "170,237,146", "#4CAF50", "#388E3C", "#2E7D32", "#66BB6A", "#81C784"],
    ),
    (
        NoteColor::Blue,
        &["#9EDCFA", "158,220,250", "#2196F3", "#1976D2", "#1565C0"],
    ),
    (
        NoteColor::White,
        &["#FFFFFF", "255,255,255", "#FFF", "#FAFAFA"],
    ),
];

/// Classify a `style.backgroundColor` value
pub fn classify_color(code: &str) -> NoteColor {
    let upper = code.to_uppercase();
    let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();

    for (color, codes) in KNOWN_CODES.iter() {
        if codes.iter().any(|known| compact.contains(known)) {
            return *color;
        }
    }

    if let Some(inner) = compact
        .strip_prefix("RGBA(")
        .or_else(|| compact.strip_prefix("RGB("))
    {
        let channels: Vec<f64> = inner
            .trim_end_matches(')')
            .split(',')
            .filter_map(|c| c.parse::<f64>().ok())
            .collect();
        if channels.len() >= 3 {
            let (r, g, b) = (channels[0] as i64, channels[1] as i64, channels[2] as i64);
            if let Some(color) = classify_rgb(r, g, b, true) {
                return color;
            }
        }
    }

    if let Some(hex) = compact.strip_prefix('#') {
        if (hex.len() == 6 || hex.len() == 8) && hex.is_ascii() {
            let channel = |i: usize| i64::from_str_radix(&hex[i..i + 2], 16).ok();
            if let (Some(r), Some(g), Some(b)) = (channel(0), channel(2), channel(4)) {
                if let Some(color) = classify_rgb(r, g, b, false) {
                    return color;
                }
            }
        }
    }

    NoteColor::Other
}

/// Channel heuristics; blue is only inferred for rgb()/rgba() values
fn classify_rgb(r: i64, g: i64, b: i64, allow_blue: bool) -> Option<NoteColor> {
    if r > 200 && g > 200 && b < 150 {
        Some(NoteColor::Yellow)
    } else if r > 150 && g < 100 && b < 100 {
        Some(NoteColor::DarkRed)
    } else if r > 200 && g > 100 && b < 100 {
        Some(NoteColor::Orange)
    } else if g > r && g > b {
        Some(NoteColor::Green)
    } else if allow_blue && b > r && b > g {
        Some(NoteColor::Blue)
    } else {
        None
    }
}

/// Strip tags, decode entities and collapse whitespace
pub fn clean_text(raw: &str) -> String {
    let without_tags = TAG.replace_all(raw, " ");
    let decoded = decode_entities(&without_tags).replace('\u{a0}', " ");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures<'_>| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    // `&amp;` last so "&amp;lt;" decodes to "&lt;" rather than "<"
    numeric.replace("&amp;", "&")
}

/// Remove scenario labels that are part of the board furniture
pub fn filter_content(text: &str) -> String {
    let filtered = SCENARIO_LABEL.replace_all(text, "");
    WHITESPACE.replace_all(&filtered, " ").trim().to_string()
}

/// One extracted piece of note text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNote {
    pub widget_id: String,
    pub widget_type: String,
    pub parent_id: Option<String>,
    pub color: NoteColor,
    pub color_code: String,
    pub position_x: f64,
    pub position_y: f64,
    pub content: String,
    pub source_field: String,
}

/// `(field, cleaned text)` for every content field of a widget
pub fn extract_content(widget: &Value) -> Vec<(String, String)> {
    let mut items = Vec::new();
    for field in CONTENT_FIELDS {
        match widget.get(field) {
            Some(Value::String(raw)) => {
                if let Some(cleaned) = clean_and_filter(raw) {
                    items.push((field.to_string(), cleaned));
                }
            }
            Some(Value::Object(nested)) => {
                for (key, value) in nested {
                    if let Value::String(raw) = value {
                        if let Some(cleaned) = clean_and_filter(raw) {
                            items.push((format!("{}.{}", field, key), cleaned));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    items
}

fn clean_and_filter(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let text = filter_content(&clean_text(raw));
    (!text.is_empty()).then_some(text)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("value").and_then(number),
        _ => None,
    }
}

fn coordinate(widget: &Value, keys: [&str; 3]) -> f64 {
    let from = |source: Option<&Value>| {
        source.and_then(|s| keys.iter().find_map(|k| s.get(*k).and_then(number)))
    };
    from(widget.get("position"))
        .or_else(|| from(Some(widget)))
        .unwrap_or(0.0)
}

/// Widget position from `position.{x|left|positionX}` or top-level fields
pub fn widget_position(widget: &Value) -> (f64, f64) {
    (
        coordinate(widget, ["x", "left", "positionX"]),
        coordinate(widget, ["y", "top", "positionY"]),
    )
}

fn widget_color(widget: &Value) -> (NoteColor, String) {
    let code = widget
        .get("style")
        .and_then(|s| s.get("backgroundColor"))
        .and_then(Value::as_str)
        .unwrap_or("#FFFFFF")
        .to_string();
    (classify_color(&code), code)
}

fn str_field(widget: &Value, key: &str) -> String {
    widget
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn notes_from(widget: &Value, widget_type: String, parent_id: Option<String>) -> Vec<StickyNote> {
    let (color, color_code) = widget_color(widget);
    let (position_x, position_y) = widget_position(widget);
    let widget_id = str_field(widget, "id");

    extract_content(widget)
        .into_iter()
        .map(|(field, content)| StickyNote {
            widget_id: widget_id.clone(),
            widget_type: widget_type.clone(),
            parent_id: parent_id.clone(),
            color,
            color_code: color_code.clone(),
            position_x,
            position_y,
            content,
            source_field: field,
        })
        .collect()
}

/// Extract every note from a list of widgets, descending into groups
pub fn process_widgets(widgets: &[Value]) -> Vec<StickyNote> {
    let mut notes = Vec::new();

    for widget in widgets {
        let widget_type = widget
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        if widget_type == "group" {
            let group_id = str_field(widget, "id");
            let children = widget
                .get("children")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for child in children.iter().filter(|c| c.is_object()) {
                let child_type = child.get("type").and_then(Value::as_str).unwrap_or("unknown");
                if NOTE_TYPES.contains(&child_type) {
                    notes.extend(notes_from(
                        child,
                        format!("group_child_{}", child_type),
                        Some(group_id.clone()),
                    ));
                }
            }
            notes.extend(notes_from(widget, "group".to_string(), None));
            continue;
        }

        notes.extend(notes_from(widget, widget_type.to_string(), None));
    }

    debug!(
        "Extracted {} note items from {} widgets",
        notes.len(),
        widgets.len()
    );
    notes
}

/// Notes grouped by their destination
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrganizedNotes {
    pub yellow: Vec<StickyNote>,
    pub dark_red: Vec<StickyNote>,
    pub orange: Vec<StickyNote>,
    pub green: Vec<StickyNote>,
    pub blue: Vec<StickyNote>,
    pub other: Vec<StickyNote>,
}

impl OrganizedNotes {
    pub fn total(&self) -> usize {
        self.yellow.len()
            + self.dark_red.len()
            + self.orange.len()
            + self.green.len()
            + self.blue.len()
            + self.other.len()
    }
}

/// Yellow, dark red and orange feed the risks table; green and blue feed
/// the RAPA table; everything else is kept aside
pub fn organize(notes: Vec<StickyNote>) -> OrganizedNotes {
    let mut organized = OrganizedNotes::default();
    for note in notes {
        let bucket = match note.color {
            NoteColor::Yellow => &mut organized.yellow,
            NoteColor::DarkRed => &mut organized.dark_red,
            NoteColor::Orange => &mut organized.orange,
            NoteColor::Green => &mut organized.green,
            NoteColor::Blue => &mut organized.blue,
            NoteColor::White | NoteColor::Other => &mut organized.other,
        };
        bucket.push(note);
    }
    organized
}

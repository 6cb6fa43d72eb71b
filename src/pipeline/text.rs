//! Deterministic cleanup of model-generated narration.
//!
//! Narration goes straight into a speech engine, so anything that is not
//! meant to be spoken has to go: code fences, markdown emphasis, panel
//! labels the model echoed back, invisible Unicode. Rules run in order:
//!
//! 1. Strip outer code fences
//! 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 3. Drop a leading `[Panel 3]` / `Scene 3:` label
//! 4. Remove markdown emphasis markers
//! 5. Collapse all whitespace to single spaces

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a narration segment.
pub fn clean_narration(input: &str) -> String {
    let s = strip_fences(input);
    let s = remove_invisible_chars(&s);
    let s = strip_panel_label(&s);
    let s = remove_emphasis(&s);
    collapse_whitespace(&s)
}

/// The substring from the first `{` to the last `}`, if any.
///
/// Models often wrap JSON in prose or fences; this recovers the object.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n?(.*?)\n?```$").unwrap());

fn strip_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 2: Invisible characters ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Leading panel / scene label ──────────────────────────────────

static RE_LEADING_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:\[\s*panel\s*\d+\s*\]|(?:panel|scene)\s*\d+\s*[:.\-])\s*").unwrap()
});

fn strip_panel_label(input: &str) -> String {
    RE_LEADING_LABEL.replace(input, "").to_string()
}

// ── Rule 4: Markdown emphasis ────────────────────────────────────────────

static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{1,3}|_{2,3}").unwrap());

fn remove_emphasis(input: &str) -> String {
    RE_EMPHASIS.replace_all(input, "").to_string()
}

// ── Rule 5: Whitespace ───────────────────────────────────────────────────

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_labels() {
        assert_eq!(clean_narration("```\nScene 2: He runs!\n```"), "He runs!");
        assert_eq!(clean_narration("[Panel 0]  The door opens."), "The door opens.");
        assert_eq!(clean_narration("panel 4 - Silence."), "Silence.");
    }

    #[test]
    fn removes_emphasis_and_invisibles() {
        assert_eq!(
            clean_narration("**BOOM!**\u{200B} The   wall\ncollapses."),
            "BOOM! The wall collapses."
        );
    }

    #[test]
    fn keeps_plain_text() {
        assert_eq!(clean_narration("Aur agle hi pal..."), "Aur agle hi pal...");
        assert_eq!(clean_narration("   "), "");
    }

    #[test]
    fn extracts_json_object() {
        let raw = "Sure! Here you go:\n```json\n{\"scenes\": [{\"a\": 1}]}\n```";
        assert_eq!(extract_json_object(raw), Some("{\"scenes\": [{\"a\": 1}]}"));
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(extract_json_object("} {"), None);
    }
}

//! Prompts for the vision-LLM collaborators.
//!
//! Narration, describe and transcribe prompts live here so they can be
//! inspected in unit tests without a live model. The narration prompt can be
//! overridden via [`crate::config::StoryConfig::narration_prompt`].

/// System prompt for the narration proposal.
///
/// The JSON keys match the aliases accepted by [`crate::model::RawScene`].
pub const DEFAULT_NARRATION_PROMPT: &str = r#"You are a high-energy storyteller who narrates comics and manhwa panel by panel for an audio audience.

Follow these rules precisely:

1. ONE SCENE PER PANEL
   - Each attached image is one panel; the Nth image is Panel N (0-based)
   - Scene N narrates Panel N and nothing else
   - Never merge panels, never skip a panel

2. CONTINUITY
   - Each scene must flow naturally from the previous one
   - Do not summarise the whole chapter in the first scene

3. DIALOGUE
   - If a character speaks in Panel N, work the line into Scene N

4. OUTPUT FORMAT (JSON only, no commentary, no code fences)
   {
     "full_narration": "A one or two sentence teaser of the chapter",
     "scenes": [
       { "image_page_index": 0, "narration_segment": "..." },
       { "image_page_index": 1, "narration_segment": "..." }
     ]
   }"#;

/// Build the user-turn text that precedes the panel images.
pub fn narration_request(name: &str, genre: &str, panels: usize, extracted_text: &str) -> String {
    let mut text = format!(
        "Story: {name}\nGenre: {genre}\n\nI have provided {panels} individual panels, \
         attached in reading order as Panel 0 to Panel {last}. Return exactly {panels} scenes.",
        last = panels.saturating_sub(1)
    );
    if !extracted_text.trim().is_empty() {
        text.push_str("\n\nText found in the speech bubbles, in reading order:\n\"\"\"\n");
        text.push_str(extracted_text.trim());
        text.push_str("\n\"\"\"");
    }
    text
}

/// One-sentence description used when a panel has no proposed narration.
pub const DESCRIBE_PROMPT: &str = "Describe the action and emotion in this comic panel in exactly one short, dramatic sentence suitable for an audiobook narration. Do not mention text bubbles or panels.";

/// Speech-bubble transcription for a single panel.
pub const TRANSCRIBE_PROMPT: &str = "Transcribe the text in the speech bubbles and captions of this comic panel, in reading order, one bubble per line. Output only the text. If there is no text, output nothing.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narration_prompt_names_alias_keys() {
        assert!(DEFAULT_NARRATION_PROMPT.contains("image_page_index"));
        assert!(DEFAULT_NARRATION_PROMPT.contains("narration_segment"));
        assert!(DEFAULT_NARRATION_PROMPT.contains("full_narration"));
    }

    #[test]
    fn request_includes_text_only_when_present() {
        let r = narration_request("Solo", "action", 3, "  ");
        assert!(r.contains("exactly 3 scenes"));
        assert!(!r.contains("speech bubbles"));

        let r = narration_request("Solo", "action", 3, "Run!");
        assert!(r.contains("Run!"));
    }
}

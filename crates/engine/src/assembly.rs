//! Final-story assembly helpers.
//!
//! The story text comes from the model; everything else in the final
//! record is derived deterministically from the accumulated elements so
//! the artifact is reproducible given the same session state.

use loom_domain::session::{DepthClass, FinalStory, StoryElements};
use loom_domain::style::StoryStyle;

use loom_vector::Chunk;

/// Whitespace-delimited token count of the trimmed text.
pub fn word_count(text: &str) -> usize {
    text.trim().split_whitespace().count()
}

/// Render retrieved chunks into the prompt's context block.
pub fn format_context(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return "(no local context retrieved)".into();
    }
    chunks
        .iter()
        .map(|c| format!("- {}", c.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Package the generated text into the structured final record.
pub fn build_final_story(
    elements: &StoryElements,
    style: StoryStyle,
    text: String,
    context_chunks: usize,
) -> FinalStory {
    FinalStory {
        word_count: word_count(&text),
        themes: derive_themes(elements),
        tone: derive_tone(elements).to_owned(),
        angle: derive_angle(elements),
        richmond_context_used: context_chunks,
        text,
        style,
    }
}

/// Themes: the selected hook and CTA titles, grounded by the corpus tag.
fn derive_themes(elements: &StoryElements) -> Vec<String> {
    let mut themes = vec!["richmond".to_owned()];
    if let Some(hook) = selected(&elements.hook_candidates, elements.selected_hook_index) {
        themes.push(hook.to_lowercase());
    }
    if let Some(cta) = selected(&elements.cta_candidates, elements.selected_cta_index) {
        themes.push(cta.to_lowercase());
    }
    themes.dedup();
    themes
}

/// Tone follows how much of themselves the writer put in.
fn derive_tone(elements: &StoryElements) -> &'static str {
    match (&elements.personal_anecdote, elements.depth) {
        (Some(_), _) => "personal",
        (None, Some(d)) if d.classification == DepthClass::Sufficient => "reflective",
        _ => "exploratory",
    }
}

/// Angle: the chosen way into the story, i.e. the selected hook title.
fn derive_angle(elements: &StoryElements) -> String {
    selected(&elements.hook_candidates, elements.selected_hook_index)
        .map(|t| t.to_lowercase())
        .unwrap_or_else(|| "direct".to_owned())
}

fn selected(
    candidates: &[loom_domain::session::Candidate],
    index: Option<usize>,
) -> Option<String> {
    index
        .and_then(|i| candidates.get(i))
        .map(|c| c.title.clone())
}

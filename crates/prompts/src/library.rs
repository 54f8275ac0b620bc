//! Data-driven prompt library.
//!
//! Templates are data, not code: a builtin TOML set is compiled in, and a
//! deployment may override any entry from a file without touching the
//! engine. Rendering is pure string assembly; a missing declared variable
//! is a hard error so drift between engine and templates surfaces loudly.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use loom_domain::error::{Error, Result};

/// The builtin template set, embedded at compile time.
const BUILTIN: &str = include_str!("builtin.toml");

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keys and shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every prompt the engine can ask for. One key per conversation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKey {
    DepthAnalysis,
    FollowUpQuestion,
    PersonalAnecdote,
    HookGeneration,
    ArcDevelopment,
    QuoteIntegration,
    CtaGeneration,
    FinalAssembly,
    ErrorRecovery,
}

impl PromptKey {
    pub const ALL: [PromptKey; 9] = [
        PromptKey::DepthAnalysis,
        PromptKey::FollowUpQuestion,
        PromptKey::PersonalAnecdote,
        PromptKey::HookGeneration,
        PromptKey::ArcDevelopment,
        PromptKey::QuoteIntegration,
        PromptKey::CtaGeneration,
        PromptKey::FinalAssembly,
        PromptKey::ErrorRecovery,
    ];

    /// The TOML table name for this key.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKey::DepthAnalysis => "depth_analysis",
            PromptKey::FollowUpQuestion => "follow_up_question",
            PromptKey::PersonalAnecdote => "personal_anecdote",
            PromptKey::HookGeneration => "hook_generation",
            PromptKey::ArcDevelopment => "arc_development",
            PromptKey::QuoteIntegration => "quote_integration",
            PromptKey::CtaGeneration => "cta_generation",
            PromptKey::FinalAssembly => "final_assembly",
            PromptKey::ErrorRecovery => "error_recovery",
        }
    }
}

impl std::fmt::Display for PromptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine expects to parse out of the completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OutputShape {
    #[serde(rename = "free_text")]
    FreeText,
    #[serde(rename = "list_of_3")]
    ListOf3,
}

/// One template: text plus its declared contract.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub template: String,
    /// Variables the template expects; rendering fails if one is missing.
    pub variables: Vec<String>,
    pub output: OutputShape,
}

impl Template {
    /// Substitute `{{name}}` placeholders. Every declared variable must be
    /// provided; extra provided variables are ignored.
    pub fn render(&self, vars: &HashMap<&str, String>) -> Result<String> {
        let mut out = self.template.clone();
        for name in &self.variables {
            let value = vars.get(name.as_str()).ok_or_else(|| {
                Error::Config(format!("prompt variable {{{{{name}}}}} was not provided"))
            })?;
            out = out.replace(&format!("{{{{{name}}}}}"), value);
        }
        Ok(out.trim().to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Library
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read-only registry of templates, loaded once at startup and shared by
/// reference with the engine.
pub struct PromptLibrary {
    templates: HashMap<&'static str, Template>,
}

impl PromptLibrary {
    /// The compiled-in template set.
    pub fn builtin() -> Self {
        // The builtin set ships with the binary; a parse failure here is a
        // build defect, caught by the tests below.
        Self::from_toml_str(BUILTIN).expect("builtin template set must parse")
    }

    /// Builtin set with entries overridden from a TOML file.
    pub fn with_overrides(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let overrides = parse_toml(&raw)?;
        let mut lib = Self::builtin();
        let mut replaced = 0usize;
        for (key, template) in overrides {
            lib.templates.insert(key, template);
            replaced += 1;
        }
        tracing::info!(path = %path.display(), replaced, "prompt template overrides loaded");
        Ok(lib)
    }

    fn from_toml_str(raw: &str) -> Result<Self> {
        let templates = parse_toml(raw)?;
        let lib = Self { templates };
        for key in PromptKey::ALL {
            if !lib.templates.contains_key(key.as_str()) {
                return Err(Error::Config(format!(
                    "template set is missing required key {key}"
                )));
            }
        }
        Ok(lib)
    }

    pub fn get(&self, key: PromptKey) -> &Template {
        // Presence of every key is checked at load time.
        &self.templates[key.as_str()]
    }

    /// Render the template for `key` with the given variables.
    pub fn render(&self, key: PromptKey, vars: &HashMap<&str, String>) -> Result<String> {
        self.get(key).render(vars)
    }
}

fn parse_toml(raw: &str) -> Result<HashMap<&'static str, Template>> {
    let table: HashMap<String, Template> =
        toml::from_str(raw).map_err(|e| Error::Config(format!("template TOML: {e}")))?;

    let mut out = HashMap::new();
    for (name, template) in table {
        let key = PromptKey::ALL
            .iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| Error::Config(format!("unknown template key \"{name}\"")))?;
        out.insert(key.as_str(), template);
    }
    Ok(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars<'a>(pairs: &[(&'a str, &str)]) -> HashMap<&'a str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn builtin_set_has_every_required_key() {
        let lib = PromptLibrary::builtin();
        for key in PromptKey::ALL {
            let t = lib.get(key);
            assert!(!t.template.is_empty(), "{key} template is empty");
        }
    }

    #[test]
    fn generation_templates_declare_list_output() {
        let lib = PromptLibrary::builtin();
        assert_eq!(lib.get(PromptKey::HookGeneration).output, OutputShape::ListOf3);
        assert_eq!(lib.get(PromptKey::CtaGeneration).output, OutputShape::ListOf3);
        assert_eq!(lib.get(PromptKey::DepthAnalysis).output, OutputShape::FreeText);
    }

    #[test]
    fn render_substitutes_all_declared_variables() {
        let lib = PromptLibrary::builtin();
        let rendered = lib
            .render(
                PromptKey::DepthAnalysis,
                &vars(&[("core_idea", "the James River at dawn")]),
            )
            .unwrap();
        assert!(rendered.contains("the James River at dawn"));
        assert!(!rendered.contains("{{core_idea}}"));
    }

    #[test]
    fn render_fails_on_missing_variable() {
        let lib = PromptLibrary::builtin();
        let err = lib.render(PromptKey::HookGeneration, &vars(&[])).unwrap_err();
        assert!(err.to_string().contains("enriched_core"));
    }

    #[test]
    fn depth_rubric_lives_in_the_prompt() {
        // The scoring rubric is documented in the template, not in the
        // parser; renaming the cutoff must not require code changes.
        let lib = PromptLibrary::builtin();
        let t = lib.get(PromptKey::DepthAnalysis);
        assert!(t.template.contains("SCORE:"));
        assert!(t.template.contains("CLASSIFICATION:"));
        assert!(t.template.contains("0 to 5"));
    }

    #[test]
    fn overrides_replace_only_named_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [follow_up_question]
            variables = ["core_idea"]
            output = "free_text"
            template = "Custom question about {{{{core_idea}}}}?"
            "#
        )
        .unwrap();

        let lib = PromptLibrary::with_overrides(file.path()).unwrap();
        let rendered = lib
            .render(PromptKey::FollowUpQuestion, &vars(&[("core_idea", "x")]))
            .unwrap();
        assert_eq!(rendered, "Custom question about x?");

        // Untouched keys still render from the builtin set.
        let depth = lib
            .render(PromptKey::DepthAnalysis, &vars(&[("core_idea", "x")]))
            .unwrap();
        assert!(depth.contains("SCORE:"));
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [grand_finale]
            variables = []
            output = "free_text"
            template = "x"
            "#
        )
        .unwrap();
        assert!(PromptLibrary::with_overrides(file.path()).is_err());
    }
}

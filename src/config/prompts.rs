//! Prompt templates for tubeqa.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("Invalid regex"));

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub rag: RagPrompts,
    pub topics: TopicPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for answering questions about a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagPrompts {
    pub system: String,
    pub user: String,
}

impl Default for RagPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a helpful assistant that answers questions about a YouTube video based on its transcript.

When answering questions:
1. Use only the information provided in the transcript excerpts
2. If you're not sure about something, say so
3. Include relevant timestamps [MM:SS] when referencing specific parts
4. Keep your answers concise and to the point
5. Use the earlier conversation to resolve follow-up questions
6. If the question can't be answered with the given excerpts, say so"#
                .to_string(),

            user: r#"Here are the relevant parts of the video transcript, in the order they appear:

{{context}}

Question: {{question}}

Please provide a helpful answer based on the transcript above."#
                .to_string(),
        }
    }
}

/// Prompts for naming topic blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicPrompts {
    pub system: String,
    pub user: String,
}

impl Default for TopicPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a seasoned video indexer. You name chapters of a video so learners can jump straight to the parts they care about.

Rules:
- Reply with the chapter title only, nothing else
- At most {{max_words}} words
- A broad noun phrase a learner would skim (e.g. "Vector Embeddings Basics", not "We talk about vectors")
- No quotes, no trailing punctuation, no emoji"#
                .to_string(),

            user: r#"Transcript of one chapter:

{{excerpt}}

Chapter title:"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let rag_path = custom_path.join("rag.toml");
            if rag_path.exists() {
                let content = std::fs::read_to_string(&rag_path)?;
                prompts.rag = toml::from_str(&content)?;
            }

            let topics_path = custom_path.join("topics.toml");
            if topics_path.exists() {
                let content = std::fs::read_to_string(&topics_path)?;
                prompts.topics = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Substitution is a single pass over the template; inserted values are
    /// never rescanned. Unknown placeholders are left as written.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.rag.user.contains("{{context}}"));
        assert!(prompts.rag.user.contains("{{question}}"));
        assert!(prompts.topics.user.contains("{{excerpt}}"));
    }

    #[test]
    fn test_render_with_custom_prefers_call_vars() {
        let mut prompts = Prompts::default();
        prompts
            .variables
            .insert("audience".to_string(), "students".to_string());
        prompts
            .variables
            .insert("question".to_string(), "shadowed".to_string());

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "What is X?".to_string());

        let out = prompts.render_with_custom("{{question}} for {{audience}}", &vars);
        assert_eq!(out, "What is X? for students");
    }

    #[test]
    fn test_render_does_not_expand_inserted_text() {
        let mut vars = HashMap::new();
        vars.insert("context".to_string(), "a talk about {{question}}".to_string());
        vars.insert("question".to_string(), "what is {{context}}?".to_string());

        let template = "C: {{context}}\nQ: {{question}}\n{{unknown}}";
        let expected = "C: a talk about {{question}}\nQ: what is {{context}}?\n{{unknown}}";
        for _ in 0..20 {
            assert_eq!(Prompts::render(template, &vars), expected);
        }
    }

    #[test]
    fn test_custom_dir_overrides_topics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("topics.toml"),
            "system = \"Name it.\"\nuser = \"{{excerpt}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.topics.system, "Name it.");
        assert!(!prompts.rag.system.is_empty());
    }
}

//! Topic titles from a chat model.

use crate::config::Prompts;
use crate::error::{Result, TubeqaError};
use crate::openai::create_client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait for naming a block of transcript.
#[async_trait]
pub trait Titler: Send + Sync {
    /// Produce a short title for a transcript excerpt.
    async fn title(&self, excerpt: &str) -> Result<String>;
}

/// Titler backed by OpenAI chat completions.
pub struct OpenAITitler {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: Prompts,
    max_words: usize,
}

impl OpenAITitler {
    pub fn new(model: &str, prompts: Prompts, max_words: usize) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            prompts,
            max_words,
        })
    }
}

#[async_trait]
impl Titler for OpenAITitler {
    async fn title(&self, excerpt: &str) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("max_words".to_string(), self.max_words.to_string());
        vars.insert("excerpt".to_string(), excerpt.to_string());

        let system = self.prompts.render_with_custom(&self.prompts.topics.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.topics.user, &vars);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| TubeqaError::Provider(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| TubeqaError::Provider(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(32u32)
            .build()
            .map_err(|e| TubeqaError::Provider(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| TubeqaError::Provider(format!("Title generation failed: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TubeqaError::Provider("Empty title response".to_string()))
    }
}

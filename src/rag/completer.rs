//! Grounded answers from OpenAI chat completions.

use super::{ChatTurn, Completer};
use crate::config::{Prompts, RagSettings};
use crate::error::{Result, TubeqaError};
use crate::openai::create_client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Completer backed by the OpenAI chat API.
pub struct OpenAICompleter {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    prompts: Prompts,
}

impl OpenAICompleter {
    pub fn new(settings: &RagSettings, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            prompts,
        })
    }

    fn messages(
        &self,
        context: &str,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let build_err = |e: async_openai::error::OpenAIError| TubeqaError::Provider(e.to_string());

        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.prompts.rag.system.clone())
                .build()
                .map_err(build_err)?
                .into(),
        ];

        for turn in history {
            messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.question.clone())
                    .build()
                    .map_err(build_err)?
                    .into(),
            );
            messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.answer.clone())
                    .build()
                    .map_err(build_err)?
                    .into(),
            );
        }

        let mut vars = HashMap::new();
        vars.insert("context".to_string(), context.to_string());
        vars.insert("question".to_string(), question.to_string());
        let user_prompt = self.prompts.render_with_custom(&self.prompts.rag.user, &vars);

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(build_err)?
                .into(),
        );

        Ok(messages)
    }
}

#[async_trait]
impl Completer for OpenAICompleter {
    #[instrument(skip(self, context, history), fields(history = history.len()))]
    async fn complete(&self, context: &str, question: &str, history: &[ChatTurn]) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.messages(context, question, history)?)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| TubeqaError::Provider(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| TubeqaError::Provider(format!("Failed to generate response: {}", e)))?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TubeqaError::Provider("Empty response from LLM".to_string()))?;

        debug!("Generated answer of {} chars", answer.len());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::{ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent};

    fn last_user_text(messages: &[ChatCompletionRequestMessage]) -> String {
        match messages.last() {
            Some(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(text),
                ..
            })) => text.clone(),
            other => panic!("unexpected last message: {:?}", other),
        }
    }

    #[test]
    fn test_question_placeholders_are_sent_verbatim() {
        let mut prompts = Prompts::default();
        prompts.rag.user = "Context:\n{{context}}\n\nQuestion: {{question}}".to_string();
        let completer = OpenAICompleter::new(&RagSettings::default(), prompts).unwrap();

        let history = vec![ChatTurn::new("earlier", "reply", 1)];
        let messages = completer
            .messages("[00:00 - 00:10] says {{question}}", "what is {{context}}?", &history)
            .unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(
            last_user_text(&messages),
            "Context:\n[00:00 - 00:10] says {{question}}\n\nQuestion: what is {{context}}?"
        );
    }
}

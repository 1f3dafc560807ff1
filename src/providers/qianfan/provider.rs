use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::api;
use crate::chat::{Context, Message, MessageSender};
use crate::providers::{
    BuildError, ChatApiProvider, Generation, GenerationError, GenerationErrorKind,
};

impl From<MessageSender> for api::Role {
    fn from(value: MessageSender) -> Self {
        match value {
            MessageSender::User => api::Role::User,
            MessageSender::Model => api::Role::Assistant,
            MessageSender::System => panic!(
                "MessageSender::System is not a qianfan history role, \
                 set Context::system_instruction instead"
            ),
        }
    }
}

impl From<&Message> for api::ChatMessage {
    fn from(value: &Message) -> Self {
        api::ChatMessage {
            role: value.sender.into(),
            content: value.content.clone(),
        }
    }
}

/// [`ChatApiProvider`] backed by the Baidu Qianfan (ERNIE) chat API.
///
/// The API key and secret key are exchanged for an OAuth access token on
/// the first `generate` call; the token is cached for the lifetime of the
/// provider. No conversation state is retained between calls.
pub struct QianfanProvider {
    api: api::QianfanApi,
    options: api::ChatOptions,
}

impl QianfanProvider {
    /// A provider for `model` with every knob at its default.
    pub fn new(api_key: &str, secret_key: &str, model: &str) -> QianfanProvider {
        // The default endpoint is a known-good URL.
        Self::builder(api_key, secret_key, model)
            .build()
            .unwrap_or_else(|e| panic!("default qianfan configuration was rejected: {e}"))
    }

    pub fn builder(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        model: impl Into<String>,
    ) -> QianfanBuilder {
        QianfanBuilder {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            model: model.into(),
            options: api::ChatOptions::default(),
            timeout: None,
            endpoint: api::QIANFAN_DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Configures a [`QianfanProvider`] before construction.
pub struct QianfanBuilder {
    api_key: String,
    secret_key: String,
    model: String,
    options: api::ChatOptions,
    timeout: Option<Duration>,
    endpoint: String,
}

impl QianfanBuilder {
    pub fn options(mut self, options: api::ChatOptions) -> QianfanBuilder {
        self.options = options;
        self
    }

    /// Overall request timeout. Unset means no client-side limit.
    pub fn timeout(mut self, timeout: Duration) -> QianfanBuilder {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> QianfanBuilder {
        self.endpoint = endpoint.into();
        self
    }

    pub fn build(self) -> Result<QianfanProvider, BuildError> {
        let api = api::QianfanApi::new(
            &self.api_key,
            &self.secret_key,
            &self.model,
            &self.endpoint,
            self.timeout,
        )
        .map_err(|e| BuildError(Box::new(e)))?;

        Ok(QianfanProvider {
            api,
            options: self.options,
        })
    }
}

/// Enforces the decode contract on a response body that already passed the
/// API-level error check: the answer text must be present, and a reported
/// finish reason must be the canonical normal stop.
fn select_answer(
    response: &api::ChatResponse,
    context: &Context,
) -> Result<String, GenerationError> {
    if let Some(finish_reason) = response.finish_reason {
        if finish_reason != api::FinishReason::Normal {
            return Err(GenerationError::from_kind(
                GenerationErrorKind::AbnormalStop,
                context,
            ));
        }
    }

    if response.result.is_empty() {
        return Err(GenerationError::from_kind(
            GenerationErrorKind::EmptyText,
            context,
        ));
    }

    Ok(response.result.clone())
}

#[async_trait]
impl ChatApiProvider for QianfanProvider {
    type Raw = api::ChatResponse;

    async fn generate(
        &self,
        context: &Context,
    ) -> Result<Generation<Self::Raw>, GenerationError> {
        let messages: Vec<api::ChatMessage> =
            context.history.iter().map(|m| m.into()).collect();

        debug!(turns = messages.len(), "requesting qianfan completion");

        let response = self
            .api
            .chat(
                context.system_instruction.as_deref(),
                &messages,
                &self.options,
            )
            .await
            .map_err(|e| {
                GenerationError::from_source(GenerationErrorKind::Transport, context, Box::new(e))
            })?;

        let text = select_answer(&response, context)?;

        Ok(Generation {
            content: Message::new(MessageSender::Model, text),
            raw: response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(result: &str, finish_reason: Option<api::FinishReason>) -> api::ChatResponse {
        api::ChatResponse {
            id: "as-test".to_string(),
            result: result.to_string(),
            is_end: true,
            finish_reason,
            usage: None,
        }
    }

    #[test]
    fn normal_finish_yields_the_answer() {
        let context = Context::builder().user("hi").build();

        let text =
            select_answer(&response("hello", Some(api::FinishReason::Normal)), &context).unwrap();

        assert_eq!(text, "hello");
    }

    #[test]
    fn missing_finish_reason_is_tolerated() {
        let context = Context::new();

        let text = select_answer(&response("hello", None), &context).unwrap();

        assert_eq!(text, "hello");
    }

    #[test]
    fn truncated_answers_are_abnormal() {
        let context = Context::builder().user("hi").build();

        let err = select_answer(
            &response("partial", Some(api::FinishReason::Length)),
            &context,
        )
        .unwrap_err();

        assert_eq!(err.kind(), GenerationErrorKind::AbnormalStop);
        assert_eq!(err.context(), &context);
    }

    #[test]
    fn empty_result_is_empty_text() {
        let context = Context::new();

        let err = select_answer(&response("", None), &context).unwrap_err();

        assert_eq!(err.kind(), GenerationErrorKind::EmptyText);
    }

    #[test]
    fn history_roles_map_onto_wire_roles() {
        assert_eq!(api::Role::from(MessageSender::User), api::Role::User);
        assert_eq!(api::Role::from(MessageSender::Model), api::Role::Assistant);
    }
}

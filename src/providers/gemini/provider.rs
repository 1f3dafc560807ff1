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
            MessageSender::Model => api::Role::Model,
            MessageSender::System => panic!(
                "MessageSender::System is not a gemini history role, \
                 set Context::system_instruction instead"
            ),
        }
    }
}

impl From<&Message> for api::Content {
    fn from(value: &Message) -> Self {
        api::Content {
            role: Some(value.sender.into()),
            parts: vec![api::Part {
                text: value.content.clone(),
            }],
        }
    }
}

/// [`ChatApiProvider`] backed by the Google Gemini `generateContent` API.
///
/// All configuration is fixed at construction: the model name and API key
/// are mandatory, everything else defaults to the backend's behavior. The
/// provider retains no conversation state between calls.
pub struct GeminiProvider {
    api: api::GeminiApi,
    generation_config: Option<api::GenerationConfig>,
    safety_settings: Option<Vec<api::SafetySetting>>,
}

impl GeminiProvider {
    /// A provider for `model` with every knob at its default.
    pub fn new(api_key: &str, model: &str) -> GeminiProvider {
        // The default endpoint is a known-good URL.
        Self::builder(api_key, model)
            .build()
            .unwrap_or_else(|e| panic!("default gemini configuration was rejected: {e}"))
    }

    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> GeminiBuilder {
        GeminiBuilder {
            api_key: api_key.into(),
            model: model.into(),
            generation_config: None,
            safety_settings: None,
            timeout: None,
            api_version: api::GEMINI_DEFAULT_API_VERSION.to_string(),
            endpoint: api::GEMINI_DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Configures a [`GeminiProvider`] before construction.
pub struct GeminiBuilder {
    api_key: String,
    model: String,
    generation_config: Option<api::GenerationConfig>,
    safety_settings: Option<Vec<api::SafetySetting>>,
    timeout: Option<Duration>,
    api_version: String,
    endpoint: String,
}

impl GeminiBuilder {
    pub fn generation_config(mut self, config: api::GenerationConfig) -> GeminiBuilder {
        self.generation_config = Some(config);
        self
    }

    pub fn safety_settings(mut self, settings: Vec<api::SafetySetting>) -> GeminiBuilder {
        self.safety_settings = Some(settings);
        self
    }

    /// Overall request timeout. Unset means no client-side limit.
    pub fn timeout(mut self, timeout: Duration) -> GeminiBuilder {
        self.timeout = Some(timeout);
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> GeminiBuilder {
        self.api_version = api_version.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> GeminiBuilder {
        self.endpoint = endpoint.into();
        self
    }

    pub fn build(self) -> Result<GeminiProvider, BuildError> {
        let api = api::GeminiApi::new(
            &self.api_key,
            &self.model,
            &self.endpoint,
            &self.api_version,
            self.timeout,
        )
        .map_err(|e| BuildError(Box::new(e)))?;

        Ok(GeminiProvider {
            api,
            generation_config: self.generation_config,
            safety_settings: self.safety_settings,
        })
    }
}

/// Selects the one answer of `response`, enforcing the decode contract:
/// at least one candidate, every candidate stopped normally, and the first
/// candidate carries extractable text.
fn select_candidate(
    response: &api::GenerateContentResponse,
    context: &Context,
) -> Result<String, GenerationError> {
    if response.candidates.is_empty() {
        return Err(GenerationError::from_kind(
            GenerationErrorKind::NoCandidates,
            context,
        ));
    }

    if response
        .candidates
        .iter()
        .any(|c| c.finish_reason != api::FinishReason::Stop)
    {
        return Err(GenerationError::from_kind(
            GenerationErrorKind::AbnormalStop,
            context,
        ));
    }

    let text: String = response.candidates[0]
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .map(|part| part.text.as_str())
        .collect();

    if text.is_empty() {
        return Err(GenerationError::from_kind(
            GenerationErrorKind::EmptyText,
            context,
        ));
    }

    Ok(text)
}

#[async_trait]
impl ChatApiProvider for GeminiProvider {
    type Raw = api::GenerateContentResponse;

    async fn generate(
        &self,
        context: &Context,
    ) -> Result<Generation<Self::Raw>, GenerationError> {
        let system_instruction = context.system_instruction.as_ref().map(|text| api::Content {
            role: None,
            parts: vec![api::Part { text: text.clone() }],
        });
        let contents: Vec<api::Content> = context.history.iter().map(|m| m.into()).collect();

        debug!(turns = contents.len(), "requesting gemini completion");

        let response = self
            .api
            .generate_content(
                system_instruction.as_ref(),
                &contents,
                self.generation_config.as_ref(),
                self.safety_settings.as_deref(),
            )
            .await
            .map_err(|e| {
                GenerationError::from_source(GenerationErrorKind::Transport, context, Box::new(e))
            })?;

        let text = select_candidate(&response, context)?;

        Ok(Generation {
            content: Message::new(MessageSender::Model, text),
            raw: response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(text: Option<&str>, finish_reason: api::FinishReason) -> api::Candidate {
        api::Candidate {
            content: text.map(|text| api::Content {
                role: Some(api::Role::Model),
                parts: vec![api::Part {
                    text: text.to_string(),
                }],
            }),
            finish_reason,
        }
    }

    #[test]
    fn selects_the_first_normal_candidate() {
        let context = Context::builder().user("hi").build();
        let response = api::GenerateContentResponse {
            candidates: vec![candidate(Some("hello"), api::FinishReason::Stop)],
        };

        let text = select_candidate(&response, &context).unwrap();

        assert_eq!(text, "hello");
    }

    #[test]
    fn multipart_candidates_concatenate() {
        let context = Context::new();
        let response = api::GenerateContentResponse {
            candidates: vec![api::Candidate {
                content: Some(api::Content {
                    role: Some(api::Role::Model),
                    parts: vec![
                        api::Part {
                            text: "Why did hello ".to_string(),
                        },
                        api::Part {
                            text: "cross the road?".to_string(),
                        },
                    ],
                }),
                finish_reason: api::FinishReason::Stop,
            }],
        };

        let text = select_candidate(&response, &context).unwrap();

        assert_eq!(text, "Why did hello cross the road?");
    }

    #[test]
    fn zero_candidates_is_no_candidates() {
        let context = Context::builder().user("hi").build();
        let response = api::GenerateContentResponse { candidates: vec![] };

        let err = select_candidate(&response, &context).unwrap_err();

        assert_eq!(err.kind(), GenerationErrorKind::NoCandidates);
        assert_eq!(err.context(), &context);
    }

    #[test]
    fn safety_stop_is_abnormal() {
        let context = Context::new();
        let response = api::GenerateContentResponse {
            candidates: vec![candidate(Some("partial"), api::FinishReason::Safety)],
        };

        let err = select_candidate(&response, &context).unwrap_err();

        assert_eq!(err.kind(), GenerationErrorKind::AbnormalStop);
    }

    #[test]
    fn candidate_without_text_is_empty_text() {
        let context = Context::new();
        let response = api::GenerateContentResponse {
            candidates: vec![candidate(None, api::FinishReason::Stop)],
        };

        let err = select_candidate(&response, &context).unwrap_err();

        assert_eq!(err.kind(), GenerationErrorKind::EmptyText);
    }

    #[test]
    fn history_roles_map_onto_wire_roles() {
        assert_eq!(api::Role::from(MessageSender::User), api::Role::User);
        assert_eq!(api::Role::from(MessageSender::Model), api::Role::Model);
    }
}

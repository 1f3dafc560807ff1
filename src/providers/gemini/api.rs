use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::providers::apireq::{ReqwestError, Url};

pub(super) const GEMINI_DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub(super) const GEMINI_DEFAULT_API_VERSION: &str = "v1beta";

#[derive(Debug, Error)]
pub(super) enum Error {
    #[error("invalid gemini endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("failed to construct the gemini http client: {0}")]
    ClientConstruction(reqwest::Error),

    #[error("a request to the gemini api failed: {0}")]
    RequestFailed(#[from] ReqwestError),

    #[error("gemini authentication failed: {0}")]
    Authentication(String),

    #[error("request to the gemini api was rejected: {0}")]
    BadRequest(String),

    #[error("failed to query gemini resource: {0}")]
    NotFound(String),

    #[error("gemini rate limit exceeded or quota crossed: {0}")]
    ExcessUsage(String),

    #[error("gemini encountered an internal error: {0}")]
    InternalError(String),

    #[error("the gemini api returned an unspecified error: {0}")]
    UnspecifiedError(String),
}

/* === IO === */

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One typed fragment of a [`Content`]. Only text parts are produced or
/// consumed by this adapter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub text: String,
}

/// A single turn on the Gemini wire: an optional role plus its parts.
/// The system instruction is sent as a role-less `Content`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

/// Generation knobs forwarded verbatim to the backend. All fields are
/// optional; the backend default applies when a knob is unset.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

/// A per-category safety filter override.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

// Structures to serialize models/{model}:generateContent
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'r> {
    contents: &'r [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'r Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'r GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safety_settings: Option<&'r [SafetySetting]>,
}

// Structures to deserialize models/{model}:generateContent
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    #[serde(other)]
    Other,
}

impl Default for FinishReason {
    fn default() -> Self {
        FinishReason::FinishReasonUnspecified
    }
}

/// One proposed answer within a [`GenerateContentResponse`].
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: FinishReason,
}

/// The raw payload of a Gemini generation, preserved in successful
/// [`Generation`] results.
///
/// [`Generation`]: crate::providers::Generation
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

// Errors
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub(super) struct GeminiApi {
    client: Client,
    endpoint: Url,
    api_version: String,
    model: String,
    api_key: String,
}

impl GeminiApi {
    pub(super) fn new(
        api_key: &str,
        model: &str,
        endpoint: &str,
        api_version: &str,
        timeout: Option<Duration>,
    ) -> Result<GeminiApi, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(GeminiApi {
            client: builder.build().map_err(Error::ClientConstruction)?,
            endpoint: Url::parse(endpoint)?,
            api_version: api_version.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn maybe_parse_api_error(res: Response) -> Result<Response, Error> {
        let status = res.status();

        if status.is_success() {
            return Ok(res);
        }

        let body = res
            .text()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        // Error bodies are documented to carry a google.rpc.Status, but a
        // proxy in front of the API may answer with plain text.
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(message),
            StatusCode::NOT_FOUND => Error::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => Error::ExcessUsage(message),
            code => match code.as_u16() {
                400..=499 => Error::BadRequest(message),
                500..=599 => Error::InternalError(message),
                _ => Error::UnspecifiedError(message),
            },
        })
    }

    pub(super) async fn generate_content(
        &self,
        system_instruction: Option<&Content>,
        contents: &[Content],
        generation_config: Option<&GenerationConfig>,
        safety_settings: Option<&[SafetySetting]>,
    ) -> Result<GenerateContentResponse, Error> {
        let url = self.endpoint.join(&format!(
            "/{}/models/{}:generateContent",
            self.api_version, self.model
        ))?;

        let res = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest {
                contents,
                system_instruction,
                generation_config,
                safety_settings,
            })
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::maybe_parse_api_error(res).await?;

        let response: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Ok(response)
    }
}

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::providers::apireq::{ReqwestError, Url};

pub(super) const QIANFAN_DEFAULT_ENDPOINT: &str = "https://aip.baidubce.com";

const OAUTH_PATH: &str = "/oauth/2.0/token";
const CHAT_PATH_PREFIX: &str = "/rpc/2.0/ai_custom/v1/wenxinworkshop/chat";

#[derive(Debug, Error)]
pub(super) enum Error {
    #[error("invalid qianfan endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("failed to construct the qianfan http client: {0}")]
    ClientConstruction(reqwest::Error),

    #[error("a request to the qianfan api failed: {0}")]
    RequestFailed(#[from] ReqwestError),

    #[error("qianfan oauth token exchange was refused: {0}")]
    Authentication(String),

    #[error("the qianfan api returned an unexpected http status {0}: {1}")]
    UnexpectedStatus(StatusCode, String),

    /// Qianfan reports API-level failures in a 200 body with an
    /// `error_code`/`error_msg` pair.
    #[error("the qianfan api returned error {code}: {message}")]
    Api { code: i64, message: String },
}

/* === IO === */

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(super) enum Role {
    User,
    Assistant,
}

// Structures to serialize chat/{model}
#[derive(Serialize, Debug)]
pub(super) struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Generation knobs forwarded verbatim to the backend. All fields are
/// optional; the backend default applies when a knob is unset.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_score: Option<f64>,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'m> {
    messages: &'m [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'m str>,
    #[serde(flatten)]
    options: &'m ChatOptions,
}

// Structures to deserialize chat/{model}
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The canonical normal stop
    Normal,
    Length,
    ContentFilter,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// The raw payload of a Qianfan chat completion, preserved in successful
/// [`Generation`] results. Qianfan returns a single answer, never a
/// candidate list.
///
/// [`Generation`]: crate::providers::Generation
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub id: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub is_end: bool,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

// Errors
#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    error_msg: String,
}

// API errors arrive with a 200 status, so the body is one of two shapes.
// `ApiError` must be tried first: a success body never carries
// `error_code`, while `ChatResponse` would accept an error body through
// its defaulted fields.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ChatBody {
    Error(ApiError),
    Response(ChatResponse),
}

// Structures to deserialize /oauth/2.0/token
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub(super) struct QianfanApi {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
    secret_key: String,
    // The OAuth token is valid for roughly thirty days, far longer than
    // any provider lives. Fetched once, on first use.
    access_token: OnceCell<String>,
}

impl QianfanApi {
    pub(super) fn new(
        api_key: &str,
        secret_key: &str,
        model: &str,
        endpoint: &str,
        timeout: Option<Duration>,
    ) -> Result<QianfanApi, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(QianfanApi {
            client: builder.build().map_err(Error::ClientConstruction)?,
            endpoint: Url::parse(endpoint)?,
            model: model.to_string(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            access_token: OnceCell::new(),
        })
    }

    async fn fetch_access_token(&self) -> Result<String, Error> {
        let mut url = self.endpoint.join(OAUTH_PATH)?;
        url.query_pairs_mut()
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.api_key)
            .append_pair("client_secret", &self.secret_key);

        let res = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let token: TokenResponse = res
            .json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        match token.access_token {
            Some(access_token) => Ok(access_token),
            None => Err(Error::Authentication(
                token
                    .error_description
                    .or(token.error)
                    .unwrap_or_else(|| "no access token in oauth response".to_string()),
            )),
        }
    }

    async fn access_token(&self) -> Result<&str, Error> {
        self.access_token
            .get_or_try_init(|| self.fetch_access_token())
            .await
            .map(String::as_str)
    }

    pub(super) async fn chat(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, Error> {
        let access_token = self.access_token().await?;

        let mut url = self
            .endpoint
            .join(&format!("{}/{}", CHAT_PATH_PREFIX, self.model))?;
        url.query_pairs_mut()
            .append_pair("access_token", access_token);

        let res = self
            .client
            .post(url)
            .json(&ChatRequest {
                messages,
                system,
                options,
            })
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::maybe_parse_http_error(res).await?;

        let body: ChatBody = res
            .json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        match body {
            ChatBody::Error(e) => Err(Error::Api {
                code: e.error_code,
                message: e.error_msg,
            }),
            ChatBody::Response(response) => Ok(response),
        }
    }

    async fn maybe_parse_http_error(res: Response) -> Result<Response, Error> {
        let status = res.status();

        if status.is_success() {
            return Ok(res);
        }

        let body = res
            .text()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Err(Error::UnexpectedStatus(status, body))
    }
}

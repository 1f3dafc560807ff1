//! Traits and type definitions for one-shot chat completions against vendor APIs.
//!
//! The interface consumed by the rest of the crate is the [`ChatApiProvider`]
//! trait: a single `generate` operation that turns a fully-formed
//! [`Context`] into one decoded answer. Each vendor adapter (Google Gemini,
//! Baidu Qianfan) implements the trait as a peer; the adapters share nothing
//! beyond the `apireq` request helpers.
//!
//! ## Statelessness
//!
//! Providers retain no conversation state between calls: `generate` is a
//! function of the context it is handed plus configuration fixed at
//! construction time (model name, credentials, generation knobs, timeout,
//! endpoint overrides). The passed context is never mutated.
//!
//! ## Error Handling
//!
//! Each vendor API has its own bespoke error surface. These are encapsulated
//! per adapter in a private `api::Error` type; every failure a caller can see
//! is a [`GenerationError`], whose [`GenerationErrorKind`] distinguishes the
//! decode-level failures (no candidates, abnormal stop, no extractable text)
//! from transport-level ones. Every error carries the offending context for
//! diagnosis, and nothing is retried here: retry policy, if any, belongs to
//! a caller or a decorator.

mod apireq;

pub mod gemini;
pub mod qianfan;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;

use crate::chat::{Context, Message};

pub use gemini::GeminiProvider;
pub use qianfan::QianfanProvider;

/// This is a list specifying the general categories of generation
/// failure a [`ChatApiProvider`] can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The backend answered but proposed zero candidates.
    NoCandidates,
    /// The backend stopped generating for a non-normal reason, such as
    /// a safety filter, a length cap, or recitation detection.
    AbnormalStop,
    /// The backend produced a candidate with no extractable text.
    EmptyText,
    /// The underlying vendor call failed at the transport, protocol, or
    /// authentication level before a candidate could be decoded.
    Transport,
}

/// A failed generation, wrapped with the context that triggered it.
#[derive(Debug)]
pub struct GenerationError {
    kind: GenerationErrorKind,
    context: Box<Context>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl GenerationError {
    pub fn from_kind(kind: GenerationErrorKind, context: &Context) -> GenerationError {
        GenerationError {
            kind,
            context: Box::new(context.clone()),
            source: None,
        }
    }

    pub fn from_source(
        kind: GenerationErrorKind,
        context: &Context,
        source: Box<dyn StdError + Send + Sync>,
    ) -> GenerationError {
        GenerationError {
            kind,
            context: Box::new(context.clone()),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> GenerationErrorKind {
        self.kind
    }

    /// The context the failing `generate` call was made with.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Replaces the attached context. Used by models that prefer to report
    /// their own durable context over a discarded scratch copy.
    pub(crate) fn with_context(mut self, context: &Context) -> GenerationError {
        self.context = Box::new(context.clone());
        self
    }

    fn message(&self) -> &'static str {
        match self.kind {
            GenerationErrorKind::NoCandidates => "the backend returned no candidates",
            GenerationErrorKind::AbnormalStop => {
                "the backend stopped generating for a non-normal reason"
            }
            GenerationErrorKind::EmptyText => "the backend candidate contained no text",
            GenerationErrorKind::Transport => "the request to the backend failed",
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl StdError for GenerationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

/// An error constructing a provider, before any request is made. Distinct
/// from [`GenerationError`] since there is no context to attach yet.
#[derive(Debug, thiserror::Error)]
#[error("failed to construct provider: {0}")]
pub struct BuildError(#[source] pub(crate) Box<dyn StdError + Send + Sync>);

/// A successful generation: the decoded answer plus the raw vendor payload,
/// preserved for diagnostics and auditing.
#[derive(Debug, Clone)]
pub struct Generation<R> {
    /// The selected candidate, decoded as a [`MessageSender::Model`] message
    ///
    /// [`MessageSender::Model`]: crate::chat::MessageSender::Model
    pub content: Message,
    /// The vendor response the candidate was decoded from
    pub raw: R,
}

/// A trait implemented by all chat API providers.
#[async_trait]
pub trait ChatApiProvider {
    /// The raw vendor payload preserved in a successful [`Generation`].
    type Raw;

    /// Performs one round-trip to the backend with the given context and
    /// decodes exactly one candidate answer.
    ///
    /// The context must already contain the latest unanswered user turn;
    /// it is not mutated. Success preserves the raw vendor payload next to
    /// the decoded text. Failures carry the offending context and a
    /// [`GenerationErrorKind`]; no failure is retried here.
    async fn generate(&self, context: &Context)
        -> Result<Generation<Self::Raw>, GenerationError>;
}

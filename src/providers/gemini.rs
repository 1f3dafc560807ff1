//! Google Gemini adapter for the [`ChatApiProvider`] contract
//!
//! [`ChatApiProvider`]: crate::providers::ChatApiProvider

mod api;
mod provider;

pub use api::{
    Candidate, Content, FinishReason, GenerateContentResponse, GenerationConfig,
    HarmBlockThreshold, HarmCategory, Part, Role, SafetySetting,
};
pub use provider::{GeminiBuilder, GeminiProvider};

//! Baidu Qianfan (ERNIE) adapter for the [`ChatApiProvider`] contract
//!
//! [`ChatApiProvider`]: crate::providers::ChatApiProvider

mod api;
mod provider;

pub use api::{ChatOptions, ChatResponse, FinishReason, TokenUsage};
pub use provider::{QianfanBuilder, QianfanProvider};

//! A thin orchestration library for chatting with LLM backends.
//!
//! The crate is organized in three layers:
//!
//! - [`chat`] defines the conversation primitives: [`Message`], its
//!   [`MessageSender`] role, and the [`Context`] aggregate holding a system
//!   instruction and the ordered message history.
//! - [`providers`] defines the [`ChatApiProvider`] capability, one stateless
//!   round-trip from a `Context` to a decoded answer, together with the
//!   Google Gemini and Baidu Qianfan adapters implementing it.
//! - [`models`] defines the [`ChatModel`] capability, a stateful orchestrator
//!   owning a `Context` across turns, with a plain single-call model and the
//!   two-call metaprompt model.
//!
//! Providers never retain conversation state and never mutate the context
//! they are handed; models own exactly one context apiece and mutate it only
//! after a whole exchange has succeeded.

pub mod chat;
pub mod models;
pub mod providers;

pub use chat::{Context, ContextBuilder, Message, MessageSender};
pub use models::{ChatError, ChatModel, ChatStage, MetapromptChatModel, SimpleChatModel};
pub use providers::{
    BuildError, ChatApiProvider, Generation, GenerationError, GenerationErrorKind,
};

//! Stateful chat models built on top of the provider capability.
//!
//! A [`ChatModel`] owns exactly one [`Context`] for its lifetime and mutates
//! it in place across successive [`chat`] calls. The `&mut self` receiver
//! encodes the single-writer discipline: at most one chat is in flight per
//! model instance, and distinct instances share nothing.
//!
//! Both models in this module guarantee all-or-nothing commits: the owned
//! history is extended only after an entire exchange has succeeded, so a
//! failing (or cancelled) call never leaves orphaned prompts or answers in
//! the conversation log.
//!
//! [`chat`]: ChatModel::chat

mod metaprompt;
mod simple;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use strum_macros;

use crate::chat::{Context, Message};
use crate::providers::GenerationError;

pub use metaprompt::MetapromptChatModel;
pub use simple::SimpleChatModel;

/// The sub-call of a model's turn that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChatStage {
    /// The metaprompt refinement call, asking the backend for a better prompt
    Refine,
    /// The answering call made with the refined prompt
    Final,
    /// The single call of a plain one-exchange model
    Exchange,
}

/// A provider failure propagated out of a [`ChatModel`], tagged with the
/// stage that produced it. The owned context was not modified.
#[derive(Debug)]
pub struct ChatError {
    stage: ChatStage,
    error: GenerationError,
}

impl ChatError {
    pub(crate) fn new(stage: ChatStage, error: GenerationError) -> ChatError {
        ChatError { stage, error }
    }

    pub fn stage(&self) -> ChatStage {
        self.stage
    }

    pub fn error(&self) -> &GenerationError {
        &self.error
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat failed during the {} stage", self.stage)
    }
}

impl StdError for ChatError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

/// A trait implemented by all chat models.
#[async_trait]
pub trait ChatModel {
    /// Runs one exchange: takes the incoming user message, produces the
    /// model's reply, and commits both to the owned context in that order.
    ///
    /// On failure the owned context is left unchanged and the returned
    /// [`ChatError`] identifies which stage failed.
    async fn chat(&mut self, message: Message) -> Result<Message, ChatError>;

    /// Read access to the owned conversation context, for display or
    /// persistence by the caller.
    fn context(&self) -> &Context;
}

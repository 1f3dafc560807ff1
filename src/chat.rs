//! Type definitions for chat primitives
//!

use strum_macros;

/// The author of a `Message`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum MessageSender {
    /// A `System` message is an authoritative instruction to the model.
    /// In this crate it lives in [`Context::system_instruction`] rather
    /// than in the history; adapters reject it as a history role.
    System,

    /// A message authored by the user
    User,

    /// A message authored by the model
    Model,
}

/// A `Message` in a chat conversation. Messages are values: once
/// constructed they are never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The author of the message
    pub sender: MessageSender,
    /// The contents of the message
    pub content: String,
}

impl Message {
    pub fn new(sender: MessageSender, content: impl Into<String>) -> Message {
        Message {
            sender,
            content: content.into(),
        }
    }
}

/// The conversation state passed to a provider or owned by a model.
///
/// `history` is an append-only log: within this crate entries are only ever
/// pushed to the end, never removed or rewritten, so its order is the
/// conversation order. `Clone` produces a structurally independent history
/// (the messages themselves are immutable and may be shared), which is what
/// lets a model branch a scratch copy without aliasing its own state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// An out-of-band instruction to the model, sent ahead of the history
    pub system_instruction: Option<String>,
    /// The ordered conversation history
    pub history: Vec<Message>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder {
            context: Context::new(),
        }
    }

    /// Appends a message to the history.
    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Returns an independent copy of this context with `message` appended.
    /// Mutating the copy is never visible through `self` and vice versa.
    pub fn branch(&self, message: Message) -> Context {
        let mut branched = self.clone();
        branched.history.push(message);
        branched
    }
}

/// Builds a [`Context`] turn by turn.
///
/// ```
/// use chatlink::{Context, MessageSender};
///
/// let context = Context::builder()
///     .system_instruction("You are terse.")
///     .user("What is the capital of France?")
///     .model("Paris.")
///     .build();
///
/// assert_eq!(context.history.len(), 2);
/// assert_eq!(context.history[0].sender, MessageSender::User);
/// ```
#[derive(Debug, Default)]
pub struct ContextBuilder {
    context: Context,
}

impl ContextBuilder {
    pub fn system_instruction(mut self, text: impl Into<String>) -> ContextBuilder {
        self.context.system_instruction = Some(text.into());
        self
    }

    /// Appends a user turn to the history.
    pub fn user(mut self, text: impl Into<String>) -> ContextBuilder {
        self.context.push(Message::new(MessageSender::User, text));
        self
    }

    /// Appends a model turn to the history.
    pub fn model(mut self, text: impl Into<String>) -> ContextBuilder {
        self.context.push(Message::new(MessageSender::Model, text));
        self
    }

    /// Appends an arbitrary prebuilt message to the history.
    pub fn message(mut self, message: Message) -> ContextBuilder {
        self.context.push(message);
        self
    }

    pub fn build(self) -> Context {
        self.context
    }
}

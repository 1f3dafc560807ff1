use async_trait::async_trait;
use tracing::debug;

use crate::chat::{Context, Message};
use crate::models::{ChatError, ChatModel, ChatStage};
use crate::providers::ChatApiProvider;

/// The plain [`ChatModel`]: one provider call per exchange.
///
/// `chat` sends the owned history plus the incoming message, and commits
/// `[message, answer]` to the owned context only once the call has
/// succeeded. On failure the owned context is unchanged.
pub struct SimpleChatModel<P> {
    context: Context,
    provider: P,
}

impl<P> SimpleChatModel<P> {
    pub fn new(provider: P) -> SimpleChatModel<P> {
        Self::with_context(provider, Context::new())
    }

    /// Resumes a conversation from an existing context.
    pub fn with_context(provider: P, context: Context) -> SimpleChatModel<P> {
        SimpleChatModel { context, provider }
    }
}

#[async_trait]
impl<P> ChatModel for SimpleChatModel<P>
where
    P: ChatApiProvider + Send + Sync,
    P::Raw: Send,
{
    async fn chat(&mut self, message: Message) -> Result<Message, ChatError> {
        // The provider sees an independent branch; the owned context is
        // only touched once the call has succeeded.
        let attempt = self.context.branch(message.clone());

        debug!(stage = %ChatStage::Exchange, "requesting completion");
        let generation = self
            .provider
            .generate(&attempt)
            .await
            .map_err(|e| ChatError::new(ChatStage::Exchange, e))?;

        let answer = generation.content;
        self.context.push(message);
        self.context.push(answer.clone());

        Ok(answer)
    }

    fn context(&self) -> &Context {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageSender;
    use crate::models::tests::ScriptedProvider;
    use crate::providers::GenerationErrorKind;

    #[tokio::test]
    async fn a_successful_exchange_appends_two_turns() {
        let provider = ScriptedProvider::replying(["hello there"]);
        let mut model = SimpleChatModel::new(provider);

        let answer = model
            .chat(Message::new(MessageSender::User, "hi"))
            .await
            .unwrap();

        assert_eq!(answer, Message::new(MessageSender::Model, "hello there"));
        assert_eq!(
            model.context().history,
            vec![
                Message::new(MessageSender::User, "hi"),
                Message::new(MessageSender::Model, "hello there"),
            ]
        );
    }

    #[tokio::test]
    async fn the_provider_sees_the_history_plus_the_new_turn() {
        let provider = ScriptedProvider::replying(["sure"]);
        let context = Context::builder()
            .system_instruction("be brief")
            .user("hi")
            .model("hello")
            .build();
        let mut model = SimpleChatModel::with_context(provider, context);

        model
            .chat(Message::new(MessageSender::User, "thanks"))
            .await
            .unwrap();

        let calls = model.provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system_instruction.as_deref(), Some("be brief"));
        assert_eq!(calls[0].history.len(), 3);
        assert_eq!(calls[0].history[2].content, "thanks");
    }

    #[tokio::test]
    async fn a_failed_exchange_leaves_the_context_unchanged() {
        let provider = ScriptedProvider::failing([GenerationErrorKind::NoCandidates]);
        let context = Context::builder().user("hi").model("hello").build();
        let mut model = SimpleChatModel::with_context(provider, context.clone());

        let err = model
            .chat(Message::new(MessageSender::User, "thanks"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), ChatStage::Exchange);
        assert_eq!(err.error().kind(), GenerationErrorKind::NoCandidates);
        assert_eq!(model.context(), &context);
    }
}

use async_trait::async_trait;
use tracing::debug;

use crate::chat::{Context, Message, MessageSender};
use crate::models::{ChatError, ChatModel, ChatStage};
use crate::providers::ChatApiProvider;

/// A [`ChatModel`] that asks the backend to engineer its own prompt before
/// answering.
///
/// Each `chat` runs two sequential provider calls. The first is
/// prompt-engineering: the incoming message is rewritten locally by
/// `metaprompt_transform` and sent against a scratch context (same system
/// instruction as the owned context, history replaced by that single
/// synthetic user turn) so that none of the engineering artifacts can leak
/// into the durable conversation log. The backend's reply is the refined
/// prompt. The second call sends the owned history plus the refined prompt
/// and produces the final answer, the only reply that is
/// conversation-worthy.
///
/// Commit discipline: the owned context gains `[original message, answer]`
/// only after both calls have succeeded. Any failure, including
/// cancellation between the two awaits, leaves the owned context exactly
/// as it was, and the returned [`ChatError`] names the stage that failed.
/// A failure in the final call reports the owned context in its error
/// detail rather than the discarded working copy.
pub struct MetapromptChatModel<P, F> {
    context: Context,
    provider: P,
    metaprompt_transform: F,
}

impl<P, F> MetapromptChatModel<P, F>
where
    F: Fn(&str) -> String,
{
    /// A model starting from an empty conversation.
    ///
    /// `metaprompt_transform` is a local, synchronous rewrite of the user's
    /// text into the prompt-engineering request, e.g. wrapping it in an
    /// instruction template. It is invoked exactly once per `chat`.
    pub fn new(provider: P, metaprompt_transform: F) -> MetapromptChatModel<P, F> {
        Self::with_context(provider, metaprompt_transform, Context::new())
    }

    /// Resumes a conversation from an existing context.
    pub fn with_context(
        provider: P,
        metaprompt_transform: F,
        context: Context,
    ) -> MetapromptChatModel<P, F> {
        MetapromptChatModel {
            context,
            provider,
            metaprompt_transform,
        }
    }
}

#[async_trait]
impl<P, F> ChatModel for MetapromptChatModel<P, F>
where
    P: ChatApiProvider + Send + Sync,
    P::Raw: Send,
    F: Fn(&str) -> String + Send + Sync,
{
    async fn chat(&mut self, message: Message) -> Result<Message, ChatError> {
        let metaprompt = (self.metaprompt_transform)(&message.content);

        // The refine call runs against a scratch context so the owned
        // history never sees the metaprompt.
        let scratch = Context {
            system_instruction: self.context.system_instruction.clone(),
            history: vec![Message::new(MessageSender::User, metaprompt)],
        };

        debug!(stage = %ChatStage::Refine, "requesting refined prompt");
        let refined_prompt = self
            .provider
            .generate(&scratch)
            .await
            .map_err(|e| ChatError::new(ChatStage::Refine, e))?
            .content
            .content;

        // The answering call runs against an independent branch of the
        // owned context carrying the refined prompt, not the original
        // message.
        let attempt = self
            .context
            .branch(Message::new(MessageSender::User, refined_prompt));

        debug!(stage = %ChatStage::Final, "requesting final answer");
        let generation = self.provider.generate(&attempt).await.map_err(|e| {
            // Report the durable context, not the discarded branch.
            ChatError::new(ChatStage::Final, e.with_context(&self.context))
        })?;

        // Both calls succeeded: commit the original user message and the
        // final answer, in that order.
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::tests::ScriptedProvider;
    use crate::providers::GenerationErrorKind;

    fn expand(text: &str) -> String {
        format!("Expand: {}", text)
    }

    #[tokio::test]
    async fn the_two_call_flow_end_to_end() {
        let provider = ScriptedProvider::replying([
            "Tell me a joke about hello",
            "Why did hello cross the road?",
        ]);
        let mut model = MetapromptChatModel::new(provider, expand);

        let answer = model
            .chat(Message::new(MessageSender::User, "hello"))
            .await
            .unwrap();

        assert_eq!(
            answer,
            Message::new(MessageSender::Model, "Why did hello cross the road?")
        );

        // The first call carried only the synthetic metaprompt turn, the
        // second only the refined prompt.
        let calls = model.provider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].history,
            vec![Message::new(MessageSender::User, "Expand: hello")]
        );
        assert_eq!(
            calls[1].history,
            vec![Message::new(MessageSender::User, "Tell me a joke about hello")]
        );

        // Neither intermediate prompt appears in the committed history.
        assert_eq!(
            model.context().history,
            vec![
                Message::new(MessageSender::User, "hello"),
                Message::new(MessageSender::Model, "Why did hello cross the road?"),
            ]
        );
    }

    #[tokio::test]
    async fn every_exchange_appends_exactly_two_turns() {
        let provider = ScriptedProvider::replying(["r1", "a1", "r2", "a2"]);
        let mut model = MetapromptChatModel::new(provider, expand);

        model
            .chat(Message::new(MessageSender::User, "first"))
            .await
            .unwrap();
        model
            .chat(Message::new(MessageSender::User, "second"))
            .await
            .unwrap();

        let turns: Vec<(MessageSender, &str)> = model
            .context()
            .history
            .iter()
            .map(|m| (m.sender, m.content.as_str()))
            .collect();

        assert_eq!(
            turns,
            vec![
                (MessageSender::User, "first"),
                (MessageSender::Model, "a1"),
                (MessageSender::User, "second"),
                (MessageSender::Model, "a2"),
            ]
        );
    }

    #[tokio::test]
    async fn the_scratch_context_inherits_the_system_instruction() {
        let provider = ScriptedProvider::replying(["refined", "answer"]);
        let context = Context::builder()
            .system_instruction("be brief")
            .user("hi")
            .model("hello")
            .build();
        let mut model = MetapromptChatModel::with_context(provider, expand, context);

        model
            .chat(Message::new(MessageSender::User, "next"))
            .await
            .unwrap();

        let calls = model.provider.calls();
        // Scratch: inherited instruction, single synthetic turn, none of
        // the owned history.
        assert_eq!(calls[0].system_instruction.as_deref(), Some("be brief"));
        assert_eq!(calls[0].history.len(), 1);
        // Final: full owned history plus the refined prompt.
        assert_eq!(calls[1].history.len(), 3);
        assert_eq!(calls[1].history[2].content, "refined");
    }

    #[tokio::test]
    async fn a_refine_failure_commits_nothing() {
        let provider = ScriptedProvider::failing([GenerationErrorKind::AbnormalStop]);
        let context = Context::builder().user("hi").model("hello").build();
        let mut model = MetapromptChatModel::with_context(provider, expand, context.clone());

        let err = model
            .chat(Message::new(MessageSender::User, "next"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), ChatStage::Refine);
        assert_eq!(err.error().kind(), GenerationErrorKind::AbnormalStop);
        assert_eq!(model.context(), &context);
    }

    #[tokio::test]
    async fn a_final_failure_commits_nothing() {
        let provider = ScriptedProvider::new([
            Ok("refined".to_string()),
            Err(GenerationErrorKind::NoCandidates),
        ]);
        let context = Context::builder().user("hi").model("hello").build();
        let mut model = MetapromptChatModel::with_context(provider, expand, context.clone());

        let err = model
            .chat(Message::new(MessageSender::User, "next"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), ChatStage::Final);
        assert_eq!(model.context(), &context);
        // The error detail reports the owned context, not the working copy
        // that carried the refined prompt.
        assert_eq!(err.error().context(), &context);
    }

    #[tokio::test]
    async fn the_transform_runs_exactly_once_per_chat() {
        let provider = ScriptedProvider::replying(["refined", "answer"]);
        let invocations = AtomicUsize::new(0);
        let mut model = MetapromptChatModel::new(provider, |text: &str| {
            invocations.fetch_add(1, Ordering::SeqCst);
            format!("Expand: {}", text)
        });

        model
            .chat(Message::new(MessageSender::User, "hello"))
            .await
            .unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}

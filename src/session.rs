use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::model::{CompletionOptions, Message, Role};
use crate::providers::Provider;

/// Ordered chat history with an optional size bound.
///
/// A `max_history` of zero means unbounded. Otherwise the history is cut
/// back to at most `max_history` messages after each completed exchange,
/// dropping the oldest messages first but never a leading system message.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    system_prompt: Option<String>,
    max_history: usize,
}

impl Conversation {
    pub fn new(system_prompt: Option<String>, max_history: usize) -> Self {
        let system_prompt = system_prompt.filter(|prompt| !prompt.trim().is_empty());
        let mut conversation = Self {
            messages: Vec::new(),
            system_prompt,
            max_history,
        };
        conversation.clear();
        conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Resets to the configured system prompt, if any.
    pub fn clear(&mut self) {
        self.messages.clear();
        if let Some(prompt) = &self.system_prompt {
            self.messages.push(Message::system(prompt.clone()));
        }
    }

    pub fn trim(&mut self) {
        if self.max_history == 0 || self.messages.len() <= self.max_history {
            return;
        }

        let pinned = usize::from(
            self.messages
                .first()
                .is_some_and(|msg| msg.role == Role::System),
        );
        let keep_tail = self.max_history.saturating_sub(pinned);
        let drop_end = self.messages.len() - keep_tail;
        self.messages.drain(pinned..drop_end);
    }

    fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }
}

/// Drives one request/response exchange per user turn against a provider.
pub struct Session<'a> {
    provider: &'a dyn Provider,
    options: CompletionOptions,
    conversation: Conversation,
}

impl<'a> Session<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        options: CompletionOptions,
        conversation: Conversation,
    ) -> Self {
        Self {
            provider,
            options,
            conversation,
        }
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider
    }

    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
    }

    /// Sends `input` with the full history, streaming deltas to `on_delta`.
    ///
    /// On success the user turn and the assembled reply are kept and the
    /// history is trimmed. On failure the history is left as it was before
    /// the call.
    pub async fn send(
        &mut self,
        input: &str,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<String, ProviderError> {
        let checkpoint = self.conversation.len();
        self.conversation.push(Message::user(input));

        let mut reply = String::new();
        let result = self
            .provider
            .stream_completion(
                self.conversation.messages(),
                &self.options,
                &mut |delta: &str| {
                    reply.push_str(delta);
                    on_delta(delta);
                },
            )
            .await;

        if let Err(err) = result {
            warn!(
                provider = self.provider.name(),
                model = %self.options.model,
                error = %err,
                "exchange failed; history left unchanged"
            );
            self.conversation.truncate(checkpoint);
            return Err(err);
        }

        self.conversation.push(Message::assistant(reply.clone()));
        self.conversation.trim();
        debug!(
            history_len = self.conversation.len(),
            reply_len = reply.len(),
            "exchange completed"
        );
        Ok(reply)
    }
}

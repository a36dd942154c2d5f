// chat.rs
// User-level operations over the conversation store and the stream controller

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::conversation::{ConversationStore, MessageId, Role, Session, SessionId};
use crate::error::ChatError;
use crate::streaming::{
    CompletionRequest, CompletionTransport, MessageView, StreamController, StreamHandle, StreamOutcome,
};

/// Owns configuration, conversations and the one stream controller.
pub struct Chat<T> {
    config: Config,
    store: ConversationStore,
    controller: StreamController<T>,
}

impl<T: CompletionTransport> Chat<T> {
    pub fn new(config: Config, mut store: ConversationStore, transport: T) -> Self {
        store.set_tag(config.session_tag());
        let controller = StreamController::new(transport).with_soft_timeout(config.soft_timeout());
        Self { config, store, controller }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn current_session(&self) -> &Session {
        self.store.current()
    }

    pub fn select_model(&mut self, provider: &str, model: &str) -> Result<()> {
        self.config.select(provider, model)?;
        self.store.set_tag(self.config.session_tag());
        Ok(())
    }

    pub fn select_prompt(&mut self, id: &str) -> Result<()> {
        self.config.select_prompt(id)?;
        self.store.set_tag(self.config.session_tag());
        Ok(())
    }

    fn settle(&mut self) {
        let interrupted = self.controller.phase();
        if let Some(outcome) = self.controller.settle(&mut self.store) {
            info!(message = %outcome.message, kept = outcome.kept, ?interrupted, "settled active stream before new action");
        }
    }

    fn push_notice(&mut self, text: &str, view: &mut dyn MessageView) -> Result<()> {
        let id = self.store.push_message(Role::Notice, text);
        let session = self.store.current_id().clone();
        if let Some(notice) = self.store.message(&session, id) {
            view.message_changed(notice);
        }
        self.store.persist()
    }

    /// Send `text` as a user turn and stream the reply into `view`.
    ///
    /// Returns `None` when nothing was dispatched (blank input, or no
    /// provider configured, in which case a notice is appended instead).
    pub async fn send_message(
        &mut self,
        text: &str,
        handle: StreamHandle,
        view: &mut dyn MessageView,
    ) -> Result<Option<StreamOutcome>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        self.settle();

        if let Err(err) = self.config.selection() {
            warn!(error = %err, "send rejected");
            let notice = err.notice().unwrap_or(crate::error::GENERIC_NOTICE);
            self.push_notice(notice, view)?;
            return Ok(None);
        }

        self.store.push_message(Role::User, text);
        self.dispatch(handle, view).await
    }

    /// Answer `message_id` again.
    ///
    /// A user message is kept with everything before it; an assistant or
    /// notice message is dropped with everything after it. The last remaining
    /// user turn is then resent without adding a new user message.
    pub async fn regenerate(
        &mut self,
        message_id: MessageId,
        handle: StreamHandle,
        view: &mut dyn MessageView,
    ) -> Result<Option<StreamOutcome>> {
        self.settle();

        let resend = self.store.truncate_for_regenerate(message_id)?;
        if resend.is_none() {
            self.store.persist()?;
            return Ok(None);
        }

        if let Err(err) = self.config.selection() {
            let notice = err.notice().unwrap_or(crate::error::GENERIC_NOTICE);
            self.push_notice(notice, view)?;
            return Ok(None);
        }
        self.dispatch(handle, view).await
    }

    /// Most recent assistant reply in the current session, else the most recent user turn.
    pub fn last_regenerable(&self) -> Option<MessageId> {
        let messages = &self.store.current().messages;
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .or_else(|| messages.iter().rev().find(|m| m.role == Role::User))
            .map(|m| m.id)
    }

    async fn dispatch(
        &mut self,
        handle: StreamHandle,
        view: &mut dyn MessageView,
    ) -> Result<Option<StreamOutcome>> {
        let selection = self.config.selection()?;
        let request = CompletionRequest::new(
            &selection.model,
            selection.system_prompt.as_deref(),
            &self.store.current().messages,
            selection.params,
        );

        let outcome = self
            .controller
            .run(&mut self.store, &selection.endpoint, &request, handle, view)
            .await;

        if let Some(notice) = outcome.notice() {
            if let Some(ChatError::HttpStatus { status, detail }) = &outcome.error {
                warn!(status, %detail, "completion failed");
            }
            self.push_notice(notice, view)?;
        }
        Ok(Some(outcome))
    }

    pub fn new_session(&mut self) -> Result<SessionId> {
        self.settle();
        let id = self.store.new_session();
        self.store.persist()?;
        Ok(id)
    }

    pub fn switch_session(&mut self, id: &SessionId) -> Result<()> {
        self.settle();
        self.store.switch_session(id)?;
        self.store.persist()
    }

    pub fn delete_session(&mut self, id: &SessionId) -> Result<()> {
        if self.controller.active_session() == Some(id) {
            self.settle();
        }
        self.store.delete_session(id)?;
        self.store.persist()
    }

    /// Flip whether a message's reasoning is shown; returns the new collapsed state.
    pub fn toggle_reasoning(&mut self, id: MessageId) -> Result<bool> {
        let collapsed = self.store.toggle_reasoning(id)?;
        self.store.persist()?;
        Ok(collapsed)
    }
}

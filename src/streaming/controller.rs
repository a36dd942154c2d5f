// streaming/controller.rs
// Drives one assistant reply from request to a terminal phase

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::accumulator::{apply_delta, finalize};
use super::frames::{parse_completion, parse_line, Frame};
use super::lines::LineDecoder;
use super::transport::{ByteStream, CompletionRequest, CompletionResponse, CompletionTransport, Endpoint};
use crate::conversation::{ConversationStore, Message, MessageId, Role, SessionId};
use crate::error::{CancelReason, ChatError};

const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_secs(360);
const PERSIST_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Requesting,
    Streaming,
    Finalizing,
    Completed,
    Aborted,
    Failed,
}

/// Cooperative cancellation for one stream. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct StreamHandle {
    token: CancellationToken,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl StreamHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The first reason recorded wins.
    pub fn cancel(&self, reason: CancelReason) {
        {
            let mut recorded = self.reason.lock();
            if recorded.is_none() {
                *recorded = Some(reason);
            }
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.reason.lock()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    fn error(&self) -> ChatError {
        ChatError::Cancelled(self.reason().unwrap_or(CancelReason::User))
    }
}

/// Receives the in-flight message every time it changes.
pub trait MessageView {
    fn message_changed(&mut self, message: &Message);
}

/// The single in-flight assistant message. Present only while a stream is active.
#[derive(Debug)]
struct StreamState {
    session: SessionId,
    message: MessageId,
    handle: StreamHandle,
}

/// How a stream ended.
#[derive(Debug)]
pub struct StreamOutcome {
    pub session: SessionId,
    pub message: MessageId,
    pub phase: StreamPhase,
    /// Whether the assistant message is still in the session.
    pub kept: bool,
    pub error: Option<ChatError>,
}

impl StreamOutcome {
    /// Notice to append for this outcome, if any.
    pub fn notice(&self) -> Option<&'static str> {
        self.error.as_ref().and_then(ChatError::notice)
    }
}

pub struct StreamController<T> {
    transport: T,
    active: Option<StreamState>,
    phase: StreamPhase,
    soft_timeout: Duration,
    persist_interval: Duration,
}

impl<T: CompletionTransport> StreamController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            active: None,
            phase: StreamPhase::Idle,
            soft_timeout: DEFAULT_SOFT_TIMEOUT,
            persist_interval: PERSIST_INTERVAL,
        }
    }

    pub fn with_soft_timeout(mut self, soft_timeout: Duration) -> Self {
        self.soft_timeout = soft_timeout;
        self
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Session the in-flight message belongs to.
    pub fn active_session(&self) -> Option<&SessionId> {
        self.active.as_ref().map(|state| &state.session)
    }

    fn set_phase(&mut self, phase: StreamPhase) {
        debug!(from = ?self.phase, to = ?phase, "stream phase");
        self.phase = phase;
    }

    /// Force a still-recorded stream through `Aborted`.
    ///
    /// Only does work when a previous `run` future was dropped before it
    /// reached a terminal phase.
    pub fn settle(&mut self, store: &mut ConversationStore) -> Option<StreamOutcome> {
        let state = self.active.take()?;
        state.handle.cancel(CancelReason::User);
        let kept = retain_or_discard(store, &state.session, state.message, None);
        self.set_phase(StreamPhase::Aborted);
        persist_logged(store);
        info!(message = %state.message, kept, "settled interrupted stream");
        Some(StreamOutcome {
            session: state.session,
            message: state.message,
            phase: StreamPhase::Aborted,
            kept,
            error: Some(ChatError::Cancelled(CancelReason::User)),
        })
    }

    /// Append an assistant placeholder to the current session and fill it
    /// from `request`, until the stream completes, is cancelled or fails.
    pub async fn run(
        &mut self,
        store: &mut ConversationStore,
        endpoint: &Endpoint,
        request: &CompletionRequest,
        handle: StreamHandle,
        view: &mut dyn MessageView,
    ) -> StreamOutcome {
        self.settle(store);

        let message = store.push_message(Role::Assistant, String::new());
        let session = store.current_id().clone();
        self.active = Some(StreamState { session: session.clone(), message, handle: handle.clone() });
        self.set_phase(StreamPhase::Requesting);
        if let Some(placeholder) = store.message(&session, message) {
            view.message_changed(placeholder);
        }

        let result = self.drive(store, &session, message, endpoint, request, &handle, view).await;

        let (phase, kept, error) = match result {
            Ok(()) => {
                self.set_phase(StreamPhase::Finalizing);
                if let Some(done) = store.message_mut(&session, message) {
                    finalize(done);
                    done.touch();
                    view.message_changed(done);
                }
                (StreamPhase::Completed, true, None)
            }
            Err(err) => {
                let phase = match err {
                    ChatError::Cancelled(_) => StreamPhase::Aborted,
                    _ => StreamPhase::Failed,
                };
                let kept = retain_or_discard(store, &session, message, Some(view));
                (phase, kept, Some(err))
            }
        };

        self.active = None;
        self.set_phase(phase);
        persist_logged(store);
        info!(%message, ?phase, kept, "stream finished");

        StreamOutcome { session, message, phase, kept, error }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &mut self,
        store: &mut ConversationStore,
        session: &SessionId,
        message: MessageId,
        endpoint: &Endpoint,
        request: &CompletionRequest,
        handle: &StreamHandle,
        view: &mut dyn MessageView,
    ) -> Result<(), ChatError> {
        let started = Instant::now();
        let soft_timeout = tokio::time::sleep(self.soft_timeout);
        tokio::pin!(soft_timeout);
        let mut warned = false;

        let mut send = self.transport.send(endpoint, request);
        let response = loop {
            tokio::select! {
                biased;
                _ = handle.cancelled() => return Err(handle.error()),
                _ = &mut soft_timeout, if !warned => {
                    warned = true;
                    warn!(elapsed = ?started.elapsed(), "completion request is taking unusually long");
                }
                response = &mut send => break response?,
            }
        };
        drop(send);

        self.set_phase(StreamPhase::Streaming);
        let mut body: ByteStream = match response {
            CompletionResponse::Complete(bytes) => {
                let delta = parse_completion(&bytes)?;
                if let Some(target) = store.message_mut(session, message) {
                    if apply_delta(target, &delta) {
                        view.message_changed(target);
                    }
                }
                return Ok(());
            }
            CompletionResponse::Stream(body) => body,
        };

        let mut decoder = LineDecoder::new();
        let mut last_persist = Instant::now();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = handle.cancelled() => return Err(handle.error()),
                _ = &mut soft_timeout, if !warned => {
                    warned = true;
                    warn!(elapsed = ?started.elapsed(), "stream still open past soft timeout");
                    continue;
                }
                chunk = body.next() => chunk,
            };

            let Some(chunk) = chunk else {
                if let Some(line) = decoder.finish() {
                    apply_line(store, session, message, &line, view);
                }
                debug!("transport stream ended");
                return Ok(());
            };
            let bytes = chunk?;

            for line in decoder.feed(&bytes) {
                if handle.is_cancelled() {
                    return Err(handle.error());
                }
                if apply_line(store, session, message, &line, view) {
                    debug!("received end-of-stream marker");
                    return Ok(());
                }
            }

            if last_persist.elapsed() >= self.persist_interval {
                persist_logged(store);
                last_persist = Instant::now();
            }
        }
    }
}

/// Run one line through the parser and accumulator. Returns true on `[DONE]`.
fn apply_line(
    store: &mut ConversationStore,
    session: &SessionId,
    message: MessageId,
    line: &str,
    view: &mut dyn MessageView,
) -> bool {
    match parse_line(line) {
        Frame::Ignore => false,
        Frame::Done => true,
        Frame::Delta(delta) => {
            if let Some(target) = store.message_mut(session, message) {
                if apply_delta(target, &delta) {
                    view.message_changed(target);
                }
            }
            false
        }
    }
}

/// Keep a partial reply that produced any output; otherwise remove it.
fn retain_or_discard(
    store: &mut ConversationStore,
    session: &SessionId,
    message: MessageId,
    view: Option<&mut dyn MessageView>,
) -> bool {
    let Some(partial) = store.message_mut(session, message) else {
        return false;
    };
    if partial.has_output() {
        finalize(partial);
        partial.touch();
        if let Some(view) = view {
            view.message_changed(partial);
        }
        true
    } else {
        store.remove_message(session, message);
        false
    }
}

fn persist_logged(store: &ConversationStore) {
    if let Err(err) = store.persist() {
        warn!(error = %err, "failed to persist conversations");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{SessionTag, StoreSnapshot};
    use crate::error::{CONNECTION_LOST_NOTICE, NETWORK_NOTICE, RATE_LIMITED_NOTICE};
    use crate::storage::{MemoryPersistence, SessionPersistence};
    use crate::streaming::transport::RequestParams;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    enum Script {
        Chunks { chunks: Vec<Result<&'static str, &'static str>>, hang: bool },
        Slow { first: &'static str, rest: &'static str, delay: Duration },
        Complete(&'static str),
        Status(u16),
    }

    struct ScriptedTransport(Script);

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn send(
            &self,
            _endpoint: &Endpoint,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, ChatError> {
            match &self.0 {
                Script::Chunks { chunks, hang } => {
                    let items: Vec<Result<Bytes, ChatError>> = chunks
                        .iter()
                        .map(|c| match c {
                            Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
                            Err(e) => Err(ChatError::Transport(e.to_string())),
                        })
                        .collect();
                    let body = stream::iter(items);
                    if *hang {
                        Ok(CompletionResponse::Stream(body.chain(stream::pending()).boxed()))
                    } else {
                        Ok(CompletionResponse::Stream(body.boxed()))
                    }
                }
                Script::Slow { first, rest, delay } => {
                    let (rest, delay) = (*rest, *delay);
                    let later = stream::once(async move {
                        tokio::time::sleep(delay).await;
                        Ok(Bytes::from_static(rest.as_bytes()))
                    });
                    let body = stream::iter([Ok(Bytes::from_static(first.as_bytes()))]).chain(later);
                    Ok(CompletionResponse::Stream(body.boxed()))
                }
                Script::Complete(body) => Ok(CompletionResponse::Complete(Bytes::from_static(body.as_bytes()))),
                Script::Status(status) => Err(ChatError::HttpStatus { status: *status, detail: "scripted".into() }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingView {
        seen: Vec<(String, String)>,
        cancel_on_content: Option<StreamHandle>,
    }

    impl MessageView for RecordingView {
        fn message_changed(&mut self, message: &Message) {
            self.seen.push((message.reasoning.clone().unwrap_or_default(), message.content.clone()));
            if let Some(handle) = &self.cancel_on_content {
                if !message.content.is_empty() {
                    handle.cancel(CancelReason::User);
                }
            }
        }
    }

    fn content_frame(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n", text)
    }

    fn leak(text: String) -> &'static str {
        Box::leak(text.into_boxed_str())
    }

    fn setup() -> (ConversationStore, MemoryPersistence, Endpoint, CompletionRequest) {
        let backend = MemoryPersistence::default();
        let mut store = ConversationStore::open(Box::new(backend.clone()), SessionTag::default()).unwrap();
        store.push_message(Role::User, "Say hello");
        let request = CompletionRequest::new("m1", None, &store.current().messages, RequestParams::default());
        let endpoint = Endpoint { base_url: "http://unused".into(), api_key: "k".into() };
        (store, backend, endpoint, request)
    }

    async fn run_script(
        script: Script,
        store: &mut ConversationStore,
        view: &mut RecordingView,
        handle: StreamHandle,
    ) -> StreamOutcome {
        let endpoint = Endpoint { base_url: "http://unused".into(), api_key: "k".into() };
        let request = CompletionRequest::new("m1", None, &store.current().messages, RequestParams::default());
        let mut controller = StreamController::new(ScriptedTransport(script));
        controller.run(store, &endpoint, &request, handle, view).await
    }

    #[tokio::test]
    async fn test_end_to_end_hello() {
        let (mut store, backend, _, _) = setup();
        let mut view = RecordingView::default();
        let script = Script::Chunks {
            chunks: vec![Ok(leak(content_frame("Hel"))), Ok(leak(content_frame("lo"))), Ok("data: [DONE]\n\n")],
            hang: false,
        };
        let outcome = run_script(script, &mut store, &mut view, StreamHandle::new()).await;

        assert_eq!(outcome.phase, StreamPhase::Completed);
        assert!(outcome.notice().is_none());
        let reply = store.message(&outcome.session, outcome.message).unwrap();
        assert_eq!(reply.content, "Hello");
        assert!(reply.reasoning.is_none());

        let saved = backend.last().unwrap();
        let session = &saved.sessions[&outcome.session];
        assert_eq!(session.messages.last().unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn test_view_sees_monotonic_growth() {
        let (mut store, _, _, _) = setup();
        let mut view = RecordingView::default();
        let reasoning = "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"Plan\"}}]}\n";
        let script = Script::Chunks {
            chunks: vec![Ok(reasoning), Ok(leak(content_frame("Hi"))), Ok(leak(content_frame(" there")))],
            hang: false,
        };
        run_script(script, &mut store, &mut view, StreamHandle::new()).await;

        assert_eq!(view.seen.first().unwrap(), &(String::new(), String::new()));
        for pair in view.seen.windows(2) {
            assert!(pair[1].0.starts_with(&pair[0].0));
            assert!(pair[1].1.starts_with(&pair[0].1));
        }
        assert_eq!(view.seen.last().unwrap(), &("Plan".to_string(), "Hi there".to_string()));
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let (mut store, _, _, _) = setup();
        let mut view = RecordingView::default();
        let script = Script::Chunks {
            chunks: vec![
                Ok("data: {\"choices\":[{\"del"),
                Ok("ta\":{\"content\":\"<thi\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":"),
                Ok("\"nk>hmm</think> Answer\"}}]}\n"),
            ],
            hang: false,
        };
        let outcome = run_script(script, &mut store, &mut view, StreamHandle::new()).await;

        assert_eq!(outcome.phase, StreamPhase::Completed);
        let reply = store.message(&outcome.session, outcome.message).unwrap();
        assert_eq!(reply.content, "Answer");
        assert_eq!(reply.reasoning.as_deref(), Some("hmm"));
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_interrupt() {
        let (mut store, _, _, _) = setup();
        let mut view = RecordingView::default();
        let script = Script::Chunks {
            chunks: vec![
                Ok(leak(content_frame("Hel"))),
                Ok("data: {not json}\n\n"),
                Ok(leak(content_frame("lo"))),
                Ok("data: [DONE]\n"),
            ],
            hang: false,
        };
        let outcome = run_script(script, &mut store, &mut view, StreamHandle::new()).await;
        assert_eq!(outcome.phase, StreamPhase::Completed);
        assert_eq!(store.message(&outcome.session, outcome.message).unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn test_abort_after_delta_keeps_partial_reply() {
        let (mut store, _, _, _) = setup();
        let handle = StreamHandle::new();
        let mut view = RecordingView { cancel_on_content: Some(handle.clone()), ..Default::default() };
        let script = Script::Chunks { chunks: vec![Ok(leak(content_frame("Hel")))], hang: true };
        let outcome = run_script(script, &mut store, &mut view, handle).await;

        assert_eq!(outcome.phase, StreamPhase::Aborted);
        assert!(outcome.kept);
        assert!(outcome.notice().is_none());
        assert_eq!(store.message(&outcome.session, outcome.message).unwrap().content, "Hel");
    }

    #[tokio::test]
    async fn test_abort_before_delta_removes_placeholder() {
        let (mut store, _, _, _) = setup();
        let handle = StreamHandle::new();
        let remote = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.cancel(CancelReason::User);
        });
        let mut view = RecordingView::default();
        let script = Script::Chunks { chunks: vec![Ok(": keep-alive\n\n")], hang: true };
        let outcome = run_script(script, &mut store, &mut view, handle).await;

        assert_eq!(outcome.phase, StreamPhase::Aborted);
        assert!(!outcome.kept);
        assert!(store.message(&outcome.session, outcome.message).is_none());
        assert_eq!(store.current().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_lost_aborts_with_notice() {
        let (mut store, _, _, _) = setup();
        let handle = StreamHandle::new();
        handle.cancel(CancelReason::ConnectionLost);
        handle.cancel(CancelReason::User);
        let mut view = RecordingView::default();
        let script = Script::Chunks { chunks: vec![], hang: true };
        let outcome = run_script(script, &mut store, &mut view, handle).await;

        assert_eq!(outcome.phase, StreamPhase::Aborted);
        assert_eq!(outcome.notice(), Some(CONNECTION_LOST_NOTICE));
        assert!(!outcome.kept);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_partial_reply() {
        let (mut store, _, _, _) = setup();
        let mut view = RecordingView::default();
        let script = Script::Chunks {
            chunks: vec![Ok(leak(content_frame("partial"))), Err("connection reset")],
            hang: false,
        };
        let outcome = run_script(script, &mut store, &mut view, StreamHandle::new()).await;

        assert_eq!(outcome.phase, StreamPhase::Failed);
        assert!(outcome.kept);
        assert_eq!(outcome.notice(), Some(NETWORK_NOTICE));
        assert_eq!(store.message(&outcome.session, outcome.message).unwrap().content, "partial");
    }

    #[tokio::test]
    async fn test_error_status_removes_placeholder() {
        let (mut store, _, _, _) = setup();
        let mut view = RecordingView::default();
        let outcome = run_script(Script::Status(429), &mut store, &mut view, StreamHandle::new()).await;

        assert_eq!(outcome.phase, StreamPhase::Failed);
        assert!(!outcome.kept);
        assert_eq!(outcome.notice(), Some(RATE_LIMITED_NOTICE));
        assert_eq!(store.current().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_non_stream_body_is_finalized() {
        let (mut store, _, _, _) = setup();
        let mut view = RecordingView::default();
        let body = r#"{"choices":[{"message":{"content":"<think>quick</think>Hi!"}}]}"#;
        let outcome = run_script(Script::Complete(body), &mut store, &mut view, StreamHandle::new()).await;

        assert_eq!(outcome.phase, StreamPhase::Completed);
        let reply = store.message(&outcome.session, outcome.message).unwrap();
        assert_eq!(reply.content, "Hi!");
        assert_eq!(reply.reasoning.as_deref(), Some("quick"));
    }

    #[tokio::test]
    async fn test_soft_timeout_only_warns() {
        let (mut store, _, endpoint, request) = setup();
        let mut view = RecordingView::default();
        let script = Script::Slow {
            first: leak(content_frame("Hel")),
            rest: leak(format!("{}data: [DONE]\n", content_frame("lo"))),
            delay: Duration::from_millis(50),
        };
        let mut controller =
            StreamController::new(ScriptedTransport(script)).with_soft_timeout(Duration::from_millis(5));
        let outcome = controller.run(&mut store, &endpoint, &request, StreamHandle::new(), &mut view).await;

        assert_eq!(outcome.phase, StreamPhase::Completed);
        assert_eq!(store.message(&outcome.session, outcome.message).unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn test_settle_after_dropped_run() {
        let (mut store, backend, endpoint, request) = setup();
        let mut view = RecordingView::default();
        let script = Script::Chunks { chunks: vec![Ok(leak(content_frame("Hel")))], hang: true };
        let mut controller = StreamController::new(ScriptedTransport(script));

        let handle = StreamHandle::new();
        let run = controller.run(&mut store, &endpoint, &request, handle.clone(), &mut view);
        assert!(tokio::time::timeout(Duration::from_millis(30), run).await.is_err());
        assert_eq!(controller.phase(), StreamPhase::Streaming);
        assert!(controller.active_session().is_some());

        let saves = backend.save_count();
        let outcome = controller.settle(&mut store).unwrap();
        assert_eq!(outcome.phase, StreamPhase::Aborted);
        assert!(outcome.kept);
        assert!(handle.is_cancelled());
        assert_eq!(controller.phase(), StreamPhase::Aborted);
        assert!(controller.active_session().is_none());
        assert!(backend.save_count() > saves);
        assert!(controller.settle(&mut store).is_none());
    }

    fn hanging_hello() -> Script {
        Script::Chunks {
            chunks: vec![Ok(leak(content_frame("Hel"))), Ok(leak(content_frame("lo")))],
            hang: true,
        }
    }

    #[tokio::test]
    async fn test_progress_is_saved_while_stream_is_open() {
        let (mut store, backend, endpoint, request) = setup();
        let mut view = RecordingView::default();
        let mut controller = StreamController::new(ScriptedTransport(hanging_hello()));
        controller.persist_interval = Duration::ZERO;
        let before = backend.save_count();

        let run = controller.run(&mut store, &endpoint, &request, StreamHandle::new(), &mut view);
        assert!(tokio::time::timeout(Duration::from_millis(50), run).await.is_err());

        assert!(backend.save_count() > before);
        let saved = backend.last().unwrap();
        let session = &saved.sessions[store.current_id()];
        assert_eq!(session.messages.last().unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn test_saves_are_throttled_by_interval() {
        let (mut store, backend, endpoint, request) = setup();
        let mut view = RecordingView::default();
        let mut controller = StreamController::new(ScriptedTransport(hanging_hello()));
        controller.persist_interval = Duration::from_secs(60);
        let before = backend.save_count();

        let run = controller.run(&mut store, &endpoint, &request, StreamHandle::new(), &mut view);
        assert!(tokio::time::timeout(Duration::from_millis(50), run).await.is_err());

        assert_eq!(backend.save_count(), before);
    }

    struct FailingPersistence(StoreSnapshot);

    impl SessionPersistence for FailingPersistence {
        fn load(&self) -> anyhow::Result<Option<StoreSnapshot>> {
            Ok(Some(self.0.clone()))
        }

        fn save(&self, _snapshot: &StoreSnapshot) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }
    }

    #[tokio::test]
    async fn test_failed_saves_do_not_stop_the_stream() {
        let (seeded, _, endpoint, request) = setup();
        let mut store =
            ConversationStore::open(Box::new(FailingPersistence(seeded.snapshot())), SessionTag::default()).unwrap();
        let mut view = RecordingView::default();
        let script = Script::Chunks {
            chunks: vec![Ok(leak(content_frame("Hel"))), Ok(leak(content_frame("lo"))), Ok("data: [DONE]\n\n")],
            hang: false,
        };
        let mut controller = StreamController::new(ScriptedTransport(script));
        controller.persist_interval = Duration::ZERO;

        let outcome = controller.run(&mut store, &endpoint, &request, StreamHandle::new(), &mut view).await;

        assert_eq!(outcome.phase, StreamPhase::Completed);
        assert!(outcome.notice().is_none());
        assert_eq!(store.message(&outcome.session, outcome.message).unwrap().content, "Hello");
    }
}

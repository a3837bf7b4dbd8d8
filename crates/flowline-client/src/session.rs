use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use flowline_core::document::GraphDocument;
use flowline_core::error::{FlowlineError, Result};
use flowline_core::event::{EventBus, ExecutionEvent, InterruptSession};

use crate::activity::NodeActivity;
use crate::codec::{self, EncodeOptions, ResumeRequest};
use crate::runner::{ByteStream, RunnerTransport};
use crate::sse::FrameDecoder;

/// Lifecycle of one logical run.
///
/// `Interrupted` is a suspend point, not a failure: `resume` moves it back
/// through `Submitting → Running`. `Idle` and every state on the right-hand
/// side accept a fresh `start`, which always begins a brand-new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Submitting,
    Running,
    Completed,
    Errored,
    Cancelled,
    Interrupted,
}

impl RunState {
    /// States with an open network stream. At most one run is in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Running)
    }
}

/// Whether a run is opened plain or with a thread id that allows it to
/// suspend at an interrupt node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Standard,
    Resumable,
}

struct SessionInner {
    state: RunState,
    activity: NodeActivity,
    interrupt: Option<InterruptSession>,
    output: Option<Value>,
    error: Option<String>,
    thread_id: Option<String>,
    cancel: CancellationToken,
}

/// One logical run against the runner: submit, observe, optionally suspend
/// at an interrupt, resume, terminate.
///
/// Cloneable handle over shared state so `cancel` can be issued from
/// another task while `start`/`resume` is awaiting the stream. Events are
/// folded one at a time on the consuming task; state transitions are the
/// primary observable and callers read them through the snapshot accessors
/// rather than return values.
#[derive(Clone)]
pub struct ExecutionSession {
    transport: Arc<dyn RunnerTransport>,
    bus: Arc<EventBus>,
    options: EncodeOptions,
    inner: Arc<Mutex<SessionInner>>,
}

impl ExecutionSession {
    pub fn new(transport: Arc<dyn RunnerTransport>) -> Self {
        Self {
            transport,
            bus: Arc::new(EventBus::default()),
            options: EncodeOptions::default(),
            inner: Arc::new(Mutex::new(SessionInner {
                state: RunState::Idle,
                activity: NodeActivity::new(),
                interrupt: None,
                output: None,
                error: None,
                thread_id: None,
                cancel: CancellationToken::new(),
            })),
        }
    }

    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Bus carrying every decoded event of the current run, for live views.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn state(&self) -> RunState {
        self.lock().state
    }

    /// Snapshot of the per-node projection for the current run.
    pub fn activity(&self) -> NodeActivity {
        self.lock().activity.clone()
    }

    pub fn output(&self) -> Option<Value> {
        self.lock().output.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn interrupt(&self) -> Option<InterruptSession> {
        self.lock().interrupt.clone()
    }

    /// Begin a brand-new run.
    ///
    /// `input_json` must parse as JSON — a local precondition checked
    /// before anything is sent. Rejected while a run is in flight. Prior
    /// activity, output, and any suspended session are cleared.
    pub async fn start(
        &self,
        document: &GraphDocument,
        input_json: &str,
        mode: RunMode,
    ) -> Result<()> {
        let input: Value = serde_json::from_str(input_json).map_err(|e| {
            FlowlineError::Precondition(format!("run input is not valid JSON: {e}"))
        })?;

        let (token, thread_id) = {
            let mut inner = self.lock();
            if inner.state.is_in_flight() {
                return Err(FlowlineError::Precondition(
                    "a run is already in flight on this session".into(),
                ));
            }
            inner.activity.clear();
            inner.interrupt = None;
            inner.output = None;
            inner.error = None;
            inner.thread_id = match mode {
                RunMode::Standard => None,
                RunMode::Resumable => Some(Uuid::new_v4().to_string()),
            };
            inner.state = RunState::Submitting;
            inner.cancel = CancellationToken::new();
            (inner.cancel.clone(), inner.thread_id.clone())
        };

        info!(?mode, thread_id = thread_id.as_deref(), "submitting run");

        let open = match thread_id {
            Some(thread_id) => self.transport.open_resumable(codec::encode_resumable(
                document,
                input,
                thread_id,
                &self.options,
            )),
            None => self
                .transport
                .open_run(codec::encode_run(document, input, &self.options)),
        };

        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => return self.finish_cancelled(),
            opened = open => match opened {
                Ok(stream) => stream,
                Err(e) => return self.finish_failed(e),
            },
        };

        self.consume(stream, token).await
    }

    /// Resume a run suspended at an interrupt node.
    ///
    /// Valid only in `Interrupted` with a live session; rejected
    /// synchronously otherwise, without any network call. The stored
    /// `session_id` is opaque and single-use: the suspended session is
    /// replaced by the next interrupt or terminal event.
    pub async fn resume(&self, value: Value) -> Result<()> {
        let (token, session_id) = {
            let mut inner = self.lock();
            if inner.state != RunState::Interrupted {
                return Err(FlowlineError::Precondition(
                    "resume is only valid while the run is interrupted".into(),
                ));
            }
            let Some(session) = inner.interrupt.as_ref() else {
                return Err(FlowlineError::Precondition(
                    "no suspended session to resume".into(),
                ));
            };
            let session_id = session.session_id.clone();
            inner.state = RunState::Submitting;
            inner.cancel = CancellationToken::new();
            (inner.cancel.clone(), session_id)
        };

        info!(session_id, "resuming interrupted run");

        let open = self.transport.open_resume(ResumeRequest {
            session_id,
            resume_value: value,
        });

        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => return self.finish_cancelled(),
            opened = open => match opened {
                Ok(stream) => stream,
                Err(e) => return self.finish_failed(e),
            },
        };

        self.consume(stream, token).await
    }

    /// Request cooperative cancellation of the in-flight run.
    ///
    /// Transitions to `Cancelled` immediately; the consuming loop observes
    /// the token at its next suspension point and applies no further
    /// events. No-op when nothing is in flight.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if inner.state.is_in_flight() {
            inner.state = RunState::Cancelled;
            inner.cancel.cancel();
        }
    }

    /// Drive the byte stream to a terminal state, folding each decoded
    /// event before the next chunk is read.
    async fn consume(&self, mut stream: ByteStream, token: CancellationToken) -> Result<()> {
        let mut decoder = FrameDecoder::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => return self.finish_cancelled(),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    {
                        let mut inner = self.lock();
                        if inner.state == RunState::Submitting {
                            inner.state = RunState::Running;
                        }
                    }
                    for frame in decoder.feed(&bytes) {
                        // Anything decoded after cancellation is discarded
                        if token.is_cancelled() {
                            return self.finish_cancelled();
                        }
                        let event: ExecutionEvent = match serde_json::from_value(frame) {
                            Ok(event) => event,
                            Err(e) => {
                                debug!(error = %e, "skipping malformed event frame");
                                continue;
                            }
                        };
                        self.bus.publish(event.clone());
                        if let Some(outcome) = self.apply(event, &token) {
                            self.log_skipped(&decoder);
                            return outcome;
                        }
                    }
                    if decoder.finished() {
                        // Clean sentinel but no terminal event: the run's
                        // outcome is unknown, not a success.
                        self.log_skipped(&decoder);
                        return self.finish_stream_lost(
                            "stream closed before a terminal event; the run may still \
                             be executing on the runner — start a new run to retry",
                        );
                    }
                }
                Some(Err(e)) => {
                    self.log_skipped(&decoder);
                    return self.finish_stream_lost(&format!(
                        "event stream broke mid-run ({e}); the run may still be \
                         executing on the runner — start a new run to retry"
                    ));
                }
                None => {
                    self.log_skipped(&decoder);
                    return self.finish_stream_lost(
                        "event stream ended without the success sentinel; the run may \
                         still be executing on the runner — start a new run to retry",
                    );
                }
            }
        }
    }

    /// Fold one event into session state. Returns the run's outcome when
    /// the event is terminal.
    ///
    /// The cancellation check happens under the same lock as the state
    /// mutation: a `cancel` landing between the loop's token check and
    /// this call must still win, never be overwritten by a terminal event.
    fn apply(&self, event: ExecutionEvent, token: &CancellationToken) -> Option<Result<()>> {
        let mut inner = self.lock();
        if inner.state == RunState::Cancelled || token.is_cancelled() {
            inner.state = RunState::Cancelled;
            return Some(Err(FlowlineError::Cancelled));
        }
        match event {
            ExecutionEvent::NodeStart { .. } | ExecutionEvent::NodeEnd { .. } => {
                inner.activity.apply(&event);
                None
            }
            ExecutionEvent::Complete { output } => {
                info!("run completed");
                inner.output = Some(output);
                inner.interrupt = None;
                inner.state = RunState::Completed;
                Some(Ok(()))
            }
            ExecutionEvent::Interrupted {
                session_id,
                checkpoint_id,
                interrupt_value,
            } => {
                info!(session_id, "run suspended awaiting input");
                inner.interrupt = Some(InterruptSession {
                    session_id,
                    thread_id: inner.thread_id.clone(),
                    checkpoint_id,
                    interrupt_value,
                });
                inner.state = RunState::Interrupted;
                Some(Ok(()))
            }
            ExecutionEvent::Error { message } => {
                warn!(message, "runner reported an error");
                inner.interrupt = None;
                inner.error = Some(message.clone());
                inner.state = RunState::Errored;
                Some(Err(FlowlineError::Remote(message)))
            }
        }
    }

    fn finish_cancelled(&self) -> Result<()> {
        self.lock().state = RunState::Cancelled;
        Err(FlowlineError::Cancelled)
    }

    fn finish_failed(&self, error: FlowlineError) -> Result<()> {
        let mut inner = self.lock();
        inner.error = Some(error.to_string());
        inner.state = RunState::Errored;
        Err(error)
    }

    fn finish_stream_lost(&self, message: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.error = Some(message.to_string());
        inner.state = RunState::Errored;
        Err(FlowlineError::StreamLost(message.to_string()))
    }

    fn log_skipped(&self, decoder: &FrameDecoder) {
        if decoder.skipped() > 0 {
            debug!(skipped = decoder.skipped(), "non-JSON payload lines skipped this run");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        // Held only for quick field access, never across an await
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use bytes::Bytes;
    use futures::future::BoxFuture;
    use serde_json::json;

    use flowline_core::document::{Edge, NodeKind};
    use crate::codec::{ResumableRunRequest, RunRequest};

    enum Script {
        Chunks(Vec<&'static str>),
        Delayed(Vec<&'static str>),
        Broken(Vec<&'static str>),
        Fail(u16, &'static str),
    }

    #[derive(Default)]
    struct MockTransport {
        scripts: Mutex<VecDeque<Script>>,
        calls: Mutex<Vec<(&'static str, Value)>>,
    }

    impl MockTransport {
        fn scripted(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(&'static str, Value)> {
            self.calls.lock().unwrap().clone()
        }

        fn open(&self, endpoint: &'static str, body: Value) -> Result<ByteStream> {
            self.calls.lock().unwrap().push((endpoint, body));
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected transport call");
            match script {
                Script::Chunks(chunks) => Ok(futures::stream::iter(
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))),
                )
                .boxed()),
                Script::Delayed(chunks) => Ok(futures::stream::once(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Bytes::from(chunks.concat()))
                })
                .boxed()),
                Script::Broken(chunks) => {
                    let mut items: Vec<Result<Bytes>> =
                        chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                    items.push(Err(FlowlineError::StreamLost(
                        "connection reset by peer".into(),
                    )));
                    Ok(futures::stream::iter(items).boxed())
                }
                Script::Fail(status, body) => Err(FlowlineError::Transport {
                    status,
                    body: body.to_string(),
                }),
            }
        }
    }

    impl RunnerTransport for MockTransport {
        fn open_run(&self, request: RunRequest) -> BoxFuture<'_, Result<ByteStream>> {
            let body = serde_json::to_value(&request).unwrap();
            Box::pin(async move { self.open("run", body) })
        }

        fn open_resumable(
            &self,
            request: ResumableRunRequest,
        ) -> BoxFuture<'_, Result<ByteStream>> {
            let body = serde_json::to_value(&request).unwrap();
            Box::pin(async move { self.open("resumable", body) })
        }

        fn open_resume(&self, request: ResumeRequest) -> BoxFuture<'_, Result<ByteStream>> {
            let body = serde_json::to_value(&request).unwrap();
            Box::pin(async move { self.open("resume", body) })
        }
    }

    fn sample_doc() -> GraphDocument {
        let mut doc = GraphDocument::new();
        let start = doc.add_node(NodeKind::Start, "Start");
        let llm = doc.add_node(NodeKind::Llm, "Chat");
        let end = doc.add_node(NodeKind::End, "End");
        doc.add_edge(Edge::new(&start, &llm));
        doc.add_edge(Edge::new(&llm, &end));
        doc
    }

    const HAPPY_PATH: &[&str] = &[
        "data: {\"type\":\"node_start\",\"node_id\":\"llm_2\"}\n",
        "data: {\"type\":\"node_end\",\"node_id\":\"llm_2\",\"step_number\":1,\
         \"state\":{\"value\":\"hi there\"}}\n",
        "data: {\"type\":\"complete\",\"output\":{\"value\":\"hi there\"}}\n",
        "data: [DONE]\n",
    ];

    #[tokio::test]
    async fn test_run_to_completion() {
        let transport = MockTransport::scripted(vec![Script::Chunks(HAPPY_PATH.to_vec())]);
        let session = ExecutionSession::new(transport.clone());

        session
            .start(&sample_doc(), r#"{"value":"hi"}"#, RunMode::Standard)
            .await
            .unwrap();

        assert_eq!(session.state(), RunState::Completed);
        assert_eq!(session.output(), Some(json!({"value": "hi there"})));

        let activity = session.activity();
        assert!(!activity.is_active("llm_2"));
        let history = activity.history_of("llm_2");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].step, 1);

        // Wire request drops start/end and carries the parsed input
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "run");
        assert_eq!(calls[0].1["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(calls[0].1["input"], json!({"value": "hi"}));
    }

    #[tokio::test]
    async fn test_interrupt_then_resume() {
        let transport = MockTransport::scripted(vec![
            Script::Chunks(vec![
                "data: {\"type\":\"node_start\",\"node_id\":\"llm_2\"}\n",
                "data: {\"type\":\"interrupted\",\"session_id\":\"s1\",\
                 \"interrupt_value\":\"approve?\"}\n",
                "data: [DONE]\n",
            ]),
            Script::Chunks(vec![
                "data: {\"type\":\"node_end\",\"node_id\":\"llm_2\",\"step_number\":1,\
                 \"state\":{\"value\":\"approved\"}}\n",
                "data: {\"type\":\"complete\",\"output\":{\"value\":\"approved\"}}\n",
                "data: [DONE]\n",
            ]),
        ]);
        let session = ExecutionSession::new(transport.clone());

        session
            .start(&sample_doc(), r#"{"value":"hi"}"#, RunMode::Resumable)
            .await
            .unwrap();
        assert_eq!(session.state(), RunState::Interrupted);

        let interrupt = session.interrupt().unwrap();
        assert_eq!(interrupt.session_id, "s1");
        assert!(interrupt.thread_id.is_some());
        assert_eq!(interrupt.interrupt_value, json!("approve?"));

        session.resume(json!("yes")).await.unwrap();
        assert_eq!(session.state(), RunState::Completed);
        assert!(session.interrupt().is_none());
        // Activity from before the interrupt is kept: same logical run
        assert_eq!(session.activity().history_of("llm_2").len(), 1);

        let calls = transport.calls();
        assert_eq!(calls[0].0, "resumable");
        assert!(calls[0].1["thread_id"].is_string());
        assert_eq!(calls[1].0, "resume");
        assert_eq!(
            calls[1].1,
            json!({"session_id": "s1", "resume_value": "yes"})
        );
    }

    #[tokio::test]
    async fn test_resume_outside_interrupted_rejects_without_network() {
        let transport = MockTransport::scripted(vec![]);
        let session = ExecutionSession::new(transport.clone());

        let err = session.resume(json!("yes")).await.unwrap_err();
        assert!(matches!(err, FlowlineError::Precondition(_)));
        assert_eq!(session.state(), RunState::Idle);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_rejects_before_submitting() {
        let transport = MockTransport::scripted(vec![]);
        let session = ExecutionSession::new(transport.clone());

        let err = session
            .start(&sample_doc(), "not json", RunMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::Precondition(_)));
        assert_eq!(session.state(), RunState::Idle);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_stream_is_stream_lost() {
        let transport = MockTransport::scripted(vec![Script::Chunks(vec![
            "data: {\"type\":\"node_start\",\"node_id\":\"llm_2\"}\n",
            // stream drops here: no error event, no sentinel
        ])]);
        let session = ExecutionSession::new(transport);

        let err = session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::StreamLost(_)));
        assert_eq!(session.state(), RunState::Errored);
        assert!(session.last_error().unwrap().contains("may still"));
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_stream_lost() {
        let transport = MockTransport::scripted(vec![Script::Broken(vec![
            "data: {\"type\":\"node_start\",\"node_id\":\"llm_2\"}\n",
        ])]);
        let session = ExecutionSession::new(transport);

        let err = session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::StreamLost(_)));
        assert_eq!(session.state(), RunState::Errored);
        assert!(session.last_error().unwrap().contains("may still"));
        // Events before the break were applied
        assert!(session.activity().is_active("llm_2"));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_in_flight_terminal_event() {
        let transport = MockTransport::scripted(vec![]);
        let session = ExecutionSession::new(transport);

        // A run is in flight; the consuming loop has already decoded a
        // `complete` frame when the cancel request lands.
        let token = {
            let mut inner = session.inner.lock().unwrap();
            inner.state = RunState::Running;
            inner.cancel.clone()
        };
        session.cancel();

        let outcome = session.apply(
            ExecutionEvent::Complete {
                output: json!({"value": "late"}),
            },
            &token,
        );
        assert!(matches!(outcome, Some(Err(FlowlineError::Cancelled))));
        assert_eq!(session.state(), RunState::Cancelled);
        assert!(session.output().is_none());
    }

    #[tokio::test]
    async fn test_sentinel_without_terminal_event_is_stream_lost() {
        let transport = MockTransport::scripted(vec![Script::Chunks(vec![
            "data: {\"type\":\"node_start\",\"node_id\":\"llm_2\"}\n",
            "data: [DONE]\n",
        ])]);
        let session = ExecutionSession::new(transport);

        let err = session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::StreamLost(_)));
        assert_eq!(session.state(), RunState::Errored);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_status_and_body() {
        let transport =
            MockTransport::scripted(vec![Script::Fail(422, "unknown node type: frobnicate")]);
        let session = ExecutionSession::new(transport);

        let err = session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap_err();
        match err {
            FlowlineError::Transport { status, body } => {
                assert_eq!(status, 422);
                assert!(body.contains("frobnicate"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.state(), RunState::Errored);
    }

    #[tokio::test]
    async fn test_remote_error_event() {
        let transport = MockTransport::scripted(vec![Script::Chunks(vec![
            "data: {\"type\":\"error\",\"message\":\"node llm_2 raised\"}\n",
            "data: [DONE]\n",
        ])]);
        let session = ExecutionSession::new(transport);

        let err = session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::Remote(_)));
        assert_eq!(session.state(), RunState::Errored);
        assert_eq!(session.last_error().as_deref(), Some("node llm_2 raised"));
    }

    #[tokio::test]
    async fn test_noise_and_unknown_events_skipped() {
        let transport = MockTransport::scripted(vec![Script::Chunks(vec![
            ": comment line\n",
            "\n",
            "data: keepalive\n",
            "data: {\"type\":\"heartbeat\",\"ts\":1}\n",
            "data: {\"type\":\"complete\",\"output\":null}\n",
            "data: [DONE]\n",
        ])]);
        let session = ExecutionSession::new(transport);

        session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap();
        assert_eq!(session.state(), RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_any_event() {
        let transport = MockTransport::scripted(vec![Script::Delayed(vec![
            "data: {\"type\":\"node_start\",\"node_id\":\"llm_2\"}\n",
        ])]);
        let session = ExecutionSession::new(transport);

        let canceller = session.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = session
            .start(&sample_doc(), r#"{"value":"hi"}"#, RunMode::Standard)
            .await
            .unwrap_err();
        handle.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(session.state(), RunState::Cancelled);
        // The in-flight node_start was never applied
        assert!(session.activity().active().is_empty());
        assert!(session.activity().history_of("llm_2").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_in_flight_rejected() {
        let transport = MockTransport::scripted(vec![Script::Delayed(HAPPY_PATH.to_vec())]);
        let session = ExecutionSession::new(transport);

        let runner = session.clone();
        let doc = sample_doc();
        let handle =
            tokio::spawn(async move { runner.start(&doc, "{}", RunMode::Standard).await });
        tokio::time::sleep(Duration::from_millis(1)).await;

        let err = session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::Precondition(_)));

        handle.await.unwrap().unwrap();
        assert_eq!(session.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_fresh_start_clears_previous_run() {
        let transport = MockTransport::scripted(vec![
            Script::Chunks(vec![
                "data: {\"type\":\"node_start\",\"node_id\":\"llm_2\"}\n",
                "data: {\"type\":\"interrupted\",\"session_id\":\"s1\",\
                 \"interrupt_value\":\"approve?\"}\n",
            ]),
            Script::Chunks(HAPPY_PATH.to_vec()),
        ]);
        let session = ExecutionSession::new(transport);

        session
            .start(&sample_doc(), "{}", RunMode::Resumable)
            .await
            .unwrap();
        assert_eq!(session.state(), RunState::Interrupted);
        assert!(session.activity().is_active("llm_2"));

        // Abandon the suspended run with a fresh start
        session
            .start(&sample_doc(), "{}", RunMode::Standard)
            .await
            .unwrap();
        assert_eq!(session.state(), RunState::Completed);
        assert!(session.interrupt().is_none());
        assert!(!session.activity().is_active("llm_2"));
        assert_eq!(session.activity().history_of("llm_2").len(), 1);
    }
}

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SummaryError;
use crate::render::{self, LinkBinder, SummaryView, TimestampLink};
use crate::stream::{self, ArtifactState, LineSplitter, StreamRecord, SummaryArtifact};
use crate::{Segment, VideoId};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Shown under a summary whose stream broke off after some text arrived.
pub const PARTIAL_NOTE: &str = "Note: the summary may be incomplete because the connection was interrupted.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub plan: String,
    #[serde(rename = "expiryDate", alias = "expiresAt")]
    pub expiry_date: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UsageCounts {
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub limit: u64,
}

/// Answer of `GET /usage`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageState {
    #[serde(default)]
    pub has_reached_limit: bool,
    #[serde(default)]
    pub usage: UsageCounts,
    #[serde(default)]
    pub subscription: Option<Subscription>,
}

impl UsageState {
    fn limit_reached() -> Self {
        Self {
            has_reached_limit: true,
            ..Self::default()
        }
    }
}

/// Body of `POST /summary`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub video_id: VideoId,
    pub transcript: Vec<Segment>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

/// Error body of a non-200 `/summary` answer
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: Option<String>,
    details: Option<String>,
    #[serde(default)]
    requires_payment: bool,
}

/// Checks whether a user may request another summary.
#[async_trait]
pub trait UsageGate: Send + Sync {
    async fn check(&self, user_id: &str) -> Result<UsageState, SummaryError>;
}

/// A response body read one chunk at a time.
#[async_trait]
pub trait ChunkStream: Send {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SummaryError>;
}

pub enum SummaryResponse {
    Stream(Box<dyn ChunkStream>),
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn open(&self, request: &SummaryRequest) -> Result<SummaryResponse, SummaryError>;
}

/// One render of the artifact as it grows.
pub struct RenderUpdate<'a> {
    pub text: &'a str,
    pub view: &'a SummaryView,
    /// Timestamp links seen for the first time in this render.
    pub new_links: Vec<&'a TimestampLink>,
    pub state: ArtifactState,
}

/// Display surface for one summary. Each `render` replaces the previous one.
pub trait SummarySink {
    fn render(&mut self, update: &RenderUpdate<'_>);

    /// Usage is exhausted; offer an upgrade instead of a summary.
    fn upgrade(&mut self, usage: &UsageState);

    /// Advisory text attached below the current render.
    fn note(&mut self, message: &str);

    /// Called once, when the service marks the stream done.
    fn completed(&mut self, _artifact: &SummaryArtifact) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The stream ended. `done` is true when the service finished it on purpose, with a
    /// `done` record or a cached summary, and false when the body simply ran out.
    Completed { artifact: SummaryArtifact, done: bool },
    /// Transport broke after some text arrived; the partial text was rendered with a note.
    Partial(SummaryArtifact),
    LimitReached(UsageState),
    Cancelled(SummaryArtifact),
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Bound on the time from issuing the request to receiving the response head.
    pub timeout: Duration,
    /// Stops the read loop when cancelled. Without one the stream runs to completion.
    pub cancel: Option<CancellationToken>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
        }
    }
}

/// HTTP client for the summary service
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UsageGate for HttpBackend {
    async fn check(&self, user_id: &str) -> Result<UsageState, SummaryError> {
        let url = format!("{}/usage", self.base_url);
        debug!("Checking usage: {url}");

        let resp = self.client.get(&url).query(&[("userId", user_id)]).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(upstream_error(status, &body));
        }
        Ok(resp.json().await?)
    }
}

struct HttpChunkStream(reqwest::Response);

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SummaryError> {
        Ok(self.0.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl SummaryBackend for HttpBackend {
    async fn open(&self, request: &SummaryRequest) -> Result<SummaryResponse, SummaryError> {
        let url = format!("{}/summary", self.base_url);
        debug!(
            "Requesting summary for {} ({} segments)",
            request.video_id,
            request.transcript.len()
        );

        let resp = self.client.post(&url).json(request).send().await?;
        if resp.status() != reqwest::StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Ok(SummaryResponse::Rejected { status, body });
        }
        Ok(SummaryResponse::Stream(Box::new(HttpChunkStream(resp))))
    }
}

fn upstream_error(status: u16, body: &str) -> SummaryError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let details = parsed
        .details
        .or_else(|| (parsed.error.is_none() && !body.trim().is_empty()).then(|| body.trim().to_string()));
    SummaryError::Upstream {
        status,
        error: parsed.error,
        details,
    }
}

fn is_limit_rejection(status: u16, body: &str) -> bool {
    status == 402
        || serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.requires_payment)
            .unwrap_or(false)
}

enum Step {
    Continue,
    Finished { done: bool },
}

/// Drives one usage-check, request and stream read for a video.
pub struct SummaryConsumer<B, G> {
    backend: B,
    gate: G,
    options: StreamOptions,
}

impl<B: SummaryBackend, G: UsageGate> SummaryConsumer<B, G> {
    pub fn new(backend: B, gate: G) -> Self {
        Self {
            backend,
            gate,
            options: StreamOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn stream_summary(
        &self,
        request: &SummaryRequest,
        sink: &mut dyn SummarySink,
    ) -> Result<StreamOutcome, SummaryError> {
        let usage = match self.gate.check(&request.user_id).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("Usage check failed, continuing: {e}");
                UsageState::default()
            }
        };
        if usage.has_reached_limit {
            info!(
                "Usage limit reached for {} ({}/{})",
                request.user_id, usage.usage.current, usage.usage.limit
            );
            sink.upgrade(&usage);
            return Ok(StreamOutcome::LimitReached(usage));
        }

        let timeout = self.options.timeout;
        let response = tokio::time::timeout(timeout, self.backend.open(request))
            .await
            .map_err(|_| SummaryError::TimedOut(timeout))??;

        match response {
            SummaryResponse::Stream(mut body) => self.consume(&request.video_id, body.as_mut(), sink).await,
            SummaryResponse::Rejected { status, body } if is_limit_rejection(status, &body) => {
                info!("Summary service reports the usage limit for {}", request.user_id);
                let usage = UsageState::limit_reached();
                sink.upgrade(&usage);
                Ok(StreamOutcome::LimitReached(usage))
            }
            SummaryResponse::Rejected { status, body } => Err(upstream_error(status, &body)),
        }
    }

    async fn consume(
        &self,
        video_id: &VideoId,
        body: &mut dyn ChunkStream,
        sink: &mut dyn SummarySink,
    ) -> Result<StreamOutcome, SummaryError> {
        let mut artifact = SummaryArtifact::default();
        let mut lines = LineSplitter::default();
        let mut binder = LinkBinder::default();

        loop {
            let next = match &self.options.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        info!("Summary stream for {video_id} cancelled");
                        return Ok(StreamOutcome::Cancelled(artifact));
                    }
                    chunk = body.next_chunk() => chunk,
                },
                None => body.next_chunk().await,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return interrupted(e, artifact, video_id, &mut binder, sink),
            };

            for line in lines.push(&chunk) {
                if let Step::Finished { done } = apply_line(&line, video_id, &mut artifact, &mut binder, sink) {
                    return Ok(StreamOutcome::Completed { artifact, done });
                }
            }
        }

        if let Some(line) = lines.finish() {
            if let Step::Finished { done } = apply_line(&line, video_id, &mut artifact, &mut binder, sink) {
                return Ok(StreamOutcome::Completed { artifact, done });
            }
        }

        debug!("Summary stream for {video_id} ended without a done marker");
        artifact.complete();
        Ok(StreamOutcome::Completed { artifact, done: false })
    }
}

fn apply_line(
    line: &str,
    video_id: &VideoId,
    artifact: &mut SummaryArtifact,
    binder: &mut LinkBinder,
    sink: &mut dyn SummarySink,
) -> Step {
    let record: StreamRecord = match stream::parse_record(line) {
        Ok(record) => record,
        Err(e) => {
            warn!("Skipping stream line: {e}");
            return Step::Continue;
        }
    };

    if record.cached {
        artifact.set_cached(record.summary.unwrap_or_default());
        render_artifact(video_id, artifact, binder, sink);
        return Step::Finished { done: true };
    }

    if let Some(chunk) = record.chunk.as_deref().filter(|c| !c.is_empty()) {
        artifact.append(chunk);
        render_artifact(video_id, artifact, binder, sink);
    }

    if record.done {
        artifact.complete();
        sink.completed(artifact);
        return Step::Finished { done: true };
    }
    Step::Continue
}

fn render_artifact(video_id: &VideoId, artifact: &SummaryArtifact, binder: &mut LinkBinder, sink: &mut dyn SummarySink) {
    let view = render::format_summary(artifact.text(), video_id);
    let new_links = binder.bind(&view);
    sink.render(&RenderUpdate {
        text: artifact.text(),
        view: &view,
        new_links,
        state: artifact.state(),
    });
}

/// Partial text survives a broken transport; no text means start over.
fn interrupted(
    error: SummaryError,
    artifact: SummaryArtifact,
    video_id: &VideoId,
    binder: &mut LinkBinder,
    sink: &mut dyn SummarySink,
) -> Result<StreamOutcome, SummaryError> {
    if artifact.is_empty() {
        return Err(SummaryError::Interrupted(error.to_string()));
    }
    warn!("Summary stream for {video_id} interrupted after {} bytes: {error}", artifact.text().len());
    render_artifact(video_id, &artifact, binder, sink);
    sink.note(PARTIAL_NOTE);
    Ok(StreamOutcome::Partial(artifact))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn id() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    fn request() -> SummaryRequest {
        SummaryRequest {
            video_id: id(),
            transcript: vec![Segment {
                text: "hello".to_string(),
                start: 0.0,
                duration: 1.0,
            }],
            user_id: "user@example.com".to_string(),
            subscription: None,
        }
    }

    #[derive(Clone)]
    enum Piece {
        Bytes(&'static str),
        Fail,
    }

    struct ScriptedStream(VecDeque<Piece>);

    #[async_trait]
    impl ChunkStream for ScriptedStream {
        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SummaryError> {
            match self.0.pop_front() {
                Some(Piece::Bytes(s)) => Ok(Some(s.as_bytes().to_vec())),
                Some(Piece::Fail) => Err(SummaryError::Interrupted("connection reset".to_string())),
                None => Ok(None),
            }
        }
    }

    enum Script {
        Stream(Vec<Piece>),
        Reject(u16, &'static str),
        Hang,
    }

    struct FakeBackend {
        script: Script,
        opened: AtomicUsize,
    }

    impl FakeBackend {
        fn new(script: Script) -> Self {
            Self {
                script,
                opened: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SummaryBackend for FakeBackend {
        async fn open(&self, _request: &SummaryRequest) -> Result<SummaryResponse, SummaryError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Stream(pieces) => Ok(SummaryResponse::Stream(Box::new(ScriptedStream(
                    pieces.iter().cloned().collect(),
                )))),
                Script::Reject(status, body) => Ok(SummaryResponse::Rejected {
                    status: *status,
                    body: body.to_string(),
                }),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Err(SummaryError::Interrupted("never".to_string()))
                }
            }
        }
    }

    struct FakeGate(Result<UsageState, ()>);

    #[async_trait]
    impl UsageGate for FakeGate {
        async fn check(&self, _user_id: &str) -> Result<UsageState, SummaryError> {
            self.0
                .clone()
                .map_err(|_| SummaryError::Upstream {
                    status: 500,
                    error: Some("Failed to check usage".to_string()),
                    details: None,
                })
        }
    }

    fn open_gate() -> FakeGate {
        FakeGate(Ok(UsageState::default()))
    }

    #[derive(Default)]
    struct RecordingSink {
        renders: Vec<String>,
        states: Vec<ArtifactState>,
        links: Vec<String>,
        upgrades: usize,
        notes: Vec<String>,
        completed: usize,
    }

    impl SummarySink for RecordingSink {
        fn render(&mut self, update: &RenderUpdate<'_>) {
            self.renders.push(update.text.to_string());
            self.states.push(update.state);
            self.links.extend(update.new_links.iter().map(|l| l.token.clone()));
        }

        fn upgrade(&mut self, _usage: &UsageState) {
            self.upgrades += 1;
        }

        fn note(&mut self, message: &str) {
            self.notes.push(message.to_string());
        }

        fn completed(&mut self, _artifact: &SummaryArtifact) {
            self.completed += 1;
        }
    }

    async fn run(script: Script, gate: FakeGate) -> (Result<StreamOutcome, SummaryError>, RecordingSink, usize) {
        let consumer = SummaryConsumer::new(FakeBackend::new(script), gate);
        let mut sink = RecordingSink::default();
        let outcome = consumer.stream_summary(&request(), &mut sink).await;
        let opened = consumer.backend.opened.load(Ordering::SeqCst);
        (outcome, sink, opened)
    }

    #[tokio::test]
    async fn test_chunks_concatenate_in_order() {
        let script = Script::Stream(vec![
            Piece::Bytes("{\"chunk\": \"Hello\", \"done\": false}\n{\"chunk\": \", \"}\n"),
            Piece::Bytes("{\"chunk\": \"world\"}\n"),
            Piece::Bytes("{\"chunk\": \"\", \"done\": true}\n"),
        ]);
        let (outcome, sink, _) = run(script, open_gate()).await;

        match outcome.unwrap() {
            StreamOutcome::Completed { artifact, done } => {
                assert!(done);
                assert_eq!(artifact.text(), "Hello, world");
                assert_eq!(artifact.state(), ArtifactState::Complete);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sink.renders, vec!["Hello", "Hello, ", "Hello, world"]);
        assert_eq!(sink.completed, 1);
    }

    #[tokio::test]
    async fn test_records_split_across_chunks() {
        let script = Script::Stream(vec![
            Piece::Bytes("{\"chunk\": \"ab"),
            Piece::Bytes("c\"}\n{\"done\""),
            Piece::Bytes(": true}\n"),
        ]);
        let (outcome, sink, _) = run(script, open_gate()).await;
        assert!(matches!(outcome.unwrap(), StreamOutcome::Completed { done: true, .. }));
        assert_eq!(sink.renders, vec!["abc"]);
    }

    #[tokio::test]
    async fn test_cached_record_short_circuits() {
        let script = Script::Stream(vec![Piece::Bytes(
            "{\"chunk\": \"stale\"}\n{\"cached\": true, \"summary\": \"cached text\"}\n{\"chunk\": \"ignored\"}\n{\"done\": true}\n",
        )]);
        let (outcome, sink, _) = run(script, open_gate()).await;

        match outcome.unwrap() {
            StreamOutcome::Completed { artifact, done } => {
                assert!(done);
                assert_eq!(artifact.text(), "cached text");
                assert_eq!(artifact.state(), ArtifactState::Cached);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sink.renders.last().unwrap(), "cached text");
        assert_eq!(sink.states.last(), Some(&ArtifactState::Cached));
        assert_eq!(sink.completed, 0);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let script = Script::Stream(vec![Piece::Bytes(
            "{\"chunk\": \"a\"}\nnot json\n{\"chunk\": \n{\"chunk\": \"b\"}\n{\"done\": true}\n",
        )]);
        let (outcome, sink, _) = run(script, open_gate()).await;
        match outcome.unwrap() {
            StreamOutcome::Completed { artifact, done } => {
                assert!(done);
                assert_eq!(artifact.text(), "ab");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sink.renders.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_done_still_renders_without_hook() {
        let script = Script::Stream(vec![
            Piece::Bytes("{\"chunk\": \"first \"}\n"),
            Piece::Bytes("{\"chunk\": \"last'\"}"),
        ]);
        let (outcome, sink, _) = run(script, open_gate()).await;

        match outcome.unwrap() {
            StreamOutcome::Completed { artifact, done } => {
                assert!(!done);
                assert_eq!(artifact.text(), "first last'");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sink.renders.last().unwrap(), "first last'");
        assert_eq!(sink.completed, 0);
    }

    #[tokio::test]
    async fn test_done_hook_runs_once() {
        let script = Script::Stream(vec![Piece::Bytes(
            "{\"chunk\": \"x\"}\n{\"done\": true}\n{\"done\": true}\n",
        )]);
        let (_, sink, _) = run(script, open_gate()).await;
        assert_eq!(sink.completed, 1);
    }

    #[tokio::test]
    async fn test_limit_reached_skips_request() {
        let usage = UsageState {
            has_reached_limit: true,
            usage: UsageCounts { current: 5, limit: 5 },
            subscription: None,
        };
        let (outcome, sink, opened) = run(Script::Stream(vec![]), FakeGate(Ok(usage.clone()))).await;

        assert_eq!(outcome.unwrap(), StreamOutcome::LimitReached(usage));
        assert_eq!(opened, 0);
        assert_eq!(sink.upgrades, 1);
        assert!(sink.renders.is_empty());
    }

    #[tokio::test]
    async fn test_gate_failure_fails_open() {
        let script = Script::Stream(vec![Piece::Bytes("{\"chunk\": \"ok\"}\n{\"done\": true}\n")]);
        let (outcome, _, opened) = run(script, FakeGate(Err(()))).await;
        assert!(matches!(outcome.unwrap(), StreamOutcome::Completed { .. }));
        assert_eq!(opened, 1);
    }

    #[tokio::test]
    async fn test_backend_limit_matches_local_gate() {
        let body = r#"{"error": "You've reached your free tier limit.", "requiresPayment": true}"#;
        let (outcome, sink, _) = run(Script::Reject(402, body), open_gate()).await;
        assert!(matches!(outcome.unwrap(), StreamOutcome::LimitReached(u) if u.has_reached_limit));
        assert_eq!(sink.upgrades, 1);
    }

    #[tokio::test]
    async fn test_upstream_error_surfaced_verbatim() {
        let body = r#"{"error": "Rate limit exceeded", "details": "Too many requests in a short period. Please try again later."}"#;
        let (outcome, sink, _) = run(Script::Reject(429, body), open_gate()).await;

        match outcome.unwrap_err() {
            SummaryError::Upstream { status, error, details } => {
                assert_eq!(status, 429);
                assert_eq!(error.as_deref(), Some("Rate limit exceeded"));
                assert_eq!(
                    details.as_deref(),
                    Some("Too many requests in a short period. Please try again later.")
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink.upgrades, 0);
    }

    #[tokio::test]
    async fn test_non_json_error_body_kept_as_details() {
        let (outcome, _, _) = run(Script::Reject(502, "Bad Gateway"), open_gate()).await;
        match outcome.unwrap_err() {
            SummaryError::Upstream { details, error, .. } => {
                assert_eq!(details.as_deref(), Some("Bad Gateway"));
                assert!(error.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_distinct() {
        let consumer = SummaryConsumer::new(FakeBackend::new(Script::Hang), open_gate()).with_options(StreamOptions {
            timeout: Duration::from_millis(20),
            cancel: None,
        });
        let mut sink = RecordingSink::default();
        let err = consumer.stream_summary(&request(), &mut sink).await.unwrap_err();
        assert!(matches!(err, SummaryError::TimedOut(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_interruption_with_text_is_soft() {
        let script = Script::Stream(vec![
            Piece::Bytes("{\"chunk\": \"💡 Main Point:\\nPartial\"}\n"),
            Piece::Fail,
        ]);
        let (outcome, sink, _) = run(script, open_gate()).await;

        match outcome.unwrap() {
            StreamOutcome::Partial(artifact) => assert_eq!(artifact.text(), "💡 Main Point:\nPartial"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sink.notes, vec![PARTIAL_NOTE]);
        assert_eq!(sink.renders.len(), 2);
    }

    #[tokio::test]
    async fn test_interruption_without_text_is_hard() {
        let script = Script::Stream(vec![Piece::Bytes("{\"chunk\": \"\"}\n"), Piece::Fail]);
        let (outcome, sink, _) = run(script, open_gate()).await;
        assert!(matches!(outcome.unwrap_err(), SummaryError::Interrupted(_)));
        assert!(sink.notes.is_empty());
    }

    #[tokio::test]
    async fn test_links_bound_once_across_renders() {
        let script = Script::Stream(vec![
            Piece::Bytes("{\"chunk\": \"💡 Main Point:\\nx\\n\\n⏱️ Highlights:\\n* [00:10] - a\\n\"}\n"),
            Piece::Bytes("{\"chunk\": \"* [00:20] - b\\n\"}\n"),
            Piece::Bytes("{\"chunk\": \"* [00:10] - a again\\n\"}\n"),
            Piece::Bytes("{\"done\": true}\n"),
        ]);
        let (_, sink, _) = run(script, open_gate()).await;
        assert_eq!(sink.renders.len(), 3);
        assert_eq!(sink.links, vec!["00:10", "00:20"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_read_loop() {
        let token = CancellationToken::new();
        token.cancel();
        let script = Script::Stream(vec![Piece::Bytes("{\"chunk\": \"x\"}\n")]);
        let consumer = SummaryConsumer::new(FakeBackend::new(script), open_gate()).with_options(StreamOptions {
            cancel: Some(token),
            ..StreamOptions::default()
        });
        let mut sink = RecordingSink::default();

        let outcome = consumer.stream_summary(&request(), &mut sink).await.unwrap();
        assert!(matches!(outcome, StreamOutcome::Cancelled(a) if a.is_empty()));
        assert!(sink.renders.is_empty());
    }

    #[test]
    fn test_request_serializes_wire_names() {
        let mut req = request();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["videoId"], "dQw4w9WgXcQ");
        assert_eq!(json["userId"], "user@example.com");
        assert_eq!(json["transcript"][0]["text"], "hello");
        assert!(json.get("subscription").is_none());

        req.subscription = Some(Subscription {
            plan: "pro".to_string(),
            expiry_date: "2026-12-01T00:00:00Z".to_string(),
        });
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["subscription"]["expiryDate"], "2026-12-01T00:00:00Z");
    }

    #[test]
    fn test_usage_state_deserializes() {
        let json = serde_json::json!({
            "hasReachedLimit": false,
            "usage": {"current": 12, "limit": 400},
            "subscription": {"plan": "pro", "expiresAt": "2026-12-01T00:00:00"}
        });
        let usage: UsageState = serde_json::from_value(json).unwrap();
        assert!(!usage.has_reached_limit);
        assert_eq!(usage.usage, UsageCounts { current: 12, limit: 400 });
        assert_eq!(usage.subscription.unwrap().plan, "pro");
    }
}

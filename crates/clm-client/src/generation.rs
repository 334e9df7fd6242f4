//! Streaming AI generation for the contract editor
//!
//! The backend answers a generation request with `text/event-stream`. Each
//! event's data is a JSON frame:
//!
//! - `{"type":"delta","delta":"..."}` appends text
//! - `{"type":"done"}` ends the stream
//! - `{"type":"error","error":"..."}` ends the stream with a message
//!
//! Backends that put the frame type in the SSE `event:` field and raw text in
//! `data:` are accepted too. Unknown frames and keep-alives are skipped, and a
//! stream that closes cleanly without a `done` frame counts as done.
//!
//! The sink sees each delta once, as it arrives; `on_done` receives the
//! concatenation of every delta. Cancelling stops the read at once and calls
//! neither `on_done` nor `on_error`. Text already delivered stays delivered.

use eventsource_stream::{Event, Eventsource};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, instrument, warn};

use crate::client::{ApiClient, RequestDescriptor};
use crate::contracts::API_V1;

pub const GENERATE_STREAM_PATH: &str = "/templates/ai/generate/stream/";

const DEFAULT_STREAM_ERROR: &str = "AI generation failed";

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Full editor text the prompt applies to.
    pub current_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
}

/// Receiver of generation progress.
pub trait GenerationSink: Send {
    /// A new fragment, not the whole buffer.
    fn on_delta(&mut self, delta: &str);

    /// Stream finished; `text` is every delta concatenated.
    fn on_done(&mut self, text: &str);

    /// Stream failed. Called at most once; delivered deltas are not undone.
    fn on_error(&mut self, message: &str);
}

/// How a generation stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed(String),
    Failed { message: String, partial: String },
    Cancelled { partial: String },
}

impl GenerationOutcome {
    /// Text accumulated before the stream ended, however it ended.
    pub fn text(&self) -> &str {
        match self {
            GenerationOutcome::Completed(text) => text,
            GenerationOutcome::Failed { partial, .. } | GenerationOutcome::Cancelled { partial } => {
                partial
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Delta(String),
    Done,
    Error(String),
    Ignored,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    Delta {
        #[serde(default)]
        delta: String,
    },
    Done,
    Error {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

fn parse_frame(event: &Event) -> Frame {
    // Named delta events carry raw text; whitespace and "ping" are content.
    if event.event == "delta" && serde_json::from_str::<WireFrame>(&event.data).is_err() {
        return Frame::Delta(event.data.clone());
    }

    let data = event.data.trim();
    if data.is_empty() || matches!(data, "keepalive" | "keep-alive" | "ping") {
        return Frame::Ignored;
    }

    match serde_json::from_str::<WireFrame>(data) {
        Ok(WireFrame::Delta { delta }) => Frame::Delta(delta),
        Ok(WireFrame::Done) => Frame::Done,
        Ok(WireFrame::Error { error, message }) => Frame::Error(
            error
                .or(message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_STREAM_ERROR.to_string()),
        ),
        Ok(WireFrame::Other) => {
            debug!(data, "ignoring unknown frame type");
            Frame::Ignored
        }
        Err(_) => match event.event.as_str() {
            "done" => Frame::Done,
            "error" => Frame::Error(data.to_string()),
            other => {
                debug!(event = other, "ignoring unrecognized stream event");
                Frame::Ignored
            }
        },
    }
}

impl ApiClient {
    /// Run one generation stream to completion, failure or cancellation.
    #[instrument(skip_all, fields(prompt_len = request.prompt.len(), text_len = request.current_text.len()))]
    pub async fn stream_generation<S: GenerationSink + ?Sized>(
        &self,
        request: &GenerationRequest,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let req = RequestDescriptor::post(format!("{API_V1}{GENERATE_STREAM_PATH}"))
            .json(request)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));

        if cancel.is_cancelled() {
            debug!("generation cancelled before the stream opened");
            return GenerationOutcome::Cancelled {
                partial: String::new(),
            };
        }

        // Opening may refresh the session; a detached task lets that finish
        // and store the new tokens even when the caller stops waiting.
        let client = self.clone();
        let mut opening =
            tokio::spawn(async move { client.open_stream(req).await }.in_current_span());
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("generation cancelled while the stream was opening");
                return GenerationOutcome::Cancelled { partial: String::new() };
            }
            opened = &mut opening => opened,
        };
        let response = match opened {
            Ok(Ok(response)) => response,
            Err(e) => {
                let message = format!("generation task failed: {e}");
                warn!(error = %e, "generation stream task failed");
                sink.on_error(&message);
                return GenerationOutcome::Failed {
                    message,
                    partial: String::new(),
                };
            }
            Ok(Err(failure)) => {
                warn!(status = failure.status, error = %failure.message, "generation stream refused");
                sink.on_error(&failure.message);
                return GenerationOutcome::Failed {
                    message: failure.message,
                    partial: String::new(),
                };
            }
        };

        let mut events = std::pin::pin!(response.bytes_stream().eventsource());
        let mut text = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(received = text.len(), "generation cancelled");
                    return GenerationOutcome::Cancelled { partial: text };
                }
                next = events.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    let message = format!("generation stream failed: {e}");
                    warn!(received = text.len(), error = %e, "generation stream read failed");
                    sink.on_error(&message);
                    return GenerationOutcome::Failed {
                        message,
                        partial: text,
                    };
                }
                None => {
                    debug!(received = text.len(), "stream closed without a done frame");
                    sink.on_done(&text);
                    return GenerationOutcome::Completed(text);
                }
            };

            match parse_frame(&event) {
                Frame::Delta(delta) if delta.is_empty() => {}
                Frame::Delta(delta) => {
                    text.push_str(&delta);
                    sink.on_delta(&delta);
                }
                Frame::Done => {
                    debug!(received = text.len(), "generation complete");
                    sink.on_done(&text);
                    return GenerationOutcome::Completed(text);
                }
                Frame::Error(message) => {
                    warn!(received = text.len(), error = %message, "generation stream reported an error");
                    sink.on_error(&message);
                    return GenerationOutcome::Failed {
                        message,
                        partial: text,
                    };
                }
                Frame::Ignored => {}
            }
        }
    }
}

/// One editor's generation state: at most one stream runs at a time.
pub struct AiDraftSession {
    client: ApiClient,
    current: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<GenerationOutcome>,
}

impl AiDraftSession {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            current: None,
        }
    }

    /// Cancel any stream in flight, wait for it to stop, then start `request`.
    pub async fn start<S: GenerationSink + 'static>(&mut self, request: GenerationRequest, mut sink: S) {
        if let Some(previous) = self.current.take() {
            previous.cancel.cancel();
            match previous.task.await {
                Ok(outcome) => debug!(superseded = outcome.text().len(), "previous generation stopped"),
                Err(e) => warn!(error = %e, "previous generation task failed"),
            }
        }

        let cancel = CancellationToken::new();
        let client = self.client.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            client.stream_generation(&request, &mut sink, &token).await
        });
        self.current = Some(Running { cancel, task });
    }

    /// Cancel the current stream, if any. No callbacks fire for it.
    pub fn stop(&self) {
        if let Some(running) = &self.current {
            running.cancel.cancel();
        }
    }

    /// Token that cancels the current stream, for callers that need to stop
    /// it while awaiting `wait`.
    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.current.as_ref().map(|running| running.cancel.clone())
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Wait for the current stream to end. `None` when nothing was started.
    pub async fn wait(&mut self) -> Option<GenerationOutcome> {
        let running = self.current.take()?;
        Some(match running.task.await {
            Ok(outcome) => outcome,
            Err(e) => GenerationOutcome::Failed {
                message: format!("generation task failed: {e}"),
                partial: String::new(),
            },
        })
    }
}

impl Drop for AiDraftSession {
    fn drop(&mut self) {
        self.stop();
    }
}

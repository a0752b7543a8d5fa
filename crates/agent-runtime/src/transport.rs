//! Stream Transport
//!
//! Opens one cancellable streaming request per exchange and redispatches the
//! decoded frames through the exchange's [`EventBus`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = StreamClient::new(StreamConfig::from_env())?;
//! let handle = client.connect(request);
//! handle.add_event_listener(EventKind::Message, |event| { /* ... */ });
//! handle.add_event_listener(EventKind::Close, |_| { /* ... */ });
//! handle.start();
//! ```
//!
//! Lifecycle:
//!
//! - a `message_end` frame or an `event: close` line schedules shutdown after
//!   [`StreamConfig::close_grace`]; reading continues until then;
//! - end of body flushes the trailing fragment, honours a pending grace delay,
//!   then shuts down;
//! - shutdown cancels the request and dispatches `close`; a network failure
//!   dispatches `error` instead. Only one of the two is ever dispatched;
//! - lines already decoded from the current read are still delivered after a
//!   shutdown; the bus is cleared once the read task stops;
//! - a caller [`StreamHandle::close`] is a shutdown too, and never reports an
//!   error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use agent_core::{
    AgentError, EventBus, EventKind, ListenerId, Payload, Result, RunAgentStreamRequest,
    StreamEvent, TransportError,
};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::sse::{LineDecoder, WireLine};

/// Frame type that ends an exchange and schedules the delayed shutdown
const MESSAGE_END: &str = "message_end";

/// Client for opening streaming exchanges against one backend
#[derive(Clone, Debug)]
pub struct StreamClient {
    http: reqwest::Client,
    config: StreamConfig,
}

impl StreamClient {
    pub fn new(config: StreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(http, config))
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, ...)
    pub const fn with_http_client(http: reqwest::Client, config: StreamConfig) -> Self {
        Self { http, config }
    }

    pub fn from_env() -> Result<Self> {
        Self::new(StreamConfig::from_env())
    }

    pub const fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Prepare one exchange.
    ///
    /// The request is sent once [`StreamHandle::start`] is called, so
    /// listeners registered before that observe every event. A new exchange
    /// needs a new handle; close the previous one first.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the read task is
    /// spawned here.
    pub fn connect(&self, request: RunAgentStreamRequest) -> StreamHandle {
        let shared = Arc::new(Shared {
            exchange_id: Uuid::new_v4(),
            bus: EventBus::new(),
            cancel: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        });
        let (arm_tx, arm_rx) = oneshot::channel();

        let exchange = Exchange {
            shared: Arc::clone(&shared),
            http: self.http.clone(),
            endpoint: self.config.endpoint(),
            request,
            close_grace: self.config.close_grace,
        };
        tokio::spawn(async move {
            let shared = Arc::clone(&exchange.shared);
            if arm_rx.await.is_ok() {
                exchange.run().await;
            }
            // Nothing dispatches past this point.
            shared.bus.clear();
        });

        StreamHandle {
            shared,
            arm: Mutex::new(Some(arm_tx)),
        }
    }
}

/// State shared between a handle and its read task
struct Shared {
    exchange_id: Uuid,
    bus: EventBus,
    cancel: CancellationToken,
    terminated: AtomicBool,
}

impl Shared {
    /// Deliver one data line.
    ///
    /// Called only from the read task, which stops at its next suspension
    /// point once cancelled, so the rest of an already decoded read still
    /// reaches listeners after a shutdown.
    fn dispatch_message(&self, payload: Payload) {
        tracing::debug!(
            exchange_id = %self.exchange_id,
            frame_type = ?payload.frame_type(),
            "Frame received"
        );
        self.bus.dispatch(&StreamEvent::Message(payload));
    }

    /// Enter the terminal state: cancel the request and dispatch `event`.
    /// Returns false if the exchange had already terminated.
    fn terminate(&self, event: &StreamEvent) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        self.bus.dispatch(event);
        true
    }

    fn close(&self) -> bool {
        let closed = self.terminate(&StreamEvent::Close);
        if closed {
            tracing::info!(exchange_id = %self.exchange_id, "Exchange closed");
        }
        closed
    }

    fn fail(&self, error: TransportError) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::warn!(
            exchange_id = %self.exchange_id,
            error = %error,
            "Exchange transport failed"
        );
        self.terminate(&StreamEvent::Error(error));
    }
}

/// Caller-side handle of one exchange
pub struct StreamHandle {
    shared: Arc<Shared>,
    arm: Mutex<Option<oneshot::Sender<()>>>,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("exchange_id", &self.shared.exchange_id)
            .field("closed", &self.is_closed())
            .field("bus", &self.shared.bus)
            .finish()
    }
}

impl StreamHandle {
    pub fn exchange_id(&self) -> Uuid {
        self.shared.exchange_id
    }

    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.shared.bus.add_event_listener(kind, listener)
    }

    pub fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.bus.remove_event_listener(kind, id)
    }

    /// Send the request. Later calls do nothing.
    pub fn start(&self) {
        if let Some(arm) = self.disarm() {
            tracing::info!(exchange_id = %self.shared.exchange_id, "Exchange started");
            let _ = arm.send(());
        }
    }

    /// Cancel the request and dispatch `close`.
    ///
    /// Idempotent: after the exchange has terminated, by this call or on its
    /// own, nothing is dispatched again.
    pub fn close(&self) {
        self.shared.close();
        // Never started: release the waiting task without sending anything.
        drop(self.disarm());
    }

    /// Whether the exchange reached its terminal state
    pub fn is_closed(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    fn disarm(&self) -> Option<oneshot::Sender<()>> {
        self.arm.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        // Release the connection without dispatching anything.
        self.shared.cancel.cancel();
    }
}

/// The read side of one exchange, owned by its task
struct Exchange {
    shared: Arc<Shared>,
    http: reqwest::Client,
    endpoint: Result<Url>,
    request: RunAgentStreamRequest,
    close_grace: Duration,
}

impl Exchange {
    async fn run(self) {
        let endpoint = match &self.endpoint {
            Ok(url) => url.clone(),
            Err(e) => {
                self.shared.fail(TransportError::Connection(e.to_string()));
                return;
            }
        };

        let send = self
            .http
            .post(endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&self.request)
            .send();

        let response = tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => return,
            response = send => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.shared.fail(TransportError::Connection(e.to_string()));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.shared.fail(TransportError::Status {
                status: status.as_u16(),
                body,
            });
            return;
        }

        let mut body = response.bytes_stream();
        let mut decoder = LineDecoder::new();
        let mut shutdown_at: Option<Instant> = None;

        loop {
            let deadline = shutdown_at.unwrap_or_else(Instant::now);
            let next = tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => return,
                () = sleep_until(deadline), if shutdown_at.is_some() => {
                    self.shared.close();
                    return;
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    for line in decoder.push(&bytes) {
                        self.handle_line(line, &mut shutdown_at);
                    }
                }
                Some(Err(e)) => {
                    self.shared.fail(TransportError::Connection(e.to_string()));
                    return;
                }
                None => {
                    for line in decoder.finish() {
                        self.handle_line(line, &mut shutdown_at);
                    }
                    break;
                }
            }
        }

        tracing::debug!(exchange_id = %self.shared.exchange_id, "Response body ended");
        if self.shared.cancel.is_cancelled() {
            return;
        }
        if let Some(deadline) = shutdown_at {
            tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => return,
                () = sleep_until(deadline) => {}
            }
        }
        self.shared.close();
    }

    fn handle_line(&self, line: WireLine, shutdown_at: &mut Option<Instant>) {
        match line {
            WireLine::Data(text) => {
                let payload = Payload::parse(&text);
                let ends = payload.frame_type() == Some(MESSAGE_END);
                self.shared.dispatch_message(payload);
                if ends {
                    self.schedule_shutdown(shutdown_at);
                }
            }
            WireLine::Close => {
                tracing::debug!(exchange_id = %self.shared.exchange_id, "Close event received");
                self.schedule_shutdown(shutdown_at);
            }
        }
    }

    fn schedule_shutdown(&self, shutdown_at: &mut Option<Instant>) {
        shutdown_at.get_or_insert_with(|| Instant::now() + self.close_grace);
    }
}

//! Exchange Driver
//!
//! Runs one streaming exchange end to end: transport events are funneled
//! through a channel into a [`ChatAssembler`], so all assembly happens on the
//! caller's task in arrival order.

use agent_core::{
    AgentError, ChatAssembler, EventKind, ExchangeOutcome, Frame, HeuristicMatcher, InFlightMessage,
    Payload, Progress, Result, ResultMatcher, RunAgentStreamRequest, StreamEvent, TransportError,
};
use tokio::sync::mpsc;

use crate::transport::StreamClient;

enum Signal {
    Frame(Payload),
    Failed(TransportError),
    Closed,
}

/// Run one exchange with the default tool-result matcher.
///
/// `on_update` sees the in-flight message after every frame that changed it.
/// Returns the outcome once a terminal frame is assembled (closing the
/// transport), or `Incomplete` if the stream closed first. A transport
/// failure is returned as `Err`.
pub async fn run_exchange<F>(
    client: &StreamClient,
    request: RunAgentStreamRequest,
    on_update: F,
) -> Result<ExchangeOutcome>
where
    F: FnMut(&InFlightMessage),
{
    run_exchange_with(client, request, ChatAssembler::<HeuristicMatcher>::new(), on_update).await
}

/// Run one exchange through a prepared assembler
pub async fn run_exchange_with<M, F>(
    client: &StreamClient,
    request: RunAgentStreamRequest,
    mut assembler: ChatAssembler<M>,
    mut on_update: F,
) -> Result<ExchangeOutcome>
where
    M: ResultMatcher,
    F: FnMut(&InFlightMessage),
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = client.connect(request);

    let sender = tx.clone();
    handle.add_event_listener(EventKind::Message, move |event| {
        if let StreamEvent::Message(payload) = event {
            let _ = sender.send(Signal::Frame(payload.clone()));
        }
    });
    let sender = tx.clone();
    handle.add_event_listener(EventKind::Error, move |event| {
        if let StreamEvent::Error(error) = event {
            let _ = sender.send(Signal::Failed(error.clone()));
        }
    });
    handle.add_event_listener(EventKind::Close, move |_| {
        let _ = tx.send(Signal::Closed);
    });
    handle.start();

    // Every sender lives in a listener; clearing the bus ends the channel.
    while let Some(signal) = rx.recv().await {
        match signal {
            Signal::Frame(payload) => {
                let frame = match Frame::from_payload(&payload) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(
                            exchange_id = %handle.exchange_id(),
                            error = %e,
                            "Skipping undecodable frame"
                        );
                        continue;
                    }
                };
                match assembler.apply(&frame) {
                    Progress::Updated(snapshot) => on_update(&snapshot),
                    Progress::Completed(message) => {
                        handle.close();
                        return Ok(ExchangeOutcome::Completed(message));
                    }
                    Progress::Failed(failure) => {
                        handle.close();
                        return Ok(ExchangeOutcome::Failed(failure));
                    }
                    Progress::Unchanged | Progress::Ignored => {}
                }
            }
            Signal::Failed(error) => return Err(AgentError::Transport(error)),
            Signal::Closed => break,
        }
    }

    Ok(ExchangeOutcome::Incomplete(assembler.current().cloned()))
}

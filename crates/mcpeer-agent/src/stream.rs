//! Streaming plumbing: the producer side ([`EventSink`]) used by the run
//! loop, and the consumer side ([`AgentStream`]) handed to callers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::events::{AgentEvent, RunOutcome};

type Item = Result<AgentEvent, AgentError>;

/// Where a run reports its events.
pub(crate) enum EventSink {
    /// `run`: nobody is listening.
    Silent,
    /// `astream`: a bounded channel to an [`AgentStream`].
    Channel(mpsc::Sender<Item>),
}

impl EventSink {
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Channel(_))
    }

    /// Delivers an event, waiting while the consumer's buffer is full.
    pub async fn emit(&self, event: AgentEvent) -> Result<(), AgentError> {
        match self {
            Self::Silent => Ok(()),
            Self::Channel(tx) => tx.send(Ok(event)).await.map_err(|_| AgentError::Cancelled),
        }
    }

    /// Delivers the error that ended the run. Nothing happens if the
    /// consumer is gone.
    pub async fn fail(&self, err: AgentError) {
        if let Self::Channel(tx) = self {
            let _ = tx.send(Err(err)).await;
        }
    }

    /// Runs `fut`, abandoning it as soon as the consumer goes away.
    pub async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, AgentError> {
        match self {
            Self::Silent => Ok(fut.await),
            Self::Channel(tx) => tokio::select! {
                biased;
                out = fut => Ok(out),
                () = tx.closed() => Err(AgentError::Cancelled),
            },
        }
    }

    /// Runs a tool call. If the consumer goes away meanwhile, the call gets
    /// `grace` to finish before it is dropped, and the run is cancelled
    /// either way.
    pub async fn tool_call<F: Future>(&self, fut: F, grace: Duration) -> Result<F::Output, AgentError> {
        let Self::Channel(tx) = self else {
            return Ok(fut.await);
        };

        tokio::pin!(fut);
        tokio::select! {
            biased;
            out = &mut fut => Ok(out),
            () = tx.closed() => {
                log::info!("Stream dropped during a tool call; allowing {grace:?} for it to finish");
                if tokio::time::timeout(grace, fut).await.is_err() {
                    log::warn!("Tool call still running after {grace:?}; dropping it");
                }
                Err(AgentError::Cancelled)
            }
        }
    }
}

/// Events of a streamed run, in order.
///
/// Dropping the stream cancels the run: no further steps start, and an
/// in-flight tool call is given `cancel_grace` to finish before it is dropped.
pub struct AgentStream {
    rx: mpsc::Receiver<Item>,
}

impl AgentStream {
    pub(crate) const fn new(rx: mpsc::Receiver<Item>) -> Self {
        Self { rx }
    }

    /// Drains the stream and returns the run's outcome.
    ///
    /// # Errors
    /// Returns the error that ended the run.
    pub async fn outcome(mut self) -> Result<RunOutcome, AgentError> {
        while let Some(item) = self.next().await {
            if let AgentEvent::Finished(outcome) = item? {
                return Ok(outcome);
            }
        }
        Err(AgentError::Cancelled)
    }
}

impl Stream for AgentStream {
    type Item = Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

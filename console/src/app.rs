//! Console session
//!
//! One submit cycle per input line. While a cycle runs, the interrupt
//! future (Ctrl-C in the binary) cancels it through a cloned
//! [`StreamHandle`](suggest_core::StreamHandle); the session stays usable
//! for the next line.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, info};

use suggest_core::{
    ConsumerConfig, ConsumerEvent, CycleOutcome, Message, ResponseTransport, StreamConsumer,
    SuggestError,
};

/// What happened to one input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Turn {
    /// Blank input, nothing sent
    Skipped,
    /// The submit was refused
    Rejected(SuggestError),
    /// The cycle ran to an end
    Finished(CycleOutcome),
}

/// Console over a stream consumer
pub struct Session<T> {
    consumer: StreamConsumer<T>,
}

impl<T: ResponseTransport + 'static> Session<T> {
    /// Create a session and the event channel its renderer reads
    pub fn new(
        transport: T,
        config: ConsumerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConsumerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = StreamConsumer::with_config(transport, config).with_events(tx);
        (Self { consumer }, rx)
    }

    /// Conversation so far
    pub fn messages(&self) -> &[Message] {
        self.consumer.messages()
    }

    /// Underlying consumer
    pub fn consumer(&self) -> &StreamConsumer<T> {
        &self.consumer
    }

    /// Send one line and wait for its suggestion
    ///
    /// `interrupt` resolving before the cycle ends cancels the stream.
    pub async fn ask<F>(&mut self, line: &str, interrupt: F) -> Turn
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let text = line.trim();
        if text.is_empty() {
            return Turn::Skipped;
        }

        let handle = match self.consumer.submit(text) {
            Ok(handle) => handle,
            Err(e) => return Turn::Rejected(e),
        };

        let canceller = handle.clone();
        let watcher = tokio::spawn(async move {
            interrupt.await;
            debug!(stream_id = %canceller.id(), "Interrupt received");
            canceller.cancel();
        });

        let outcome = self.consumer.run().await;
        watcher.abort();

        match outcome {
            Some(outcome) => {
                info!(stream_id = %handle.id(), outcome = ?outcome, "Turn finished");
                Turn::Finished(outcome)
            }
            None => Turn::Skipped,
        }
    }
}

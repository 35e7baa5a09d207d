use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use arrow_array::RecordBatch;
use async_trait::async_trait;
use mrdc_core::{BatchTx, Message, Operator, Source, SourceError, send_batch};
use tokio_util::sync::CancellationToken;

/// A scripted failure: sent after `after` batches went out
struct Failure {
    after: usize,
    error: SourceError,
}

/// Serves pre-built raw batches; used to drive pipelines without a network
///
/// Failures queued with [`fail_after`](Self::fail_after) are consumed one per
/// run, so a source can be made to fail a fixed number of times before it
/// succeeds.
pub struct MemorySource {
    id: String,
    batches: Vec<RecordBatch>,
    failures: VecDeque<Failure>,
    stall: Option<Duration>,
    runs: Arc<AtomicU32>,
}

impl MemorySource {
    pub fn new(table: &str, batches: Vec<RecordBatch>) -> Self {
        Self {
            id: format!("{table}:memory"),
            batches,
            failures: VecDeque::new(),
            stall: None,
            runs: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make the next unscripted run fail after sending `after` batches
    pub fn fail_after(mut self, after: usize, error: SourceError) -> Self {
        self.failures.push_back(Failure { after, error });
        self
    }

    /// Wait before sending anything (until cancelled, for long stalls)
    pub fn stall(mut self, duration: Duration) -> Self {
        self.stall = Some(duration);
        self
    }

    /// Shared counter of how many times [`Source::run`] was entered
    pub fn runs(&self) -> Arc<AtomicU32> {
        self.runs.clone()
    }
}

impl Operator for MemorySource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(stall) = self.stall {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(stall) => {}
            }
        }

        let mut failure = self.failures.pop_front();
        for (i, batch) in self.batches.iter().enumerate() {
            if let Some(f) = failure.take_if(|f| f.after == i) {
                return Err(f.error);
            }
            send_batch(&tx, batch.clone()).await?;
        }
        if let Some(f) = failure {
            return Err(f.error);
        }
        tx.send(Message::Eos)
            .await
            .map_err(|_| SourceError::ChannelClosed("eos receiver dropped"))
    }
}

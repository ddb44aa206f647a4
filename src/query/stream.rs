//! Streaming delivery of chunk results
//!
//! [`StreamingPipeline`] hands each chunk's rows to a handler as soon as the
//! chunk completes instead of buffering the whole result set. Chunks run
//! one after another; the handler for chunk `n` returns before chunk `n + 1`
//! is sent to the store.
//!
//! The same sequence is available as a [`futures::Stream`] through
//! [`StreamingPipeline::into_stream`], which ends after the first error.
//!
//! # Example
//!
//! ```rust,no_run
//! use dau_pipeline::query::{BatchExecutor, StreamingPipeline};
//!
//! # async fn example(executor: BatchExecutor) -> dau_pipeline::Result<()> {
//! let mut pipeline = StreamingPipeline::new(executor);
//! let mut rows = 0;
//! let summary = pipeline
//!     .stream(|partial| {
//!         rows += partial.len();
//!         Ok(())
//!     })
//!     .await?;
//! assert_eq!(summary.rows, rows);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::query::executor::{BatchExecutor, PartialResult};
use futures::stream::{self, Stream};
use std::pin::Pin;

/// Boxed stream of chunk results
pub type PartialResultStream = Pin<Box<dyn Stream<Item = Result<PartialResult>> + Send>>;

/// What a completed stream delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Chunks handed to the handler
    pub chunks: usize,
    /// Statements covered by those chunks
    pub statements: usize,
    /// Rows handed to the handler
    pub rows: usize,
}

/// Delivers each executed chunk to a handler in statement order
pub struct StreamingPipeline {
    executor: BatchExecutor,
}

impl StreamingPipeline {
    /// Wrap an executor
    pub fn new(executor: BatchExecutor) -> Self {
        Self { executor }
    }

    /// Underlying executor
    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    /// Execute all pending statements, calling `handler` once per chunk
    ///
    /// The handler borrows the chunk's rows and cannot keep them past its
    /// return. It is never called for a failed chunk. If a chunk fails, or
    /// the handler itself returns an error, streaming stops and the error
    /// is returned; chunks after that point are not executed. A chunk leaves
    /// the executor only once the handler accepted it, so a later `stream`
    /// call re-runs a rejected chunk.
    pub async fn stream<F>(&mut self, mut handler: F) -> Result<StreamSummary>
    where
        F: FnMut(&PartialResult) -> Result<()>,
    {
        let mut summary = StreamSummary::default();
        if self.executor.note_if_empty() {
            return Ok(summary);
        }

        while let Some(partial) = self.executor.run_next_chunk().await? {
            if let Err(e) = handler(&partial) {
                self.executor.reject_chunk(&partial, &e);
                return Err(e);
            }
            self.executor.commit_chunk(&partial);
            summary.chunks += 1;
            summary.statements += partial.statements;
            summary.rows += partial.len();
        }

        Ok(summary)
    }

    /// Turn the pipeline into a lazy stream of chunk results
    ///
    /// Each poll executes at most one chunk. The stream yields `Err` once
    /// and then ends if a chunk fails.
    pub fn into_stream(self) -> PartialResultStream {
        let executor = self.executor;
        if executor.note_if_empty() {
            return Box::pin(stream::empty::<Result<PartialResult>>());
        }

        Box::pin(stream::unfold(
            Some(executor),
            |state| async move {
                let mut executor = state?;
                match executor.execute_next_chunk().await {
                    Ok(Some(partial)) => Some((Ok(partial), Some(executor))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), None)),
                }
            },
        ))
    }
}

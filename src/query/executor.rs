//! Batch Executor - bounded statement execution
//!
//! Accumulates bound statements and runs them against the store in chunks
//! of at most `max_batch_size` statements. The chunk bound is the only
//! backpressure the pipeline applies to the store: it caps request size
//! and the number of statements in flight for one executor.
//!
//! # Chunk lifecycle
//!
//! ```text
//!  add_statement ──► StatementSet ──► next chunk (≤ max_batch_size)
//!                                        │
//!                                        ▼
//!                               acquire session (scoped)
//!                                        │
//!                        ┌───── ok ──────┴────── err ─────┐
//!                        ▼                                ▼
//!               consume chunk from set           failed = true,
//!               yield PartialResult              chunk stays pending
//! ```
//!
//! Statements leave the set only once the chunk holding them succeeded, so
//! after a failure the executor can be re-run to retry the remainder.

use crate::config::ExecutionConfig;
use crate::error::{Error, ExecutionError, Result};
use crate::metrics;
use crate::query::statement::{BoundStatement, QueryTemplate, StatementSet};
use crate::store::SessionPool;
use crate::types::{Row, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

// ============================================================================
// Executor Configuration
// ============================================================================

/// Configuration for batch execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum statements per chunk (default: 32)
    pub max_batch_size: usize,

    /// Per-chunk timeout (default: none)
    pub chunk_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            chunk_timeout: None,
        }
    }
}

impl From<&ExecutionConfig> for ExecutorConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            chunk_timeout: config.chunk_timeout(),
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum statements per chunk
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set per-chunk timeout
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::Configuration(
                "max_batch_size must be > 0".to_string(),
            ));
        }
        if matches!(self.chunk_timeout, Some(t) if t.is_zero()) {
            return Err(Error::Configuration(
                "chunk_timeout must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Partial Result
// ============================================================================

/// Rows produced by executing one chunk
#[derive(Debug, Clone)]
pub struct PartialResult {
    /// Zero-based chunk index within the executor
    pub sequence: usize,

    /// Statements the chunk contained
    pub statements: usize,

    /// Rows in statement order
    pub rows: Vec<Row>,
}

impl PartialResult {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the chunk returned no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum a non-negative integer column across all rows
    pub fn sum_counts(&self, column: &str) -> std::result::Result<u64, ExecutionError> {
        self.rows.iter().try_fold(0u64, |acc, row| {
            let value = row.get_i64(column)?;
            let value = u64::try_from(value).map_err(|_| ExecutionError::TypeMismatch {
                column: column.to_string(),
                expected: "non-negative int",
            })?;
            Ok(acc.saturating_add(value))
        })
    }
}

// ============================================================================
// Batch Executor
// ============================================================================

/// Executes a fixed query template over many parameter sets in bounded chunks
///
/// One executor is created per logical request and discarded once its
/// statements have been streamed.
pub struct BatchExecutor {
    /// Session source
    pool: Arc<SessionPool>,

    /// Template every statement is bound from
    template: QueryTemplate,

    /// Executor configuration
    config: ExecutorConfig,

    /// Statements not yet executed successfully
    statements: StatementSet,

    /// Set when the last execution attempt failed
    failed: bool,

    /// Index of the next chunk to execute
    next_chunk: usize,
}

impl BatchExecutor {
    /// Create an executor for `template`
    pub fn new(
        pool: Arc<SessionPool>,
        template: QueryTemplate,
        config: ExecutorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            template,
            config,
            statements: StatementSet::new(),
            failed: false,
            next_chunk: 0,
        })
    }

    /// Bind `params` to the template and queue the statement
    ///
    /// Nothing bounds the number of queued statements; chunking happens at
    /// execution time.
    pub fn add_statement(&mut self, params: Vec<Value>) -> Result<()> {
        let statement = self.template.bind(params)?;
        self.statements.push(statement);
        Ok(())
    }

    /// Statements still waiting to run
    pub fn pending(&self) -> usize {
        self.statements.len()
    }

    /// Pending statements in execution order
    pub fn pending_statements(&self) -> impl Iterator<Item = &BoundStatement> {
        self.statements.iter()
    }

    /// True when the last execution attempt failed
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Chunks executed successfully so far
    pub fn chunks_executed(&self) -> usize {
        self.next_chunk
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Template statements are bound from
    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Number of chunks the pending statements split into
    pub fn planned_chunks(&self) -> usize {
        self.statements.len().div_ceil(self.config.max_batch_size)
    }

    /// Log and count an execution request with nothing queued
    ///
    /// Returns true when the set is empty.
    pub(crate) fn note_if_empty(&self) -> bool {
        if self.statements.is_empty() {
            warn!(
                "No bound statements, either this query was already executed or no statements were added"
            );
            metrics::record_empty_request();
            true
        } else {
            false
        }
    }

    /// Execute every pending statement, one chunk at a time
    ///
    /// Returns one [`PartialResult`] per chunk in statement order. An empty
    /// set is a logged no-op returning no results. On error, chunks that
    /// already succeeded are gone from the set; the failing chunk and all
    /// later ones stay pending.
    pub async fn execute(&mut self) -> Result<Vec<PartialResult>> {
        if self.note_if_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(self.planned_chunks());
        while let Some(partial) = self.execute_next_chunk().await? {
            results.push(partial);
        }
        Ok(results)
    }

    /// Execute the next chunk, if any statements are pending
    pub async fn execute_next_chunk(&mut self) -> Result<Option<PartialResult>> {
        let partial = self.run_next_chunk().await?;
        if let Some(partial) = &partial {
            self.commit_chunk(partial);
        }
        Ok(partial)
    }

    /// Run the next chunk without removing its statements from the set
    ///
    /// The caller decides with [`commit_chunk`](Self::commit_chunk) or
    /// [`reject_chunk`](Self::reject_chunk) whether the chunk is done.
    pub(crate) async fn run_next_chunk(&mut self) -> Result<Option<PartialResult>> {
        if self.statements.is_empty() {
            return Ok(None);
        }

        let sequence = self.next_chunk;
        let chunk = self.statements.next_chunk(self.config.max_batch_size);
        let size = chunk.len();

        let start = Instant::now();
        let outcome = run_chunk(&self.pool, self.config.chunk_timeout, sequence, chunk).await;
        let elapsed = start.elapsed();
        metrics::record_chunk(outcome.is_ok(), size, elapsed.as_secs_f64());

        match outcome {
            Ok(rows) => {
                debug!(
                    chunk = sequence,
                    statements = size,
                    rows = rows.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "Chunk executed"
                );
                Ok(Some(PartialResult {
                    sequence,
                    statements: size,
                    rows,
                }))
            },
            Err(e) => {
                self.failed = true;
                error!(
                    chunk = sequence,
                    statements = size,
                    pending = self.statements.len(),
                    error = %e,
                    "Chunk execution failed"
                );
                Err(e)
            },
        }
    }

    /// Drop a delivered chunk's statements from the set
    pub(crate) fn commit_chunk(&mut self, partial: &PartialResult) {
        self.statements.consume(partial.statements);
        self.next_chunk += 1;
        if self.statements.is_empty() {
            self.failed = false;
        }
    }

    /// Keep a chunk whose rows could not be processed pending for retry
    pub(crate) fn reject_chunk(&mut self, partial: &PartialResult, error: &Error) {
        self.failed = true;
        warn!(
            chunk = partial.sequence,
            statements = partial.statements,
            pending = self.statements.len(),
            %error,
            "Chunk rows rejected, statements kept for retry"
        );
    }
}

/// Run one chunk on a freshly acquired session
///
/// The session is held only for the duration of this call.
async fn run_chunk(
    pool: &SessionPool,
    timeout: Option<Duration>,
    chunk: usize,
    statements: &[BoundStatement],
) -> Result<Vec<Row>> {
    let mut session = pool.get().await?;

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, session.execute(statements)).await {
            Ok(result) => result,
            Err(_) => return Err(ExecutionError::Timeout { chunk, after: limit }.into()),
        },
        None => session.execute(statements).await,
    };

    result.map_err(|e| {
        ExecutionError::Store {
            chunk,
            message: e.to_string(),
        }
        .into()
    })
}

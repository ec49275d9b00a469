//! Batch dispatcher: resolves raw requests against an operation family and
//! executes them in submission order.
//!
//! A batch goes through two phases:
//!
//! 1. **Load** (`Dispatcher::load`): every request is validated against the
//!    family's vocabulary and handler table. Rejected requests are recorded
//!    as errors and skipped; loading never stops early.
//! 2. **Execute** (`Dispatcher::execute`): resolved operations run one by one.
//!    After each success the cache invalidator runs. The first failure aborts
//!    the remaining queue; results of earlier operations are kept.
//!
//! All per-batch state lives in [`Batch`], so a single dispatcher can serve
//! any number of batches, including concurrently from several threads.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use opfactory_core::{
    derive_handler_id, CacheInvalidator, FailureCause, HandlerFn, HandlerId, HandlerTable,
    OperationFailure, OperationFamily, OperationRequest, OperationScope, Payload, RejectReason,
    RejectedRequest, ResultEntry,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::outcome::{BatchOutcome, ResultBuckets};

// ---------------------------------------------------------------------------
// ResolvedOperation
// ---------------------------------------------------------------------------

/// A validated request bound to its handler.
pub struct ResolvedOperation<F: OperationFamily> {
    handler_id: HandlerId,
    handler: HandlerFn<F>,
    payload: Payload,
}

impl<F: OperationFamily> ResolvedOperation<F> {
    #[must_use]
    pub fn handler_id(&self) -> &HandlerId {
        &self.handler_id
    }

    /// Handler payload, with `type` and `action` already stripped.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

impl<F: OperationFamily> fmt::Debug for ResolvedOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOperation")
            .field("handler_id", &self.handler_id)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// State of one batch between the load and execute phases.
///
/// Produced by [`Dispatcher::load`] and consumed by [`Dispatcher::execute`];
/// it is single-use and never reset.
pub struct Batch<F: OperationFamily> {
    operations: Vec<ResolvedOperation<F>>,
    results: ResultBuckets,
    errors: Vec<String>,
    dry_run: bool,
}

impl<F: OperationFamily> Batch<F> {
    /// Resolved operations queued for execution, in submission order.
    #[must_use]
    pub fn operations(&self) -> &[ResolvedOperation<F>] {
        &self.operations
    }

    /// Errors recorded so far (load-phase rejections).
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// True when at least one operation is queued.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        !self.operations.is_empty()
    }
}

impl<F: OperationFamily> fmt::Debug for Batch<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("operations", &self.operations)
            .field("results", &self.results)
            .field("errors", &self.errors)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatcher bound to one operation family and one cache invalidator.
///
/// The handler table is built once, at construction.
pub struct Dispatcher<F: OperationFamily> {
    family: F,
    handlers: HandlerTable<F>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl<F: OperationFamily> Dispatcher<F> {
    #[must_use]
    pub fn new(family: F, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        let handlers = family.handlers();
        for id in handlers.unreachable_ids(&family) {
            warn!(
                family = family.name(),
                handler = %id,
                "handler is outside the family vocabulary and can never run"
            );
        }
        debug!(
            family = family.name(),
            handlers = handlers.len(),
            "built handler table"
        );
        Self {
            family,
            handlers,
            invalidator,
        }
    }

    #[must_use]
    pub fn family(&self) -> &F {
        &self.family
    }

    #[must_use]
    pub fn handlers(&self) -> &HandlerTable<F> {
        &self.handlers
    }

    /// Load phase: validates and resolves every request.
    ///
    /// Each rejected request adds exactly one error to the batch; valid
    /// requests are queued in submission order regardless of rejections
    /// around them.
    pub fn load<I>(&self, requests: I, dry_run: bool) -> Batch<F>
    where
        I: IntoIterator<Item = OperationRequest>,
    {
        let mut batch = Batch {
            operations: Vec::new(),
            results: ResultBuckets::new(),
            errors: Vec::new(),
            dry_run,
        };

        for (index, request) in requests.into_iter().enumerate() {
            match self.resolve(request) {
                Ok(operation) => {
                    debug!(index, handler = %operation.handler_id, "resolved operation");
                    batch.operations.push(operation);
                }
                Err(reason) => {
                    let rejected = RejectedRequest { index, reason };
                    warn!(family = self.family.name(), error = %rejected, "rejected operation request");
                    metrics::counter!("opfactory_requests_rejected_total", "family" => self.family.name())
                        .increment(1);
                    batch.errors.push(rejected.to_string());
                }
            }
        }

        batch
    }

    /// Validates one request and binds it to its handler.
    ///
    /// # Errors
    ///
    /// Returns the first applicable [`RejectReason`]: type checks run before
    /// action checks, which run before the handler lookup.
    pub fn resolve(&self, request: OperationRequest) -> Result<ResolvedOperation<F>, RejectReason> {
        let op_type = match request.op_type() {
            None | Some(Value::Null) => return Err(RejectReason::MissingType),
            Some(Value::String(s)) if self.family.valid_types().iter().any(|t| *t == s.as_str()) => s.clone(),
            Some(other) => return Err(RejectReason::InvalidType(RejectReason::render_value(other))),
        };

        let action = match request.action() {
            None | Some(Value::Null) => return Err(RejectReason::MissingAction),
            Some(Value::String(s)) if self.family.valid_actions().iter().any(|a| *a == s.as_str()) => s.clone(),
            Some(other) => {
                return Err(RejectReason::InvalidAction(RejectReason::render_value(other)))
            }
        };

        let handler_id = derive_handler_id(&op_type, &action);
        let Some(handler) = self.handlers.get(&handler_id) else {
            return Err(RejectReason::NoHandler {
                handler_id,
                op_type,
                action,
            });
        };

        Ok(ResolvedOperation {
            handler_id,
            handler,
            payload: request.into_payload(),
        })
    }

    /// Execute phase: runs queued operations in order and aggregates output.
    ///
    /// Never fails: a handler or invalidation failure is converted into one
    /// `Operation: {handler_id}: {message}` error, the remaining queue is
    /// dropped, and the results gathered before the failure are returned.
    pub fn execute(&self, batch: Batch<F>) -> BatchOutcome {
        let Batch {
            operations,
            mut results,
            mut errors,
            dry_run,
        } = batch;

        if operations.is_empty() {
            return BatchOutcome { results, errors };
        }

        let started = Instant::now();
        let queued = operations.len();
        let mut completed = 0usize;
        let mut state = F::BatchState::default();

        for operation in operations {
            match self.execute_one(operation, dry_run, &mut state) {
                Ok((handler_id, entries)) => {
                    info!(handler = %handler_id, entries = entries.len(), dry_run, "operation complete");
                    metrics::counter!("opfactory_operations_executed_total", "handler" => handler_id.to_string())
                        .increment(1);
                    results.append(handler_id, entries);
                    completed += 1;
                }
                Err(failure) => {
                    error!(
                        handler = %failure.handler_id(),
                        code = failure.code(),
                        error = %failure.message(),
                        skipped = queued - completed - 1,
                        "operation failed, aborting batch"
                    );
                    metrics::counter!("opfactory_operations_failed_total", "handler" => failure.handler_id().to_string())
                        .increment(1);
                    errors.push(failure.to_string());
                    break;
                }
            }
        }

        metrics::histogram!("opfactory_batch_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            family = self.family.name(),
            queued,
            completed,
            errors = errors.len(),
            "batch finished"
        );

        BatchOutcome { results, errors }
    }

    /// Loads and executes in one call.
    pub fn run<I>(&self, requests: I, dry_run: bool) -> BatchOutcome
    where
        I: IntoIterator<Item = OperationRequest>,
    {
        self.execute(self.load(requests, dry_run))
    }

    fn execute_one(
        &self,
        operation: ResolvedOperation<F>,
        dry_run: bool,
        state: &mut F::BatchState,
    ) -> Result<(HandlerId, Vec<ResultEntry>), OperationFailure> {
        let ResolvedOperation {
            handler_id,
            handler,
            payload,
        } = operation;

        let mut scope = OperationScope::new(&handler_id, dry_run, state);
        let outcome = handler(&self.family, &mut scope, &payload)
            .map_err(FailureCause::from)
            .and_then(|()| {
                self.invalidator
                    .invalidate()
                    .map_err(FailureCause::Invalidation)
            });
        let entries = scope.into_entries();

        match outcome {
            Ok(()) => Ok((handler_id, entries)),
            Err(cause) => Err(OperationFailure::new(handler_id, payload, cause)),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

/// Object-safe view of a dispatcher, for callers that do not care which
/// family sits behind it (HTTP handlers, the CLI).
pub trait BatchRunner: Send + Sync {
    fn family_name(&self) -> &'static str;

    fn run_batch(&self, requests: Vec<OperationRequest>, dry_run: bool) -> BatchOutcome;
}

impl<F: OperationFamily> BatchRunner for Dispatcher<F> {
    fn family_name(&self) -> &'static str {
        self.family.name()
    }

    fn run_batch(&self, requests: Vec<OperationRequest>, dry_run: bool) -> BatchOutcome {
        self.run(requests, dry_run)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

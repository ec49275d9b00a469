use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::context::OperationScope;
use crate::error::HandlerError;
use crate::handler_id::{derive_handler_id, HandlerId};
use crate::types::Payload;

/// A handler bound to one `(type, action)` pair of family `F`.
///
/// Receives the family instance, the scope for its result bucket and batch
/// state, and the payload with `type`/`action` stripped.
pub type HandlerFn<F> = fn(
    &F,
    &mut OperationScope<'_, <F as OperationFamily>::BatchState>,
    &Payload,
) -> Result<(), HandlerError>;

/// Contract every operation family implements.
///
/// A family declares the outer vocabulary of types and actions it accepts
/// and the table of handlers it actually implements. Not every pair from
/// `valid_types() x valid_actions()` needs a handler; requests for a pair
/// without one are rejected at load time.
pub trait OperationFamily: Send + Sync + 'static {
    /// Scratch state shared by the operations of one batch. A fresh value is
    /// created each time a batch starts executing; families without any use
    /// `()`.
    type BatchState: Default;

    /// Stable name used in diagnostics, e.g. `"enrollment"`.
    fn name(&self) -> &'static str;

    /// Closed set of accepted `type` values.
    fn valid_types(&self) -> &[&'static str];

    /// Closed set of accepted `action` values.
    fn valid_actions(&self) -> &[&'static str];

    /// Handler table for this family. Called once when a dispatcher is built.
    fn handlers(&self) -> HandlerTable<Self>
    where
        Self: Sized;
}

/// Explicit mapping from derived handler ids to handler functions.
pub struct HandlerTable<F: OperationFamily> {
    handlers: HashMap<HandlerId, HandlerFn<F>>,
}

impl<F: OperationFamily> HandlerTable<F> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, op_type: &str, action: &str, handler: HandlerFn<F>) -> Self {
        self.register(op_type, action, handler);
        self
    }

    /// Binds `handler` under the id derived from `op_type` and `action`.
    /// A second registration for the same id replaces the first.
    pub fn register(&mut self, op_type: &str, action: &str, handler: HandlerFn<F>) -> HandlerId {
        let id = derive_handler_id(op_type, action);
        self.handlers.insert(id.clone(), handler);
        id
    }

    #[must_use]
    pub fn get(&self, id: &HandlerId) -> Option<HandlerFn<F>> {
        self.handlers.get(id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: &HandlerId) -> bool {
        self.handlers.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered ids in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<&HandlerId> {
        let mut ids: Vec<_> = self.handlers.keys().collect();
        ids.sort();
        ids
    }

    /// Registered ids that no `(type, action)` pair of `family`'s
    /// vocabulary derives to. Requests can never reach these handlers.
    #[must_use]
    pub fn unreachable_ids(&self, family: &F) -> Vec<&HandlerId> {
        let reachable: HashSet<HandlerId> = family
            .valid_types()
            .iter()
            .flat_map(|t| {
                family
                    .valid_actions()
                    .iter()
                    .map(move |a| derive_handler_id(t, a))
            })
            .collect();
        self.ids()
            .into_iter()
            .filter(|id| !reachable.contains(*id))
            .collect()
    }
}

impl<F: OperationFamily> Default for HandlerTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: OperationFamily> fmt::Debug for HandlerTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("ids", &self.ids())
            .finish()
    }
}

/// Post-operation cache flush, invoked once after every successful operation.
///
/// The dispatcher treats it as opaque. A failure aborts the batch exactly
/// like a handler failure.
pub trait CacheInvalidator: Send + Sync {
    /// Drops whatever cached state the last operation may have made stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying cache could not be flushed.
    fn invalidate(&self) -> anyhow::Result<()>;
}

impl<T> CacheInvalidator for T
where
    T: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn invalidate(&self) -> anyhow::Result<()> {
        self()
    }
}

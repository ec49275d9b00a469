use crate::handler_id::HandlerId;
use crate::types::ResultEntry;

/// What a handler sees of the batch while it runs.
///
/// Carries the dry-run flag, the handler's result bucket and the family's
/// per-batch state `S`. Entries pushed here are committed to the batch
/// outcome only if the handler and the follow-up cache invalidation both
/// succeed.
#[derive(Debug)]
pub struct OperationScope<'a, S = ()> {
    handler_id: &'a HandlerId,
    dry_run: bool,
    state: &'a mut S,
    entries: Vec<ResultEntry>,
}

impl<'a, S> OperationScope<'a, S> {
    #[must_use]
    pub fn new(handler_id: &'a HandlerId, dry_run: bool, state: &'a mut S) -> Self {
        Self {
            handler_id,
            dry_run,
            state,
            entries: Vec::new(),
        }
    }

    /// Id of the handler currently running.
    #[must_use]
    pub fn handler_id(&self) -> &HandlerId {
        self.handler_id
    }

    /// Whether the batch was submitted as a dry run. The dispatcher does not
    /// act on this flag; handlers skip their own side effects when it is set.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// State shared by every operation of the current batch, created fresh
    /// when the batch starts executing.
    pub fn state(&mut self) -> &mut S {
        self.state
    }

    /// Appends an entry to this handler's result bucket.
    pub fn push(&mut self, entry: impl Into<ResultEntry>) {
        self.entries.push(entry.into());
    }

    #[must_use]
    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<ResultEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handler_id::derive_handler_id;

    #[test]
    fn collects_entries_in_push_order() {
        let id = derive_handler_id("enrollment", "create");
        let mut state = ();
        let mut scope = OperationScope::new(&id, false, &mut state);
        scope.push("first");
        scope.push(json!({"second": 2}));

        assert_eq!(scope.handler_id().as_str(), "enrollment_create");
        assert!(!scope.is_dry_run());
        assert_eq!(scope.into_entries(), vec![json!("first"), json!({"second": 2})]);
    }

    #[test]
    fn exposes_dry_run_flag() {
        let id = derive_handler_id("enrollment", "delete");
        let mut state = ();
        let scope = OperationScope::new(&id, true, &mut state);
        assert!(scope.is_dry_run());
        assert!(scope.entries().is_empty());
    }

    #[test]
    fn batch_state_outlives_each_scope() {
        let id = derive_handler_id("enrollment", "create");
        let mut seen: Vec<u32> = Vec::new();

        for n in 1..=3 {
            let mut scope = OperationScope::new(&id, false, &mut seen);
            scope.state().push(n);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}

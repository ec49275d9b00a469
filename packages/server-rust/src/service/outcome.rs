//! Aggregated batch output: per-handler result buckets plus the error list.

use opfactory_core::{HandlerId, ResultEntry};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Key holding the error list in the serialized outcome.
pub const ERRORS_KEY: &str = "errors";

/// Result buckets keyed by handler id, in order of first submission.
///
/// The dispatcher never interprets entries; it only files them under the id
/// of the handler that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultBuckets {
    buckets: Vec<(HandlerId, Vec<ResultEntry>)>,
}

impl ResultBuckets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entries` to the bucket for `id`, creating the bucket (even
    /// when `entries` is empty) on the handler's first completed operation.
    pub fn append(&mut self, id: HandlerId, entries: Vec<ResultEntry>) {
        match self.buckets.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, bucket)) => bucket.extend(entries),
            None => self.buckets.push((id, entries)),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&[ResultEntry]> {
        self.buckets
            .iter()
            .find(|(existing, _)| existing.as_str() == id)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HandlerId, &[ResultEntry])> {
        self.buckets
            .iter()
            .map(|(id, entries)| (id, entries.as_slice()))
    }

    /// Handler ids in bucket order.
    pub fn ids(&self) -> impl Iterator<Item = &HandlerId> {
        self.buckets.iter().map(|(id, _)| id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Linear log form: each handler id immediately followed by its entries.
    #[must_use]
    pub fn flatten(&self) -> Vec<Value> {
        let mut flat = Vec::with_capacity(
            self.buckets.len() + self.buckets.iter().map(|(_, e)| e.len()).sum::<usize>(),
        );
        for (id, entries) in &self.buckets {
            flat.push(Value::String(id.to_string()));
            flat.extend(entries.iter().cloned());
        }
        flat
    }
}

/// What a batch returns to its caller: results plus ordered diagnostics.
///
/// Serializes as a single JSON object, one key per handler id plus
/// `errors`:
///
/// ```json
/// { "enrollment_create": [ ... ], "errors": [] }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub results: ResultBuckets,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    /// True when neither loading nor execution recorded an error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn flatten(&self) -> Vec<Value> {
        self.results.flatten()
    }
}

impl Serialize for BatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len() + 1))?;
        for (id, entries) in self.results.iter() {
            map.serialize_entry(id.as_str(), entries)?;
        }
        map.serialize_entry(ERRORS_KEY, &self.errors)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use opfactory_core::derive_handler_id;
    use serde_json::json;

    use super::*;

    fn id(op_type: &str, action: &str) -> HandlerId {
        derive_handler_id(op_type, action)
    }

    #[test]
    fn buckets_keep_first_submission_order() {
        let mut buckets = ResultBuckets::new();
        buckets.append(id("enrollment", "delete"), vec![json!(1)]);
        buckets.append(id("enrollment", "create"), vec![json!(2)]);
        buckets.append(id("enrollment", "delete"), vec![json!(3)]);

        let ids: Vec<&str> = buckets.ids().map(HandlerId::as_str).collect();
        assert_eq!(ids, vec!["enrollment_delete", "enrollment_create"]);
        assert_eq!(
            buckets.get("enrollment_delete").unwrap(),
            &[json!(1), json!(3)]
        );
    }

    #[test]
    fn empty_entries_still_create_a_bucket() {
        let mut buckets = ResultBuckets::new();
        buckets.append(id("enrollment", "update"), Vec::new());
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.get("enrollment_update").unwrap().len(), 0);
    }

    #[test]
    fn flatten_interleaves_ids_and_entries() {
        let mut buckets = ResultBuckets::new();
        buckets.append(id("enrollment", "create"), vec![json!("a"), json!("b")]);
        buckets.append(id("enrollment", "update"), Vec::new());
        buckets.append(id("enrollment", "delete"), vec![json!({"c": 1})]);

        assert_eq!(
            buckets.flatten(),
            vec![
                json!("enrollment_create"),
                json!("a"),
                json!("b"),
                json!("enrollment_update"),
                json!("enrollment_delete"),
                json!({"c": 1}),
            ]
        );
    }

    #[test]
    fn outcome_serializes_buckets_then_errors() {
        let mut results = ResultBuckets::new();
        results.append(id("enrollment", "create"), vec![json!("ok")]);
        let outcome = BatchOutcome {
            results,
            errors: vec!["request 1: invalid operation-type: bogus".to_string()],
        };

        let text = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            text,
            r#"{"enrollment_create":["ok"],"errors":["request 1: invalid operation-type: bogus"]}"#
        );
        assert!(!outcome.is_clean());
    }

    #[test]
    fn empty_outcome_serializes_to_empty_errors() {
        let outcome = BatchOutcome::default();
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"errors": []}));
        assert!(outcome.is_clean());
        assert!(outcome.flatten().is_empty());
    }
}

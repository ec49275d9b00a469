//! Canonical handler identifiers derived from `(type, action)` pairs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator placed between words of a canonical handler id.
const WORD_SEPARATOR: char = '_';

/// Canonical identifier of a handler, e.g. `enrollment_create`.
///
/// Ids are always derived through [`derive_handler_id`], which lowercases
/// every word and joins the words of the type and the action with `_`.
/// Result buckets and failure diagnostics are keyed by this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(String);

impl HandlerId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HandlerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the canonical handler id for an operation type and action.
///
/// Any run of non-alphanumeric characters is a word boundary, and case is
/// ignored, so `("enrollment", "create")`, `("Enrollment", "CREATE")` and
/// `("enrollment", "-create")` all map to `enrollment_create`.
#[must_use]
pub fn derive_handler_id(op_type: &str, action: &str) -> HandlerId {
    let mut id = String::with_capacity(op_type.len() + action.len() + 1);
    for word in words(op_type).chain(words(action)) {
        if !id.is_empty() {
            id.push(WORD_SEPARATOR);
        }
        id.extend(word.chars().flat_map(char::to_lowercase));
    }
    HandlerId(id)
}

fn words(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn joins_type_and_action() {
        assert_eq!(
            derive_handler_id("enrollment", "create").as_str(),
            "enrollment_create"
        );
    }

    #[test]
    fn normalizes_case() {
        let expected = derive_handler_id("enrollment", "create");
        assert_eq!(derive_handler_id("Enrollment", "Create"), expected);
        assert_eq!(derive_handler_id("ENROLLMENT", "CREATE"), expected);
        assert_eq!(derive_handler_id("eNrOlLmEnT", "cReAtE"), expected);
    }

    #[test]
    fn normalizes_separators() {
        let expected = derive_handler_id("waitlist_entry", "bulk_update");
        assert_eq!(expected.as_str(), "waitlist_entry_bulk_update");
        assert_eq!(derive_handler_id("waitlist-entry", "bulk update"), expected);
        assert_eq!(derive_handler_id("Waitlist Entry", "Bulk-Update"), expected);
        assert_eq!(derive_handler_id("__waitlist__entry", "bulk__update_"), expected);
    }

    #[test]
    fn displays_as_plain_string() {
        let id = derive_handler_id("enrollment", "transition");
        assert_eq!(id.to_string(), "enrollment_transition");
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            serde_json::json!("enrollment_transition")
        );
    }

    proptest! {
        #[test]
        fn derivation_ignores_case(
            op_type in "[a-z]{1,12}(_[a-z]{1,12}){0,2}",
            action in "[a-z]{1,12}(_[a-z]{1,12}){0,2}",
        ) {
            let lower = derive_handler_id(&op_type, &action);
            let upper = derive_handler_id(&op_type.to_uppercase(), &action.to_uppercase());
            prop_assert_eq!(lower, upper);
        }

        #[test]
        fn derivation_ignores_separator_choice(
            words in proptest::collection::vec("[a-z]{1,8}", 1..4),
            action in "[a-z]{1,8}",
        ) {
            let underscored = derive_handler_id(&words.join("_"), &action);
            let dashed = derive_handler_id(&words.join("-"), &action);
            let spaced = derive_handler_id(&words.join(" "), &action);
            prop_assert_eq!(&underscored, &dashed);
            prop_assert_eq!(&underscored, &spaced);
        }

        #[test]
        fn derived_ids_are_lowercase_words(
            op_type in "[A-Za-z]{1,10}",
            action in "[A-Za-z]{1,10}",
        ) {
            let id = derive_handler_id(&op_type, &action);
            prop_assert!(id.as_str().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
            prop_assert_eq!(id.as_str().matches('_').count(), 1);
        }
    }
}

use std::fmt;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::StructuredResponseError;
use crate::events::Usage;
use crate::items::ThreadItem;
use crate::reducer::TurnOutcome;

/// How the final response should be interpreted on access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StructuredMode {
    /// Neither a schema nor a type was configured.
    Unconfigured,
    /// Parse as JSON only.
    Schema,
    /// Parse as JSON, then deserialize into the declared type.
    Typed,
}

/// Finalized result of one turn.
///
/// Built once from a terminal event and never mutated afterwards. The
/// structured response is computed on first access and cached, including
/// failures.
pub struct Turn<T = Value> {
    items: Vec<ThreadItem>,
    final_response: String,
    usage: Option<Usage>,
    mode: StructuredMode,
    structured: OnceLock<Result<T, StructuredResponseError>>,
}

impl<T> Turn<T> {
    pub(crate) fn new(outcome: TurnOutcome, mode: StructuredMode) -> Self {
        Self {
            items: outcome.items,
            final_response: outcome.final_response,
            usage: outcome.usage,
            mode,
            structured: OnceLock::new(),
        }
    }

    /// Completed items, in completion order.
    pub fn items(&self) -> &[ThreadItem] {
        &self.items
    }

    /// Text of the last agent message, or empty when there was none.
    pub fn final_response(&self) -> &str {
        &self.final_response
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn into_items(self) -> Vec<ThreadItem> {
        self.items
    }
}

impl<T: DeserializeOwned> Turn<T> {
    /// Parses the final response according to the turn's output options.
    ///
    /// | schema | type | result |
    /// |---|---|---|
    /// | no | no | [`StructuredResponseError::NotConfigured`] |
    /// | yes | no | JSON value |
    /// | either | yes | value of the declared type |
    ///
    /// The outcome is computed once; later calls return the cached value.
    pub fn structured_response(&self) -> Result<&T, StructuredResponseError> {
        self.structured
            .get_or_init(|| materialize(self.mode, &self.final_response))
            .as_ref()
            .map_err(Clone::clone)
    }
}

fn materialize<T: DeserializeOwned>(
    mode: StructuredMode,
    text: &str,
) -> Result<T, StructuredResponseError> {
    if mode == StructuredMode::Unconfigured {
        return Err(StructuredResponseError::NotConfigured);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|err| StructuredResponseError::InvalidJson {
            message: err.to_string(),
        })?;
    serde_json::from_value::<T>(value).map_err(|err| StructuredResponseError::Validation {
        message: err.to_string(),
    })
}

impl<T> fmt::Debug for Turn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Turn")
            .field("items", &self.items)
            .field("final_response", &self.final_response)
            .field("usage", &self.usage)
            .field("mode", &self.mode)
            .field("structured_cached", &self.structured.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn outcome(text: &str) -> TurnOutcome {
        TurnOutcome {
            items: Vec::new(),
            final_response: text.to_string(),
            usage: None,
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Summary {
        summary: String,
    }

    #[test]
    fn schema_mode_parses_json_without_validation() {
        let turn: Turn = Turn::new(outcome(r#"{"summary":"ok"}"#), StructuredMode::Schema);
        assert_eq!(turn.structured_response(), Ok(&json!({"summary": "ok"})));

        let invalid: Turn = Turn::new(outcome("not json"), StructuredMode::Schema);
        assert!(matches!(
            invalid.structured_response(),
            Err(StructuredResponseError::InvalidJson { .. })
        ));
    }

    #[test]
    fn typed_mode_distinguishes_parse_and_validation_failures() {
        let ok: Turn<Summary> = Turn::new(outcome(r#"{"summary":"ok"}"#), StructuredMode::Typed);
        assert_eq!(
            ok.structured_response(),
            Ok(&Summary {
                summary: "ok".into()
            })
        );

        let wrong_shape: Turn<Summary> =
            Turn::new(outcome(r#"{"headline":"ok"}"#), StructuredMode::Typed);
        assert!(matches!(
            wrong_shape.structured_response(),
            Err(StructuredResponseError::Validation { .. })
        ));

        let truncated: Turn<Summary> = Turn::new(outcome(r#"{"summary":"#), StructuredMode::Typed);
        assert!(matches!(
            truncated.structured_response(),
            Err(StructuredResponseError::InvalidJson { .. })
        ));
    }

    #[test]
    fn outcome_is_memoized_including_failures() {
        let turn: Turn = Turn::new(outcome("{}"), StructuredMode::Unconfigured);
        let first = turn.structured_response();
        let second = turn.structured_response();
        assert_eq!(first, Err(StructuredResponseError::NotConfigured));
        assert_eq!(first, second);

        let parsed: Turn = Turn::new(outcome("[1,2]"), StructuredMode::Schema);
        let a = parsed.structured_response().expect("first") as *const Value;
        let b = parsed.structured_response().expect("second") as *const Value;
        assert_eq!(a, b);
    }
}

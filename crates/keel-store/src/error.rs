//! Error types for the store engine.
//!
//! Lookup failures are programmer errors and fail fast with a descriptive
//! variant instead of handing back a sentinel that blows up at an unrelated
//! call site. Reducer and effect failures carry the caller's own error as
//! their source so nothing is swallowed on the way up.

use thiserror::Error;

/// Errors surfaced by [`Store`](crate::Store) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested action key was never registered on this store.
    #[error("unknown action `{key}` on store `{store}`")]
    UnknownAction { store: String, key: String },

    /// Requested effect key was never registered on this store.
    #[error("unknown effect `{key}` on store `{store}`")]
    UnknownEffect { store: String, key: String },

    /// Requested selector key was never registered on this store.
    #[error("unknown selector `{key}` on store `{store}`")]
    UnknownSelector { store: String, key: String },

    /// Selector exists but was registered with a different result type.
    #[error("selector `{key}` on store `{store}` has a different result type")]
    SelectorType { store: String, key: String },

    /// A reducer failed; nothing was committed and no subscriber was notified.
    #[error("reducer for `{action}` failed")]
    Reducer {
        action: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failure of an effect body, carried by the rejected effect future.
#[derive(Debug, Error)]
#[error("effect `{effect}` failed")]
pub struct EffectError {
    pub effect: String,
    #[source]
    pub source: anyhow::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_action_message() {
        let err = StoreError::UnknownAction {
            store: "counter".to_string(),
            key: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "unknown action `nope` on store `counter`");
    }

    #[test]
    fn test_reducer_error_keeps_source() {
        let err = StoreError::Reducer {
            action: "counter/increment".to_string(),
            source: anyhow::anyhow!("overflow"),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "overflow");
    }
}

//! The single capability every flow state must carry.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value a [`crate::Flow`] executes against.
///
/// The engine never interprets fields beyond `flow_id()`; it passes the
/// state by mutable reference to step, mutation, and compensation bodies,
/// which own all other mutation. No equality or ordering is assumed.
///
/// `flow_id()` must be stable for the lifetime of a run; it is the
/// persistence key used by [`crate::FlowStore`] and the correlator
/// threaded through [`crate::FlowResult::trace`].
pub trait FlowState: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// A stable, non-empty identifier for this run.
    fn flow_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Counter {
        id: String,
        n: i64,
    }

    impl FlowState for Counter {
        fn flow_id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn flow_id_is_readable() {
        let c = Counter {
            id: "run-1".into(),
            n: 0,
        };
        assert_eq!(c.flow_id(), "run-1");
    }
}

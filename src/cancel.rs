//! Cooperative cancellation.
//!
//! The engine checks for cancellation at each suspension point (before
//! every `Step` body) rather than hand-rolling a token type;
//! `tokio_util::sync::CancellationToken` is a battle-tested primitive
//! already built for exactly this purpose.

pub use tokio_util::sync::CancellationToken;

/// A token that reports as never cancelled.
///
/// Compensation bodies run against one of these rather than the caller's
/// token: rollback must complete even when the run was cancelled, so the
/// caller's cancellation must not propagate into compensation.
pub fn uncancellable() -> CancellationToken {
    CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncancellable_token_is_never_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.is_cancelled());

        let comp_token = uncancellable();
        assert!(!comp_token.is_cancelled());
    }
}

use crate::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. Clones observe the same flag, so one handle can be
/// given to a signal handler while workers poll another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self, params: &str) -> Result<(), EngineError> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled {
                params: params.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(token.check("{}").is_ok());

        handle.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            token.check(r#"{"ConnectionId":1}"#),
            Err(EngineError::Cancelled { params }) if params == r#"{"ConnectionId":1}"#
        ));
    }
}

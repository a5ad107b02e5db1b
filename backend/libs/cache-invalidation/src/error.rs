//! Error types for cache invalidation operations

use thiserror::Error;

/// Cache invalidation errors
#[derive(Error, Debug)]
pub enum InvalidationError {
    /// The bus was dropped while a listener was still attached
    #[error("Invalidation channel closed")]
    ChannelClosed,

    /// Callback execution failed
    #[error("Callback execution failed: {0}")]
    CallbackFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InvalidationError::CallbackFailed("callback error".to_string());
        assert_eq!(err.to_string(), "Callback execution failed: callback error");

        let err = InvalidationError::Configuration("capacity must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: capacity must be positive"
        );
    }

    #[test]
    fn test_error_conversion() {
        let result: Result<(), InvalidationError> = Err(InvalidationError::ChannelClosed);
        assert!(matches!(result, Err(InvalidationError::ChannelClosed)));
    }
}

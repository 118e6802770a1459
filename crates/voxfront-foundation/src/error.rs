use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Invalid target rate: {rate} Hz (must be > 0)")]
    InvalidTargetRate { rate: u32 },

    #[error("Invalid input rate: {rate} Hz (must be > 0)")]
    InvalidInputRate { rate: u32 },

    #[error("Unsupported ratio: {input_rate} Hz -> {target_rate} Hz (upsampling not supported)")]
    UnsupportedRatio { input_rate: u32, target_rate: u32 },

    #[error("Input rate changed mid-session: {previous} Hz -> {current} Hz")]
    InputRateChanged { previous: u32, current: u32 },
}

#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    Retry { max_attempts: u32, delay: Duration },
    Restart,
    Ignore,
    Fatal,
}

impl AppError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            // A new session (reset) recovers from a rate change.
            AppError::Audio(AudioError::InputRateChanged { .. }) => RecoveryStrategy::Restart,
            // Contract violations: the caller is broken, not the stream.
            AppError::Audio(_) => RecoveryStrategy::Fatal,
            AppError::Config(_) => RecoveryStrategy::Fatal,
            AppError::Fatal(_) | AppError::ShutdownRequested => RecoveryStrategy::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_change_is_restartable() {
        let err = AppError::Audio(AudioError::InputRateChanged {
            previous: 48_000,
            current: 44_100,
        });
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Restart));
    }

    #[test]
    fn contract_violations_are_fatal() {
        let err = AppError::Audio(AudioError::InvalidTargetRate { rate: 0 });
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Fatal));
    }
}

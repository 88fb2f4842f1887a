use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = LotteryError> = std::result::Result<T, E>;

/// Everything that can go wrong between the wallet provider and the session store.
///
/// None of these are fatal to the process: they end up as notices in the store and the
/// busy flag is always released.
#[derive(Debug, Error)]
pub enum LotteryError {
    #[error("no wallet provider detected")]
    ProviderAbsent,
    #[error("wallet connection rejected: {0}")]
    ConnectionRejected(String),
    #[error("no authorized signer available; log in first")]
    NoSigner,
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("token approval failed: {0}")]
    Allowance(#[source] Box<LotteryError>),
    #[error("transaction failed: {0}")]
    Transaction(String),
    #[error("network request failed: {0}")]
    Network(String),
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: String,
        after: Duration,
    },
    #[error("another transaction is still being processed")]
    Busy,
}

impl LotteryError {
    pub fn validation(reason: impl Into<String>) -> Self {
        LotteryError::Validation(reason.into())
    }

    pub fn allowance(source: LotteryError) -> Self {
        match source {
            already @ LotteryError::Allowance(_) => already,
            other => LotteryError::Allowance(Box::new(other)),
        }
    }

    /// Errors that are raised before anything touches the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            LotteryError::Validation(_) | LotteryError::Busy | LotteryError::ProviderAbsent
        )
    }
}

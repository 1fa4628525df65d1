use thiserror::Error;

/// Failure taxonomy of the ledger engine.
///
/// Every variant is recovered locally inside the operation boundary: by the
/// time the caller sees one of these, any partial mutation has already been
/// rolled back.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount was zero or outside the representable range.
    #[error("amount must be positive")]
    InvalidAmount,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Business-rule violation, not a system fault.
    #[error("insufficient funds in account {0}")]
    InsufficientFunds(String),

    /// Lock acquisition exceeded its bound. Retryable.
    #[error("account {0} is busy, retry later")]
    Contended(String),

    /// Underlying durability failure. Fatal for this call; not auto-retried.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether the caller may simply retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contended(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        assert!(LedgerError::Contended("ACC1".into()).is_retryable());
        assert!(!LedgerError::InvalidAmount.is_retryable());
        assert!(!LedgerError::InsufficientFunds("ACC1".into()).is_retryable());
        assert!(!LedgerError::Storage("disk".into()).is_retryable());
    }
}

// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Component methods return `EngineError` so callers can distinguish retryable
// transport failures from rejections and validation errors. Job bodies are
// the only layer that converts errors into notification events.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or out-of-range configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Network failure, timeout, or 5xx from the exchange. The adapter has
    /// already exhausted its retry budget when this surfaces.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// 4xx from the exchange (auth, permission, malformed request, or a
    /// response missing mandatory fields). Never retried.
    #[error("upstream rejected: {0}")]
    UpstreamRejected(String),

    /// Scoring or risk evaluation invoked without the inputs it requires.
    /// The affected instrument is skipped; never fatal.
    #[error("missing inputs: {0}")]
    MissingInputs(String),

    /// Open rejected because available cash cannot cover notional + fee.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Order validation failure: below minimum notional, LIMIT without a
    /// price, SHORT on a spot instrument, or non-positive quantity.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Reconciler found local state diverging from the exchange. Resolved in
    /// place; recorded for the audit trail.
    #[error("state inconsistency: {0}")]
    StateInconsistency(String),
}

impl EngineError {
    /// Short machine-readable kind label carried in structured log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamRejected(_) => "upstream_rejected",
            Self::MissingInputs(_) => "missing_inputs",
            Self::InsufficientFunds(_) => "insufficient_funds",
            Self::InvalidOrder(_) => "invalid_order",
            Self::StateInconsistency(_) => "state_inconsistency",
        }
    }

}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels() {
        assert_eq!(
            EngineError::UpstreamRejected("401".into()).kind(),
            "upstream_rejected"
        );
        assert_eq!(
            EngineError::InvalidOrder("qty".into()).kind(),
            "invalid_order"
        );
    }

    #[test]
    fn messages_carry_context() {
        let err = EngineError::InsufficientFunds("cash 100 < fee 500".into());
        assert!(err.to_string().contains("insufficient funds"));
        assert!(err.to_string().contains("cash 100"));
    }
}

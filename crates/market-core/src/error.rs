use thiserror::Error;

/// Failure taxonomy for the trading pipeline.
///
/// Config and BrokerConnect are fatal at startup; everything else is
/// recovered inside the per-symbol failure domain. Boundaries with their
/// own richer result types (plan vetting, order submission, the oracle
/// client) carry those types instead of a variant here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("broker connect failed: {0}")]
    BrokerConnect(String),

    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("supervision failed for ticket {ticket}: {reason}")]
    Supervision { ticket: u64, reason: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown strategy side '{0}', expected 'buy' or 'sell'")]
    UnknownSide(String),

    #[error("Contract id must be non-zero")]
    ZeroContractId,
}

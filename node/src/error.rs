use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] warden_store::StoreError),

    #[error("gate error: {0}")]
    Gate(#[from] warden_gate::GateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

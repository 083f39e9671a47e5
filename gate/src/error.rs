use thiserror::Error;

use warden_platform::PlatformError;
use warden_store::StoreError;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

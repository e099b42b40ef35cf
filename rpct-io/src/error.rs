use rpct_core::RpctError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error(transparent)]
    Core(#[from] RpctError),

    #[error("No RPC metadata in {0}")]
    MissingRpc(String),
}

pub type Result<T> = std::result::Result<T, IoError>;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Closed error surface for the pool façade. Every public `Pool`/`Arena`/
/// `Catalog` operation either succeeds or returns one of these.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid handle")]
    InvalidHandle,

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("memory id not found")]
    NotFound,

    #[error("memory id already exists")]
    AlreadyExists,

    #[error("io error: {0}")]
    IoFailed(#[from] std::io::Error),

    #[error("invalid snapshot magic")]
    BadMagic,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Protocol response code for this error kind, per the dispatcher's
    /// façade-error-kind to response-code mapping.
    pub fn response_code(&self) -> u8 {
        match self {
            Error::InvalidParam(_) => 2,
            Error::OutOfMemory => 3,
            Error::NotFound => 4,
            Error::AlreadyExists => 5,
            Error::InvalidHandle
            | Error::BadMagic
            | Error::UnsupportedVersion(_)
            | Error::IoFailed(_)
            | Error::Unknown(_) => 255,
        }
    }
}

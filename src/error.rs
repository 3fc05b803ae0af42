use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeveeError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("logic error: {0}")]
    LogicError(String),

    #[error("index {index} out of range (length {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("Galois key not present")]
    MissingGaloisKey,

    #[error("scale out of bounds")]
    ScaleOutOfBounds,

    #[error("end of modulus switching chain reached")]
    EndOfChain,

    #[error("result ciphertext is transparent")]
    TransparentCiphertext,
}

pub type Result<T> = std::result::Result<T, LeveeError>;

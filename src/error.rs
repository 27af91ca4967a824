//! use chainsmith::error::ChainsmithError;

use thiserror::Error;

/// Represents errors that can occur in the chainsmith library.
///
/// Signature mismatches while walking a certificate chain are not errors; they are
/// ordinary branches of the issuer search and never surface through this type.
#[derive(Debug, Error, Clone)]
pub enum ChainsmithError {
    /// A key size, curve or algorithm outside the supported set.
    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// The certificate input decoded to zero certificates.
    #[error("No valid certificate found")]
    NoCertificateFound,

    /// A PKCS#12 container was requested without a passphrase.
    #[error("A passphrase is required to build a PKCS#12 container")]
    MissingPassphrase,

    /// Wrong passphrase, or a passphrase is needed and none was given.
    #[error("Decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,

    /// The PKCS#12 container holds no private key.
    #[error("No private key found in container")]
    NoPrivateKey,

    /// The trust store collaborator cannot be queried.
    #[error("Trust store unavailable: {0}")]
    TrustStoreUnavailable(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error while producing a signature.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),
}

pub type Result<T> = std::result::Result<T, ChainsmithError>;

impl From<der::Error> for ChainsmithError {
    /// Converts a `der::Error` into a `ChainsmithError`.
    fn from(err: der::Error) -> Self {
        ChainsmithError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for ChainsmithError {
    fn from(err: rsa::Error) -> Self {
        ChainsmithError::RsaError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for ChainsmithError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        ChainsmithError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::Error> for ChainsmithError {
    fn from(err: pkcs8::Error) -> Self {
        ChainsmithError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for ChainsmithError {
    fn from(err: pkcs8::spki::Error) -> Self {
        ChainsmithError::DecodingError(err.to_string())
    }
}

impl From<pkcs5::Error> for ChainsmithError {
    fn from(err: pkcs5::Error) -> Self {
        ChainsmithError::EncodingError(err.to_string())
    }
}

impl From<pem::PemError> for ChainsmithError {
    fn from(err: pem::PemError) -> Self {
        ChainsmithError::DecodingError(err.to_string())
    }
}

impl From<ecdsa::Error> for ChainsmithError {
    fn from(err: ecdsa::Error) -> Self {
        ChainsmithError::SigningError(err.to_string())
    }
}

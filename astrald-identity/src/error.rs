use thiserror::Error;

/// errors that can occur while constructing or verifying identity material
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    #[error("invalid secret key encoding")]
    InvalidSecretKey,

    #[error("identity has no associated secret key")]
    MissingSecretKey,

    #[error("certificate signature does not verify")]
    InvalidSignature,

    #[error("certificate has expired")]
    CertificateExpired,

    #[error("certificate encoding is malformed")]
    InvalidCertificate,
}

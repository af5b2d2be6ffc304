//! Store errors.

use thiserror::Error;

/// Failures from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database failure.
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    /// Persisted key material fails validation.
    #[error("crypto: {0}")]
    Crypto(#[from] tether_crypto::CryptoError),

    /// Persisted protobuf blob fails to decode.
    #[error("corrupt account blob: {0}")]
    Proto(#[from] prost::DecodeError),

    /// A row violates the schema's shape (wrong blob length, bad address).
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store's schema version is newer than this build understands.
    #[error("schema version {found} is newer than supported {supported}")]
    SchemaTooNew {
        /// Version found in the database.
        found: i64,
        /// Newest version this build can run.
        supported: i64,
    },
}

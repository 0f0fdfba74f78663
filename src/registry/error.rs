use thiserror::Error;

/// Boxed error returned by singleton initializers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Misuse of the registry contract.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("singleton `{0}` requested before it was initialized")]
    NotInitialized(String),
    #[error("no singleton registered under `{0}`")]
    Unknown(String),
    #[error("singleton `{name}` is not a `{expected}`")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("singleton `{0}` is already registered")]
    Duplicate(String),
    #[error("registry is sealed, cannot register `{0}`")]
    Sealed(String),
}

/// An initializer failed; startup cannot continue.
#[derive(Debug, Error)]
#[error("failed to initialize singleton `{name}`: {source}")]
pub struct SingletonInitError {
    pub name: String,
    #[source]
    pub source: BoxError,
}

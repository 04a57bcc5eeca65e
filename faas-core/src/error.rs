use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("upload too large: maximum size is {0} bytes")]
    TooLarge(u64),

    #[error("unreadable archive: {0}")]
    Archive(String),

    #[error("no handler file found (expected function.json or a .py/.go source at the archive root)")]
    NoHandlerFound,

    #[error("language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("function not found: {0}")]
    NotFound(String),

    #[error("failed to load build template: {0}")]
    Template(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure was caused by the caller's input rather than
    /// the platform. Drives the 4xx/5xx split at the HTTP boundary.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Error::TooLarge(_)
                | Error::Archive(_)
                | Error::NoHandlerFound
                | Error::UnsupportedLanguage(_)
                | Error::NotFound(_)
        )
    }
}

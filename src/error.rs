use thiserror::Error;

#[derive(Debug, Error)]
pub enum MiniError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed query text, as reported by the parser entry points.
    #[error("Query parsing error: {0}")]
    Parse(String),

    /// Parser-internal cause; entry points rewrap it as `Parse`.
    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("Error executing query: {0}")]
    Execution(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("{0}")]
    NotSupported(String),
}

impl MiniError {
    /// Wraps query-level failures with execution context. Row-store
    /// failures pass through untouched.
    pub fn in_execution(self) -> Self {
        match self {
            MiniError::Parse(_) | MiniError::Syntax(_) | MiniError::Evaluation(_) => {
                MiniError::Execution(self.to_string())
            }
            other => other,
        }
    }
}

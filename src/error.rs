use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Fee overflow: {0}")]
    FeeOverflow(String),
    #[error("Ledger client error: {0}")]
    Ledger(String),
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    #[error("Viewing key required: {0}")]
    Unauthorized(String),
    #[error("Wallet error: {0}")]
    Wallet(String),
    #[error("Dependency not ready: {0}")]
    DependencyNotReady(String),
    #[error("Pool not found: {0}")]
    PoolNotFound(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

// Tauri requires Serialize for command return errors
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_as_display_string() {
        let err = AppError::Rejected("out of gas".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#""Transaction rejected: out of gas""#);
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Blocked email domain: {0}")]
    BlockedDomain(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl Error {
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let validation_error =
            Error::Validation(ValidationError::InvalidEmail("test@".to_string()));
        assert_eq!(
            validation_error.to_string(),
            "Validation error: Invalid email format: test@"
        );

        let storage_error =
            Error::Storage(StorageError::Database("connection failed".to_string()));
        assert_eq!(
            storage_error.to_string(),
            "Storage error: Database error: connection failed"
        );
    }

    #[test]
    fn test_validation_error_variants() {
        let blocked = ValidationError::BlockedDomain("test.com".to_string());
        assert_eq!(blocked.to_string(), "Blocked email domain: test.com");

        let missing = ValidationError::MissingField("email".to_string());
        assert_eq!(missing.to_string(), "Missing required field: email");
    }

    #[test]
    fn test_error_from_conversions() {
        let validation_error = ValidationError::InvalidEmail("bad@".to_string());
        let error: Error = validation_error.into();
        assert!(error.is_validation_error());

        let storage_error = StorageError::Connection("refused".to_string());
        let error: Error = storage_error.into();
        assert!(error.is_storage_error());
    }
}

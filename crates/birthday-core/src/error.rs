use thiserror::Error;

/// Core errors for the birthday record store.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("DynamoDB error: {0}")]
    Dynamo(#[from] aws_sdk_dynamodb::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_dynamo::Error),

    #[error("Username validation error: {0}")]
    Username(#[from] crate::model::UsernameError),

    #[error("Record validation error: {0}")]
    Record(#[from] crate::model::RecordError),
}

use std::collections::HashMap;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::{BirthdayRecord, Username};

/// Table the records live in unless configured otherwise.
pub const DEFAULT_TABLE_NAME: &str = "users_birthdays";

/// Partition key attribute of the records table.
const ATTR_USERNAME: &str = "username";

/// DynamoDB client wrapper for birthday record storage.
#[derive(Clone)]
pub struct RecordStore {
    client: Client,
    table_name: String,
}

impl RecordStore {
    /// Create a new `RecordStore` by loading AWS configuration from the
    /// environment and constructing a DynamoDB client.
    pub async fn new(table_name: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::from_client(Client::new(&config), table_name)
    }

    /// Create from an already configured client.
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// The DynamoDB table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Fetch the record for `username`, if one has been stored.
    pub async fn get(&self, username: &Username) -> Result<Option<BirthdayRecord>, CoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_USERNAME, AttributeValue::S(username.to_string()))
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from)?;

        match output.item {
            Some(item) => {
                let record: BirthdayRecord = serde_dynamo::from_item(item)?;
                debug!(username = %username, "record found");
                Ok(Some(record))
            }
            None => {
                debug!(username = %username, "no record");
                Ok(None)
            }
        }
    }

    /// Store `record`, replacing any previous record for the same username.
    pub async fn put(&self, record: &BirthdayRecord) -> Result<(), CoreError> {
        let item = to_item(record)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from)?;

        info!(username = %record.username, "record stored");
        Ok(())
    }
}

fn to_item(record: &BirthdayRecord) -> Result<HashMap<String, AttributeValue>, CoreError> {
    Ok(serde_dynamo::to_item(record)?)
}

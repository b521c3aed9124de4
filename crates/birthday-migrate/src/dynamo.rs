//! [`TableStore`] over Amazon DynamoDB (or DynamoDB Local).

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    self as ddb, AttributeDefinition, GlobalSecondaryIndex, IndexStatus, KeySchemaElement,
    LocalSecondaryIndex, Projection, ProvisionedThroughput, TableDescription, TableStatus,
};
use tracing::{debug, info};

use crate::descriptor::{
    BillingMode, KeyElement, KeyRole, ProjectionType, ScalarType, SecondaryIndex,
    TableDescriptor, Throughput,
};
use crate::errors::StoreError;
use crate::store::TableStore;
use crate::wait::{WaitConfig, wait_for_ready};

/// Error codes meaning the table does not exist
const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException"];

/// Error codes meaning the table already exists or is being created
const ALREADY_EXISTS_CODES: &[&str] = &["ResourceInUseException"];

/// Error codes for rejected or insufficient credentials
const UNAUTHORIZED_CODES: &[&str] = &[
    "AccessDeniedException",
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
    "MissingAuthenticationTokenException",
    "InvalidClientTokenId",
];

/// Classify a DynamoDB error by its service error code.
pub fn classify_code(code: Option<&str>, message: String) -> StoreError {
    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => StoreError::NotFound(message),
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => StoreError::AlreadyExists(message),
        Some(c) if UNAUTHORIZED_CODES.contains(&c) => StoreError::Unauthorized(message),
        Some(c) => StoreError::Other(format!("{c}: {message}")),
        None => StoreError::Other(message),
    }
}

/// Classify an SDK error. `call_timeout` is the per-call bound configured
/// on the client and is reported when the SDK gives up waiting.
fn classify<E, R>(err: SdkError<E, R>, table: &str, call_timeout: Duration) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::DispatchFailure(_) => {
            StoreError::Unreachable(DisplayErrorContext(&err).to_string())
        }
        SdkError::TimeoutError(_) => StoreError::Timeout {
            name: table.to_string(),
            after: call_timeout,
        },
        _ => {
            let code = err.code().map(str::to_string);
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            classify_code(code.as_deref(), message)
        }
    }
}

/// Drain a paginated listing. `fetch` receives the name to start after
/// and returns one page plus the last evaluated name, if any.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<String>, StoreError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<String>, Option<String>), StoreError>>,
{
    let mut names = Vec::new();
    let mut start = None;

    loop {
        let (page, last_evaluated) = fetch(start.take()).await?;
        names.extend(page);

        match last_evaluated {
            Some(next) => start = Some(next),
            None => return Ok(names),
        }
    }
}

/// DynamoDB-backed table store.
#[derive(Clone)]
pub struct DynamoTableStore {
    client: Client,
    /// Per-call bound configured on the client, reported on SDK timeouts.
    call_timeout: Duration,
    poll: WaitConfig,
}

impl std::fmt::Debug for DynamoTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoTableStore")
            .field("call_timeout", &self.call_timeout)
            .field("poll", &self.poll)
            .finish()
    }
}

impl DynamoTableStore {
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
            poll: WaitConfig::default(),
        }
    }

    /// Override the readiness polling backoff. Its timeout is replaced by
    /// the one passed to [`TableStore::await_ready`].
    pub fn with_poll(mut self, poll: WaitConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Current description of `name`, or `None` if it does not exist.
    async fn describe(&self, name: &str) -> Result<Option<TableDescription>, StoreError> {
        match self.client.describe_table().table_name(name).send().await {
            Ok(output) => Ok(output.table),
            Err(e) => match classify(e, name, self.call_timeout) {
                StoreError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }
}

/// Table and every global index report `ACTIVE`.
fn is_ready(table: &TableDescription) -> bool {
    table.table_status() == Some(&TableStatus::Active)
        && table
            .global_secondary_indexes()
            .iter()
            .all(|index| index.index_status() == Some(&IndexStatus::Active))
}

#[async_trait]
impl TableStore for DynamoTableStore {
    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let table = self.describe(name).await?;
        debug!(
            table = %name,
            status = ?table.as_ref().and_then(|t| t.table_status()),
            "described table"
        );
        Ok(table.is_some())
    }

    async fn create(&self, table: &TableDescriptor) -> Result<(), StoreError> {
        let request = CreateTableParts::from_descriptor(table).map_err(|e| {
            StoreError::Other(format!("cannot build create request for {}: {e}", table.name))
        })?;

        self.client
            .create_table()
            .table_name(&table.name)
            .set_key_schema(Some(request.key_schema))
            .set_attribute_definitions(Some(request.attribute_definitions))
            .billing_mode(request.billing_mode)
            .set_provisioned_throughput(request.provisioned_throughput)
            .set_global_secondary_indexes(request.global_secondary_indexes)
            .set_local_secondary_indexes(request.local_secondary_indexes)
            .send()
            .await
            .map_err(|e| classify(e, &table.name, self.call_timeout))?;

        info!(table = %table.name, "create request accepted");
        Ok(())
    }

    async fn await_ready(&self, name: &str, timeout: Duration) -> Result<(), StoreError> {
        let config = WaitConfig {
            timeout,
            ..self.poll.clone()
        };

        // A freshly created table may not be visible to DescribeTable yet.
        let this = self;
        wait_for_ready(
            &config,
            move || async move {
                let table = this.describe(name).await?;
                Ok::<_, StoreError>(table.as_ref().is_some_and(is_ready))
            },
            name,
        )
        .await
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let names = collect_pages(|start| async move {
            let output = self
                .client
                .list_tables()
                .set_exclusive_start_table_name(start)
                .send()
                .await
                .map_err(|e| classify(e, "ListTables", self.call_timeout))?;

            Ok((
                output.table_names.unwrap_or_default(),
                output.last_evaluated_table_name,
            ))
        })
        .await?;

        debug!(count = names.len(), "listed tables");
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// Descriptor -> CreateTable request
// ---------------------------------------------------------------------------

/// The pieces of a CreateTable request derived from a descriptor.
#[derive(Debug)]
struct CreateTableParts {
    key_schema: Vec<KeySchemaElement>,
    attribute_definitions: Vec<AttributeDefinition>,
    billing_mode: ddb::BillingMode,
    provisioned_throughput: Option<ProvisionedThroughput>,
    global_secondary_indexes: Option<Vec<GlobalSecondaryIndex>>,
    local_secondary_indexes: Option<Vec<LocalSecondaryIndex>>,
}

impl CreateTableParts {
    fn from_descriptor(table: &TableDescriptor) -> Result<Self, BuildError> {
        let attribute_definitions = table
            .attributes
            .iter()
            .map(|a| {
                AttributeDefinition::builder()
                    .attribute_name(&a.name)
                    .attribute_type(scalar_type(a.r#type))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let global_secondary_indexes = table
            .global_secondary_indexes
            .iter()
            .map(|index| {
                GlobalSecondaryIndex::builder()
                    .index_name(&index.index_name)
                    .set_key_schema(Some(key_schema(&index.key_schema)?))
                    .projection(projection(index))
                    .set_provisioned_throughput(
                        index.provisioned_throughput.map(throughput).transpose()?,
                    )
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let local_secondary_indexes = table
            .local_secondary_indexes
            .iter()
            .map(|index| {
                LocalSecondaryIndex::builder()
                    .index_name(&index.index_name)
                    .set_key_schema(Some(key_schema(&index.key_schema)?))
                    .projection(projection(index))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            key_schema: key_schema(&table.key_schema)?,
            attribute_definitions,
            billing_mode: match table.billing_mode {
                BillingMode::PayPerRequest => ddb::BillingMode::PayPerRequest,
                BillingMode::Provisioned => ddb::BillingMode::Provisioned,
            },
            provisioned_throughput: table.provisioned_throughput.map(throughput).transpose()?,
            global_secondary_indexes: non_empty(global_secondary_indexes),
            local_secondary_indexes: non_empty(local_secondary_indexes),
        })
    }
}

/// DynamoDB expects the HASH element first.
fn key_schema(keys: &[KeyElement]) -> Result<Vec<KeySchemaElement>, BuildError> {
    let partition = keys.iter().filter(|k| k.key_type == KeyRole::Partition);
    let sort = keys.iter().filter(|k| k.key_type == KeyRole::Sort);

    partition
        .chain(sort)
        .map(|key| {
            KeySchemaElement::builder()
                .attribute_name(&key.attribute_name)
                .key_type(match key.key_type {
                    KeyRole::Partition => ddb::KeyType::Hash,
                    KeyRole::Sort => ddb::KeyType::Range,
                })
                .build()
        })
        .collect()
}

fn scalar_type(t: ScalarType) -> ddb::ScalarAttributeType {
    match t {
        ScalarType::String => ddb::ScalarAttributeType::S,
        ScalarType::Number => ddb::ScalarAttributeType::N,
        ScalarType::Binary => ddb::ScalarAttributeType::B,
    }
}

fn projection(index: &SecondaryIndex) -> Projection {
    let projection_type = match index.projection.projection_type {
        ProjectionType::All => ddb::ProjectionType::All,
        ProjectionType::KeysOnly => ddb::ProjectionType::KeysOnly,
        ProjectionType::Include => ddb::ProjectionType::Include,
    };

    Projection::builder()
        .projection_type(projection_type)
        .set_non_key_attributes(non_empty(index.projection.non_key_attributes.clone()))
        .build()
}

fn throughput(t: Throughput) -> Result<ProvisionedThroughput, BuildError> {
    ProvisionedThroughput::builder()
        .read_capacity_units(i64::try_from(t.read_capacity_units).unwrap_or(i64::MAX))
        .write_capacity_units(i64::try_from(t.write_capacity_units).unwrap_or(i64::MAX))
        .build()
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

#[cfg(test)]
mod tests {
    use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
    use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
    use aws_smithy_runtime_api::client::result::ConnectorError;
    use serde_json::json;

    use super::*;

    fn descriptor(value: serde_json::Value) -> TableDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn classify_known_codes() {
        assert_eq!(
            classify_code(Some("ResourceNotFoundException"), "gone".into()),
            StoreError::NotFound("gone".into())
        );
        assert_eq!(
            classify_code(Some("ResourceInUseException"), "busy".into()),
            StoreError::AlreadyExists("busy".into())
        );
        assert_eq!(
            classify_code(Some("AccessDeniedException"), "no".into()),
            StoreError::Unauthorized("no".into())
        );
        assert_eq!(
            classify_code(Some("UnrecognizedClientException"), "bad key".into()),
            StoreError::Unauthorized("bad key".into())
        );
    }

    #[test]
    fn classify_unknown_code_keeps_code() {
        assert_eq!(
            classify_code(Some("ValidationException"), "bad schema".into()),
            StoreError::Other("ValidationException: bad schema".into())
        );
        assert_eq!(
            classify_code(None, "boom".into()),
            StoreError::Other("boom".into())
        );
    }

    #[test]
    fn sdk_timeout_reports_call_timeout() {
        let err: SdkError<DescribeTableError, HttpResponse> =
            SdkError::timeout_error("operation timed out");

        assert_eq!(
            classify(err, "users_birthdays", Duration::from_secs(30)),
            StoreError::Timeout {
                name: "users_birthdays".into(),
                after: Duration::from_secs(30),
            }
        );
    }

    #[test]
    fn dispatch_failure_is_unreachable() {
        let err: SdkError<DescribeTableError, HttpResponse> =
            SdkError::dispatch_failure(ConnectorError::io("connection refused".into()));

        match classify(err, "users_birthdays", Duration::from_secs(30)) {
            StoreError::Unreachable(message) => assert!(!message.is_empty()),
            other => panic!("expected unreachable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn listing_follows_last_evaluated_name() {
        let mut pages = vec![
            (vec!["alpha".to_string(), "beta".to_string()], Some("beta".to_string())),
            (vec!["gamma".to_string()], None),
        ]
        .into_iter();
        let mut starts = Vec::new();

        let names = collect_pages(|start| {
            starts.push(start);
            let page = pages.next();
            async move { page.ok_or_else(|| StoreError::Other("no such page".into())) }
        })
        .await
        .unwrap();

        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(starts, vec![None, Some("beta".to_string())]);
    }

    #[tokio::test]
    async fn listing_stops_on_page_error() {
        let mut calls = 0;
        let result = collect_pages(|_| {
            calls += 1;
            let page = if calls == 1 {
                Ok((vec!["alpha".to_string()], Some("alpha".to_string())))
            } else {
                Err(StoreError::Unauthorized("denied".into()))
            };
            async move { page }
        })
        .await;

        assert_eq!(result, Err(StoreError::Unauthorized("denied".into())));
        assert_eq!(calls, 2);
    }

    #[test]
    fn request_puts_partition_key_first() {
        let table = descriptor(json!({
            "name": "events",
            "key_schema": [
                { "attribute_name": "at", "key_type": "SORT" },
                { "attribute_name": "user", "key_type": "PARTITION" }
            ],
            "attributes": [
                { "name": "user", "type": "S" },
                { "name": "at", "type": "N" }
            ],
            "billing_mode": "PAY_PER_REQUEST"
        }));

        let parts = CreateTableParts::from_descriptor(&table).unwrap();

        assert_eq!(parts.key_schema[0].attribute_name(), "user");
        assert_eq!(parts.key_schema[0].key_type(), &ddb::KeyType::Hash);
        assert_eq!(parts.key_schema[1].attribute_name(), "at");
        assert_eq!(parts.key_schema[1].key_type(), &ddb::KeyType::Range);
        assert_eq!(
            parts.attribute_definitions[1].attribute_type(),
            &ddb::ScalarAttributeType::N
        );
        assert_eq!(parts.billing_mode, ddb::BillingMode::PayPerRequest);
        assert!(parts.provisioned_throughput.is_none());
        assert!(parts.global_secondary_indexes.is_none());
        assert!(parts.local_secondary_indexes.is_none());
    }

    #[test]
    fn request_carries_indexes_and_throughput() {
        let table = descriptor(json!({
            "name": "events",
            "key_schema": [
                { "attribute_name": "user", "key_type": "HASH" },
                { "attribute_name": "at", "key_type": "RANGE" }
            ],
            "attributes": [
                { "name": "user", "type": "S" },
                { "name": "at", "type": "N" },
                { "name": "kind", "type": "S" }
            ],
            "billing_mode": "PROVISIONED",
            "provisioned_throughput": { "read_capacity_units": 5, "write_capacity_units": 2 },
            "global_secondary_indexes": [{
                "index_name": "by-kind",
                "key_schema": [{ "attribute_name": "kind", "key_type": "HASH" }],
                "projection": { "projection_type": "INCLUDE", "non_key_attributes": ["at"] },
                "provisioned_throughput": { "read_capacity_units": 1, "write_capacity_units": 1 }
            }],
            "local_secondary_indexes": [{
                "index_name": "by-user-kind",
                "key_schema": [
                    { "attribute_name": "user", "key_type": "HASH" },
                    { "attribute_name": "kind", "key_type": "RANGE" }
                ]
            }]
        }));

        let parts = CreateTableParts::from_descriptor(&table).unwrap();

        let throughput = parts.provisioned_throughput.unwrap();
        assert_eq!(throughput.read_capacity_units(), 5);
        assert_eq!(throughput.write_capacity_units(), 2);

        let gsis = parts.global_secondary_indexes.unwrap();
        assert_eq!(gsis.len(), 1);
        assert_eq!(gsis[0].index_name(), "by-kind");

        let lsis = parts.local_secondary_indexes.unwrap();
        assert_eq!(lsis.len(), 1);
        assert_eq!(lsis[0].index_name(), "by-user-kind");
    }

    #[test]
    fn projection_maps_type_and_attributes() {
        let include: SecondaryIndex = serde_json::from_value(json!({
            "index_name": "by-kind",
            "key_schema": [{ "attribute_name": "kind", "key_type": "HASH" }],
            "projection": { "projection_type": "INCLUDE", "non_key_attributes": ["at"] }
        }))
        .unwrap();
        let p = projection(&include);
        assert_eq!(p.projection_type(), Some(&ddb::ProjectionType::Include));
        assert_eq!(p.non_key_attributes(), ["at".to_string()]);

        let all: SecondaryIndex = serde_json::from_value(json!({
            "index_name": "by-kind",
            "key_schema": [{ "attribute_name": "kind", "key_type": "HASH" }]
        }))
        .unwrap();
        let p = projection(&all);
        assert_eq!(p.projection_type(), Some(&ddb::ProjectionType::All));
        assert!(p.non_key_attributes().is_empty());
    }

    #[test]
    fn readiness_requires_active_table_and_indexes() {
        use aws_sdk_dynamodb::types::GlobalSecondaryIndexDescription;

        let creating = TableDescription::builder()
            .table_status(TableStatus::Creating)
            .build();
        assert!(!is_ready(&creating));

        let active = TableDescription::builder()
            .table_status(TableStatus::Active)
            .build();
        assert!(is_ready(&active));

        let index_backfilling = TableDescription::builder()
            .table_status(TableStatus::Active)
            .global_secondary_indexes(
                GlobalSecondaryIndexDescription::builder()
                    .index_status(IndexStatus::Creating)
                    .build(),
            )
            .build();
        assert!(!is_ready(&index_backfilling));
    }
}

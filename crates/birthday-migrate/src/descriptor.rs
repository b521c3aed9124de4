//! Desired shape of one table, as read from the configuration document.
//!
//! Enum spellings accept both the provider-neutral names (`PARTITION`,
//! `SORT`, `ON_DEMAND`) and the DynamoDB wire names (`HASH`, `RANGE`,
//! `PAY_PER_REQUEST`) so existing configuration files keep working.
//! Index definitions may also use the DynamoDB API field names
//! (`IndexName`, `KeySchema`, `Projection`, ...). Unknown fields are
//! rejected so a misspelled optional key cannot silently drop part of
//! a table.

use serde::{Deserialize, Serialize};

/// One table to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDescriptor {
    /// Table name; the idempotency key across runs.
    pub name: String,

    pub key_schema: Vec<KeyElement>,

    pub attributes: Vec<AttributeDefinition>,

    pub billing_mode: BillingMode,

    /// Required for `PROVISIONED` billing, rejected otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<Throughput>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<SecondaryIndex>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_secondary_indexes: Vec<SecondaryIndex>,
}

impl TableDescriptor {
    /// Attribute name of the partition key, if declared.
    pub fn partition_key(&self) -> Option<&str> {
        key_of(&self.key_schema, KeyRole::Partition)
    }

    /// Attribute name of the sort key, if declared.
    pub fn sort_key(&self) -> Option<&str> {
        key_of(&self.key_schema, KeyRole::Sort)
    }

    /// All secondary indexes, global first.
    pub fn indexes(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.global_secondary_indexes
            .iter()
            .chain(&self.local_secondary_indexes)
    }

    /// Every attribute name used by the table's or any index's key schema.
    pub fn referenced_attributes(&self) -> impl Iterator<Item = &str> {
        self.key_schema
            .iter()
            .chain(self.indexes().flat_map(|index| &index.key_schema))
            .map(|key| key.attribute_name.as_str())
    }

    /// Declared type of `attribute`, if any.
    pub fn attribute_type(&self, attribute: &str) -> Option<ScalarType> {
        self.attributes
            .iter()
            .find(|a| a.name == attribute)
            .map(|a| a.r#type)
    }
}

fn key_of(schema: &[KeyElement], role: KeyRole) -> Option<&str> {
    schema
        .iter()
        .find(|key| key.key_type == role)
        .map(|key| key.attribute_name.as_str())
}

/// One element of a key schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyElement {
    #[serde(alias = "AttributeName")]
    pub attribute_name: String,
    #[serde(alias = "KeyType")]
    pub key_type: KeyRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyRole {
    #[serde(rename = "PARTITION", alias = "HASH")]
    Partition,
    #[serde(rename = "SORT", alias = "RANGE")]
    Sort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeDefinition {
    pub name: String,
    pub r#type: ScalarType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    #[serde(rename = "S", alias = "STRING")]
    String,
    #[serde(rename = "N", alias = "NUMBER")]
    Number,
    #[serde(rename = "B", alias = "BINARY")]
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingMode {
    #[serde(rename = "PAY_PER_REQUEST", alias = "ON_DEMAND")]
    PayPerRequest,
    #[serde(rename = "PROVISIONED")]
    Provisioned,
}

/// Fixed read/write capacity for `PROVISIONED` billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Throughput {
    #[serde(alias = "ReadCapacityUnits")]
    pub read_capacity_units: u64,
    #[serde(alias = "WriteCapacityUnits")]
    pub write_capacity_units: u64,
}

/// A global or local secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecondaryIndex {
    #[serde(alias = "IndexName")]
    pub index_name: String,

    #[serde(alias = "KeySchema")]
    pub key_schema: Vec<KeyElement>,

    #[serde(default, alias = "Projection")]
    pub projection: Projection,

    /// Global indexes only, for `PROVISIONED` billing.
    #[serde(
        default,
        alias = "ProvisionedThroughput",
        skip_serializing_if = "Option::is_none"
    )]
    pub provisioned_throughput: Option<Throughput>,
}

impl SecondaryIndex {
    pub fn partition_key(&self) -> Option<&str> {
        key_of(&self.key_schema, KeyRole::Partition)
    }
}

/// Which attributes are copied into an index. Defaults to `ALL`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Projection {
    #[serde(default, alias = "ProjectionType")]
    pub projection_type: ProjectionType,

    /// Only meaningful with `INCLUDE`.
    #[serde(default, alias = "NonKeyAttributes", skip_serializing_if = "Vec::is_empty")]
    pub non_key_attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionType {
    #[default]
    All,
    KeysOnly,
    Include,
}

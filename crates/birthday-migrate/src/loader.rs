//! Configuration loader: JSON document -> validated [`TableDescriptor`]s.
//!
//! Either every table in the document is valid and the whole list is
//! returned, or a [`ConfigError`] is returned and nothing is.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::descriptor::{BillingMode, KeyElement, KeyRole, TableDescriptor};
use crate::errors::ConfigError;

/// DynamoDB table name length bounds.
const MIN_TABLE_NAME_LENGTH: usize = 3;
const MAX_TABLE_NAME_LENGTH: usize = 255;

/// Read and validate the configuration file at `path`.
pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<TableDescriptor>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let tables = parse(&text)?;
    info!(path = %path.display(), count = tables.len(), "loaded table configurations");
    Ok(tables)
}

/// Parse and validate a configuration document.
pub fn parse(text: &str) -> Result<Vec<TableDescriptor>, ConfigError> {
    // The top level is either `{"tables": [...]}` or a bare list.
    let value: serde_json::Value = serde_json::from_str(text)?;
    let tables: Vec<TableDescriptor> = match value {
        serde_json::Value::Object(mut map) => {
            let tables = map
                .remove("tables")
                .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("tables"))?;
            serde_json::from_value(tables)?
        }
        other => serde_json::from_value(other)?,
    };

    validate(&tables)?;
    Ok(tables)
}

/// Check every cross-field invariant the type system cannot express.
pub fn validate(tables: &[TableDescriptor]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for table in tables {
        validate_table(table)?;
        if !names.insert(table.name.as_str()) {
            return Err(ConfigError::invalid(&table.name, "table name is declared more than once"));
        }
    }
    Ok(())
}

fn validate_table(table: &TableDescriptor) -> Result<(), ConfigError> {
    let name = table.name.as_str();
    validate_table_name(name)?;

    let mut declared = HashSet::new();
    for attribute in &table.attributes {
        if !declared.insert(attribute.name.as_str()) {
            return Err(ConfigError::invalid(
                name,
                format!("attribute '{}' is declared more than once", attribute.name),
            ));
        }
    }

    validate_key_schema(name, "table key schema", &table.key_schema)?;

    let mut index_names = HashSet::new();
    for index in table.indexes() {
        if !index_names.insert(index.index_name.as_str()) {
            return Err(ConfigError::invalid(
                name,
                format!("index '{}' is declared more than once", index.index_name),
            ));
        }
        validate_key_schema(
            name,
            &format!("key schema of index '{}'", index.index_name),
            &index.key_schema,
        )?;
    }

    for attribute in table.referenced_attributes() {
        if !declared.contains(attribute) {
            return Err(ConfigError::invalid(
                name,
                format!("key attribute '{attribute}' is not declared in attributes"),
            ));
        }
    }

    for index in &table.local_secondary_indexes {
        if index.partition_key() != table.partition_key() {
            return Err(ConfigError::invalid(
                name,
                format!(
                    "local index '{}' must use the table's partition key",
                    index.index_name
                ),
            ));
        }
        if table.sort_key().is_none() {
            return Err(ConfigError::invalid(
                name,
                format!(
                    "local index '{}' requires the table to have a sort key",
                    index.index_name
                ),
            ));
        }
        if !index.key_schema.iter().any(|key| key.key_type == KeyRole::Sort) {
            return Err(ConfigError::invalid(
                name,
                format!("local index '{}' needs a SORT key", index.index_name),
            ));
        }
    }

    validate_billing(table)
}

fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    if name.len() < MIN_TABLE_NAME_LENGTH || name.len() > MAX_TABLE_NAME_LENGTH {
        return Err(ConfigError::invalid(
            name,
            format!(
                "table name must be {MIN_TABLE_NAME_LENGTH}-{MAX_TABLE_NAME_LENGTH} characters"
            ),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ConfigError::invalid(
            name,
            "table name must contain only letters, digits, '_', '-' and '.'",
        ));
    }

    Ok(())
}

fn validate_key_schema(table: &str, what: &str, schema: &[KeyElement]) -> Result<(), ConfigError> {
    let partitions = schema
        .iter()
        .filter(|key| key.key_type == KeyRole::Partition)
        .count();
    let sorts = schema.len() - partitions;

    if partitions != 1 {
        return Err(ConfigError::invalid(
            table,
            format!("{what} needs exactly one PARTITION key, found {partitions}"),
        ));
    }
    if sorts > 1 {
        return Err(ConfigError::invalid(
            table,
            format!("{what} allows at most one SORT key, found {sorts}"),
        ));
    }
    if let [first, second] = schema {
        if first.attribute_name == second.attribute_name {
            return Err(ConfigError::invalid(
                table,
                format!("{what} uses '{}' twice", first.attribute_name),
            ));
        }
    }

    Ok(())
}

fn validate_billing(table: &TableDescriptor) -> Result<(), ConfigError> {
    // Local indexes share the table's capacity.
    if let Some(index) = table
        .local_secondary_indexes
        .iter()
        .find(|index| index.provisioned_throughput.is_some())
    {
        return Err(ConfigError::invalid(
            &table.name,
            format!(
                "local index '{}' cannot set provisioned_throughput",
                index.index_name
            ),
        ));
    }

    match table.billing_mode {
        BillingMode::Provisioned => {
            if table.provisioned_throughput.is_none() {
                return Err(ConfigError::invalid(
                    &table.name,
                    "PROVISIONED billing requires provisioned_throughput",
                ));
            }
            if let Some(index) = table
                .global_secondary_indexes
                .iter()
                .find(|index| index.provisioned_throughput.is_none())
            {
                return Err(ConfigError::invalid(
                    &table.name,
                    format!(
                        "global index '{}' needs provisioned_throughput under PROVISIONED billing",
                        index.index_name
                    ),
                ));
            }
        }
        BillingMode::PayPerRequest => {
            let has_throughput = table.provisioned_throughput.is_some()
                || table
                    .indexes()
                    .any(|index| index.provisioned_throughput.is_some());
            if has_throughput {
                return Err(ConfigError::invalid(
                    &table.name,
                    "provisioned_throughput is not allowed with PAY_PER_REQUEST billing",
                ));
            }
        }
    }

    for throughput in table
        .provisioned_throughput
        .iter()
        .chain(table.indexes().filter_map(|i| i.provisioned_throughput.as_ref()))
    {
        if throughput.read_capacity_units == 0 || throughput.write_capacity_units == 0 {
            return Err(ConfigError::invalid(
                &table.name,
                "capacity units must be positive",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::descriptor::ScalarType;

    fn users_table() -> serde_json::Value {
        json!({
            "name": "users_birthdays",
            "key_schema": [{ "attribute_name": "username", "key_type": "HASH" }],
            "attributes": [{ "name": "username", "type": "S" }],
            "billing_mode": "PAY_PER_REQUEST"
        })
    }

    fn parse_value(value: serde_json::Value) -> Result<Vec<TableDescriptor>, ConfigError> {
        parse(&value.to_string())
    }

    fn assert_invalid(value: serde_json::Value, needle: &str) {
        match parse_value(value) {
            Err(ConfigError::Invalid { reason, .. }) => {
                assert!(reason.contains(needle), "unexpected reason: {reason}")
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn parses_wrapped_document() {
        let tables = parse_value(json!({ "tables": [users_table()] })).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "users_birthdays");
        assert_eq!(tables[0].attribute_type("username"), Some(ScalarType::String));
    }

    #[test]
    fn parses_bare_list_in_order() {
        let mut second = users_table();
        second["name"] = json!("audit_log");
        let tables = parse_value(json!([users_table(), second])).unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users_birthdays", "audit_log"]);
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_value(json!({ "tables": [] })).unwrap().is_empty());
        assert!(parse_value(json!([])).unwrap().is_empty());
    }

    #[test]
    fn syntax_error_is_malformed() {
        assert!(matches!(parse("{ not json"), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn missing_billing_mode_is_malformed() {
        let mut table = users_table();
        table.as_object_mut().unwrap().remove("billing_mode");
        match parse_value(json!({ "tables": [table] })) {
            Err(ConfigError::Malformed(e)) => assert!(e.to_string().contains("billing_mode")),
            other => panic!("expected malformed config, got {other:?}"),
        }
    }

    #[test]
    fn unknown_key_type_is_malformed() {
        let mut table = users_table();
        table["key_schema"][0]["key_type"] = json!("PRIMARY");
        assert!(matches!(
            parse_value(json!([table])),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn top_level_object_without_tables_is_malformed() {
        assert!(matches!(
            parse_value(json!({ "tabels": [] })),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_undeclared_key_attribute() {
        let mut table = users_table();
        table["key_schema"] = json!([
            { "attribute_name": "username", "key_type": "HASH" },
            { "attribute_name": "created_at", "key_type": "RANGE" }
        ]);
        assert_invalid(json!([table]), "'created_at' is not declared");
    }

    #[test]
    fn rejects_undeclared_index_attribute() {
        let mut table = users_table();
        table["global_secondary_indexes"] = json!([{
            "index_name": "by-email",
            "key_schema": [{ "attribute_name": "email", "key_type": "HASH" }],
            "projection": { "projection_type": "ALL" }
        }]);
        assert_invalid(json!([table]), "'email' is not declared");
    }

    #[test]
    fn one_bad_table_rejects_whole_document() {
        let mut bad = users_table();
        bad["name"] = json!("broken");
        bad["key_schema"] = json!([]);
        assert_invalid(json!([users_table(), bad]), "exactly one PARTITION key");
    }

    #[test]
    fn rejects_two_partition_keys() {
        let mut table = users_table();
        table["attributes"] = json!([
            { "name": "username", "type": "S" },
            { "name": "tenant", "type": "S" }
        ]);
        table["key_schema"] = json!([
            { "attribute_name": "username", "key_type": "HASH" },
            { "attribute_name": "tenant", "key_type": "HASH" }
        ]);
        assert_invalid(json!([table]), "exactly one PARTITION key, found 2");
    }

    #[test]
    fn rejects_key_attribute_used_twice() {
        let mut table = users_table();
        table["key_schema"] = json!([
            { "attribute_name": "username", "key_type": "HASH" },
            { "attribute_name": "username", "key_type": "RANGE" }
        ]);
        assert_invalid(json!([table]), "uses 'username' twice");
    }

    #[test]
    fn rejects_duplicate_table_names() {
        assert_invalid(json!([users_table(), users_table()]), "more than once");
    }

    #[test]
    fn rejects_duplicate_attributes() {
        let mut table = users_table();
        table["attributes"] = json!([
            { "name": "username", "type": "S" },
            { "name": "username", "type": "N" }
        ]);
        assert_invalid(json!([table]), "attribute 'username' is declared more than once");
    }

    #[test]
    fn rejects_bad_table_name() {
        let mut table = users_table();
        table["name"] = json!("ab");
        assert_invalid(json!([table]), "characters");

        table["name"] = json!("users birthdays");
        assert_invalid(json!([table]), "only letters");
    }

    #[test]
    fn local_index_must_share_partition_key() {
        let mut table = users_table();
        table["attributes"] = json!([
            { "name": "username", "type": "S" },
            { "name": "created_at", "type": "N" },
            { "name": "tenant", "type": "S" }
        ]);
        table["key_schema"] = json!([
            { "attribute_name": "username", "key_type": "HASH" },
            { "attribute_name": "created_at", "key_type": "RANGE" }
        ]);
        table["local_secondary_indexes"] = json!([{
            "index_name": "by-tenant",
            "key_schema": [
                { "attribute_name": "tenant", "key_type": "HASH" },
                { "attribute_name": "created_at", "key_type": "RANGE" }
            ]
        }]);
        assert_invalid(json!([table]), "must use the table's partition key");
    }

    #[test]
    fn local_index_requires_table_sort_key() {
        let mut table = users_table();
        table["attributes"] = json!([
            { "name": "username", "type": "S" },
            { "name": "created_at", "type": "N" }
        ]);
        table["local_secondary_indexes"] = json!([{
            "index_name": "by-created",
            "key_schema": [
                { "attribute_name": "username", "key_type": "HASH" },
                { "attribute_name": "created_at", "key_type": "RANGE" }
            ]
        }]);
        assert_invalid(json!([table]), "requires the table to have a sort key");
    }

    fn table_with_sort_key() -> serde_json::Value {
        let mut table = users_table();
        table["attributes"] = json!([
            { "name": "username", "type": "S" },
            { "name": "created_at", "type": "N" }
        ]);
        table["key_schema"] = json!([
            { "attribute_name": "username", "key_type": "HASH" },
            { "attribute_name": "created_at", "key_type": "RANGE" }
        ]);
        table
    }

    #[test]
    fn local_index_requires_sort_key() {
        let mut table = table_with_sort_key();
        table["local_secondary_indexes"] = json!([{
            "index_name": "by-user",
            "key_schema": [{ "attribute_name": "username", "key_type": "HASH" }]
        }]);
        assert_invalid(json!([table]), "local index 'by-user' needs a SORT key");
    }

    #[test]
    fn local_index_rejects_throughput() {
        let mut table = table_with_sort_key();
        table["billing_mode"] = json!("PROVISIONED");
        table["provisioned_throughput"] =
            json!({ "read_capacity_units": 5, "write_capacity_units": 5 });
        table["local_secondary_indexes"] = json!([{
            "index_name": "by-created",
            "key_schema": [
                { "attribute_name": "username", "key_type": "HASH" },
                { "attribute_name": "created_at", "key_type": "RANGE" }
            ],
            "provisioned_throughput": { "read_capacity_units": 1, "write_capacity_units": 1 }
        }]);
        assert_invalid(json!([table]), "cannot set provisioned_throughput");
    }

    #[test]
    fn accepts_indexes_in_dynamodb_format() {
        let mut table = table_with_sort_key();
        table["attributes"] = json!([
            { "name": "username", "type": "S" },
            { "name": "created_at", "type": "N" },
            { "name": "email", "type": "S" }
        ]);
        table["global_secondary_indexes"] = json!([{
            "IndexName": "by-email",
            "KeySchema": [{ "AttributeName": "email", "KeyType": "HASH" }],
            "Projection": { "ProjectionType": "KEYS_ONLY" }
        }]);
        table["local_secondary_indexes"] = json!([{
            "IndexName": "by-created",
            "KeySchema": [
                { "AttributeName": "username", "KeyType": "HASH" },
                { "AttributeName": "created_at", "KeyType": "RANGE" }
            ],
            "Projection": { "ProjectionType": "INCLUDE", "NonKeyAttributes": ["email"] }
        }]);

        let tables = parse_value(json!({ "tables": [table] })).unwrap();
        let names: Vec<_> = tables[0].indexes().map(|i| i.index_name.as_str()).collect();
        assert_eq!(names, vec!["by-email", "by-created"]);
    }

    #[test]
    fn misspelled_optional_key_is_malformed() {
        let mut table = users_table();
        table["global_secondary_index"] = json!([]);
        match parse_value(json!([table])) {
            Err(ConfigError::Malformed(e)) => {
                assert!(e.to_string().contains("global_secondary_index"))
            }
            other => panic!("expected malformed config, got {other:?}"),
        }
    }

    #[test]
    fn provisioned_billing_requires_throughput() {
        let mut table = users_table();
        table["billing_mode"] = json!("PROVISIONED");
        assert_invalid(json!([table.clone()]), "requires provisioned_throughput");

        table["provisioned_throughput"] =
            json!({ "read_capacity_units": 5, "write_capacity_units": 5 });
        assert!(parse_value(json!([table])).is_ok());
    }

    #[test]
    fn on_demand_billing_rejects_throughput() {
        let mut table = users_table();
        table["provisioned_throughput"] =
            json!({ "read_capacity_units": 5, "write_capacity_units": 5 });
        assert_invalid(json!([table]), "not allowed with PAY_PER_REQUEST");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut table = users_table();
        table["billing_mode"] = json!("PROVISIONED");
        table["provisioned_throughput"] =
            json!({ "read_capacity_units": 0, "write_capacity_units": 5 });
        assert_invalid(json!([table]), "must be positive");
    }

    #[test]
    fn load_file_reads_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({ "tables": [users_table()] })).unwrap();

        let tables = load_file(file.path()).unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables_config.json");
        match load_file(&path) {
            Err(ConfigError::Unreadable { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected unreadable config, got {other:?}"),
        }
    }
}

//! Declarative DynamoDB table provisioning.
//!
//! Reads table definitions from a JSON document and creates whatever is
//! missing, tolerating concurrent provisioners and partial earlier runs.

pub mod descriptor;
pub mod dynamo;
pub mod environment;
pub mod errors;
pub mod loader;
pub mod reconciler;
pub mod report;
pub mod store;
pub mod wait;

pub use descriptor::TableDescriptor;
pub use dynamo::DynamoTableStore;
pub use environment::{Environment, StoreSettings};
pub use errors::{ConfigError, MigrateError, StoreError, StoreErrorKind};
pub use reconciler::{CreateOutcome, EntityState, Reconciler, apply_file};
pub use report::{EntityOutcome, RunReport, RunResult};
pub use store::TableStore;

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_config::sts::AssumeRoleProvider;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::config::{Credentials, Region};
use tracing::info;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "eu-central-1";

/// Default DynamoDB Local endpoint.
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:8000";

/// Session name used when assuming a role.
const SESSION_NAME: &str = "birthday-migrate";

/// Target store environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    /// DynamoDB Local (or another compatible endpoint) with dummy credentials
    Local,
    /// AWS DynamoDB with the default credential chain
    Aws,
}

/// Connection settings for the table store.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub environment: Environment,
    pub region: String,
    /// Only used for [`Environment::Local`].
    pub endpoint: Option<String>,
    /// Role to assume in [`Environment::Aws`].
    pub iam_role: Option<String>,
    /// Bound on each individual store call.
    pub call_timeout: Duration,
}

impl StoreSettings {
    /// Endpoint the client will talk to, `None` meaning the AWS default.
    pub fn endpoint_url(&self) -> Option<&str> {
        match self.environment {
            Environment::Local => Some(self.endpoint.as_deref().unwrap_or(DEFAULT_LOCAL_ENDPOINT)),
            Environment::Aws => None,
        }
    }
}

/// Build a DynamoDB client for `settings`.
pub async fn connect(settings: &StoreSettings) -> Client {
    let region = Region::new(settings.region.clone());
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());

    match settings.environment {
        Environment::Local => {
            loader = loader.credentials_provider(Credentials::new(
                "local", "local", None, None, "static",
            ));
        }
        Environment::Aws => {
            if let Some(role) = &settings.iam_role {
                info!(role = %role, "assuming IAM role");
                let provider = AssumeRoleProvider::builder(role)
                    .session_name(SESSION_NAME)
                    .region(region.clone())
                    .build()
                    .await;
                loader = loader.credentials_provider(provider);
            }
        }
    }

    let sdk_config = loader.load().await;

    // Inherit from SdkConfig, then apply our overrides.
    let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config).timeout_config(
        TimeoutConfig::builder()
            .operation_timeout(settings.call_timeout)
            .build(),
    );
    if let Some(endpoint) = settings.endpoint_url() {
        builder = builder.endpoint_url(endpoint);
    }

    info!(
        environment = ?settings.environment,
        region = %settings.region,
        endpoint = settings.endpoint_url().unwrap_or("AWS"),
        "connected to DynamoDB"
    );

    Client::from_conf(builder.build())
}

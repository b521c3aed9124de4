//! birthday-migrate: create the DynamoDB tables described in a JSON file.

use std::path::PathBuf;
use std::time::Duration;

use birthday_migrate::environment::{DEFAULT_REGION, connect};
use birthday_migrate::{
    DynamoTableStore, Environment, MigrateError, Reconciler, StoreSettings, TableStore, loader,
};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "birthday-migrate")]
#[command(about = "Create DynamoDB tables from a declarative configuration")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct StoreArgs {
    /// Target environment
    #[arg(long, value_enum, default_value = "aws", env = "MIGRATE_ENV", global = true)]
    env: Environment,

    /// AWS region
    #[arg(long, default_value = DEFAULT_REGION, env = "AWS_REGION", global = true)]
    region: String,

    /// DynamoDB endpoint URL (local environment only)
    #[arg(long, env = "DYNAMODB_ENDPOINT_URL", global = true)]
    endpoint: Option<String>,

    /// IAM role ARN to assume (aws environment only)
    #[arg(long, env = "IAM_ROLE", global = true)]
    iam_role: Option<String>,

    /// Bound on each individual store call (e.g. "30s")
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration, global = true)]
    call_timeout: Duration,
}

impl From<StoreArgs> for StoreSettings {
    fn from(args: StoreArgs) -> Self {
        Self {
            environment: args.env,
            region: args.region,
            endpoint: args.endpoint,
            iam_role: args.iam_role,
            call_timeout: args.call_timeout,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create every table in the configuration that does not exist yet
    Apply {
        /// Path to the table configuration file
        #[arg(long, default_value = "tables_config.json")]
        config: PathBuf,

        /// How long to wait for each new table to become active (e.g. "5m")
        #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
        ready_timeout: Duration,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the tables in the target store
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_json);

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "birthday-migrate failed");
            eprintln!("Error: {e}");
            1
        }
    };

    std::process::exit(code);
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,aws_config=warn,aws_smithy_runtime=warn,aws_sdk_dynamodb=warn")
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(args: Args) -> Result<i32, MigrateError> {
    let settings = StoreSettings::from(args.store);

    match args.command {
        Command::Apply {
            config,
            ready_timeout,
            format,
        } => {
            // A bad configuration exits before any credentials are resolved.
            let tables = loader::load_file(&config)?;
            if tables.is_empty() {
                warn!("no table configurations found");
            }

            let client = connect(&settings).await;
            let store = DynamoTableStore::new(client, settings.call_timeout);
            let reconciler = Reconciler::new(store).with_ready_timeout(ready_timeout);

            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());

            let report = reconciler.run(&tables, &cancel).await;

            match format {
                OutputFormat::Text => println!("{report}"),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }

            Ok(report.exit_code())
        }

        Command::List => {
            let client = connect(&settings).await;
            let store = DynamoTableStore::new(client, settings.call_timeout);
            let tables = store.list_tables().await?;

            if tables.is_empty() {
                println!("No tables found");
            } else {
                for table in &tables {
                    println!("{table}");
                }
            }
            info!(count = tables.len(), "listed tables");

            Ok(0)
        }
    }
}

/// Cancel `token` on Ctrl-C. Tables already created are left in place.
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });
}

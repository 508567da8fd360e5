//! dbroute command line entry point.
//!
//! Connects every configured pool, runs one command and prints the result
//! as JSON on stdout. Logs go to stderr.

use dbroute::builder::{InsertOptions, SelectOptions, UpdateOptions};
use dbroute::config::{Command, Config};
use dbroute::db::{MySqlRouter, PoolRegistry, SqlExecutor};
use dbroute::error::{DbError, DbResult};
use dbroute::models::{QueryResult, SqlValue};
use serde::de::DeserializeOwned;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn parse_json<T: DeserializeOwned>(what: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::validation(format!("Invalid {what}: {e}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> DbResult<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| DbError::validation(format!("Cannot serialize result: {e}")))?;
    println!("{out}");
    Ok(())
}

async fn run_command(router: &MySqlRouter, command: Command) -> DbResult<()> {
    let result: QueryResult = match command {
        Command::Databases => {
            let registry = router.registry();
            let listing: Vec<serde_json::Value> = registry
                .names()
                .into_iter()
                .filter_map(|name| registry.database(name).map(|db| (name, db)))
                .map(|(name, db)| {
                    serde_json::json!({
                        "name": name,
                        "primary": db.primary().map(|p| serde_json::json!({
                            "endpoint": p.endpoint(),
                            "connectionLimit": p.connection_limit(),
                        })),
                        "replicas": db.replicas().iter().map(|r| serde_json::json!({
                            "endpoint": r.endpoint(),
                            "connectionLimit": r.connection_limit(),
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            return print_json(&listing);
        }
        Command::Query {
            db,
            sql,
            params,
            read,
        } => {
            let params: Vec<SqlValue> = match params {
                Some(raw) => parse_json("params", &raw)?,
                None => Vec::new(),
            };
            router.raw(&sql, params, &db, read).await?
        }
        Command::Select {
            db,
            table,
            options,
            read,
        } => {
            let options: SelectOptions = match options {
                Some(raw) => parse_json("select options", &raw)?,
                None => SelectOptions::default(),
            };
            router.select(&table, options, &db, read).await?
        }
        Command::Insert { db, table, options } => {
            let options: InsertOptions = parse_json("insert options", &options)?;
            router.insert(&table, options, &db).await?
        }
        Command::Update { db, table, options } => {
            let options: UpdateOptions = parse_json("update options", &options)?;
            router.update(&table, options, &db).await?
        }
        Command::Transaction { db, statements } => {
            let mut tx = router.begin_transaction(&db).await?;
            let mut results = Vec::with_capacity(statements.len());
            for sql in statements {
                match tx.raw(&sql, Vec::new()).await {
                    Ok(result) => results.push(result),
                    Err(e) => return Err(tx.abort(e).await),
                }
            }
            tx.commit().await?;
            return print_json(&results);
        }
    };
    print_json(&result)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let descriptors = config.load_descriptors()?;
    info!(
        count = descriptors.len(),
        "Starting dbroute v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = PoolRegistry::connect(&descriptors).await?;
    let router = MySqlRouter::new(registry);

    let result = run_command(&router, config.command).await;
    router.close().await;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        return Err(e.into());
    }
    Ok(())
}

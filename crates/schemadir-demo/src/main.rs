//! Schemadir demo - publish the droids schema and query it through a directory.
//!
//! Everything runs in one process over the in-process event bus and directory.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use schemadir_core::{
    DirectoryOptions, LocalDirectoryProvider, LocalEventBus, Record, SchemaConsumer,
    SchemaPublisher, SchemaRegistration,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "schemadir-demo")]
#[command(about = "Publish the droids schema and run a query against it")]
struct Args {
    /// Query to run
    #[arg(default_value = r#"{ droid(id: "2001") { name primaryFunction } }"#)]
    query: String,

    /// Query variables as a JSON object
    #[arg(long)]
    variables: Option<String>,

    /// Directory to publish into and discover from
    #[arg(short, long, default_value = "theDiscovery")]
    directory: String,

    /// Publish the schema under this name instead of its query type name
    #[arg(long)]
    schema_name: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Parse `--variables`, which must be a JSON object when given.
fn parse_variables(raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("--variables is not valid JSON")?;
    ensure!(value.is_object(), "--variables must be a JSON object");
    Ok(Some(value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let variables = parse_variables(args.variables.as_deref())?;

    let bus = Arc::new(LocalEventBus::new());
    let provider = Arc::new(LocalDirectoryProvider::new(bus.clone()));
    let options = DirectoryOptions::named(&args.directory);

    let publisher = SchemaPublisher::new(bus.clone(), provider.clone())
        .on_published(|registration: &SchemaRegistration| {
            info!("Schema {} is available", registration.schema_name())
        })
        .on_unpublished(|registration: &SchemaRegistration| {
            info!("Schema {} went away", registration.schema_name())
        });
    let definition = match &args.schema_name {
        Some(name) => schemadir_testdata::named_definition(name),
        None => schemadir_testdata::droids_definition(),
    };
    let registration = publisher.publish(&options, definition).await?;

    let consumer = SchemaConsumer::new(bus, provider)
        .on_announce(|record: &Record| debug!("Announced {} ({})", record.name, record.status));
    consumer.start_discovery(&options);

    let result = consumer
        .execute_query(
            &args.directory,
            registration.schema_name(),
            &args.query,
            variables,
        )
        .await?;

    // Query result goes to stdout
    println!("{}", serde_json::to_string_pretty(&result.to_json())?);

    consumer.close();
    publisher.close().await?;
    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variables_must_be_an_object() {
        assert_eq!(parse_variables(None).unwrap(), None);
        assert_eq!(
            parse_variables(Some(r#"{"id": "2000"}"#)).unwrap(),
            Some(json!({"id": "2000"}))
        );

        let err = parse_variables(Some("[1, 2]")).unwrap_err();
        assert_eq!(err.to_string(), "--variables must be a JSON object");
        let err = parse_variables(Some("{ id")).unwrap_err();
        assert_eq!(err.to_string(), "--variables is not valid JSON");
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use querier::query::promql::runner;
use querier::{
    Command, DataType, HttpInfluxClient, InfluxDbAdaptor, QueryContext, RunResult, RunnerRegistry,
};

#[derive(Parser)]
#[command(name = "promql2influxql")]
#[command(about = "Translate PromQL into InfluxQL and run it against InfluxDB 1.x")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Promql2InfluxqlCommands,
}

#[derive(Subcommand)]
enum Promql2InfluxqlCommands {
    /// Run a PromQL query and print the result as Prometheus API JSON
    Query(QueryArgs),
    /// Print the InfluxQL a PromQL query translates to
    Translate(QueryArgs),
    /// List the values of one label
    LabelValues(LabelValuesArgs),
    #[command(flatten)]
    Common(CommonCommands),
}

#[derive(Args, Debug, Clone, Default)]
struct TimeArgs {
    #[arg(long, help = "Database to query (defaults to influxdb.database)")]
    database: Option<String>,

    #[arg(long, value_parser = parse_time, help = "Range start (RFC3339 or unix seconds)")]
    start: Option<DateTime<Utc>>,

    #[arg(long, value_parser = parse_time, help = "Range end (RFC3339 or unix seconds)")]
    end: Option<DateTime<Utc>>,

    #[arg(long, value_parser = parse_time, help = "Evaluation time of an instant query")]
    time: Option<DateTime<Utc>>,

    #[arg(long, value_parser = humantime::parse_duration, help = "Resolution of graph queries, e.g. 30s")]
    step: Option<Duration>,

    #[arg(long, value_parser = parse_timezone, help = "IANA timezone, e.g. Asia/Shanghai")]
    timezone: Option<Tz>,
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// PromQL expression
    query: String,

    #[command(flatten)]
    time: TimeArgs,

    #[arg(long, help = "Return one series per step instead of a table")]
    graph: bool,

    #[arg(long, help = "InfluxDB field holding sample values")]
    value_field: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct LabelValuesArgs {
    /// Label whose values are listed
    label: String,

    #[arg(long = "match", help = "Series selector restricting the values, e.g. go_goroutines")]
    selector: Option<String>,

    #[command(flatten)]
    time: TimeArgs,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let seconds: f64 = s
        .parse()
        .map_err(|_| format!("cannot parse {s:?} as RFC3339 or unix seconds"))?;
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
        .ok_or_else(|| format!("timestamp {s} out of range"))
}

fn parse_timezone(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>().map_err(|e| e.to_string())
}

impl TimeArgs {
    fn apply(self, command: &mut Command, config: &Configuration) {
        command.database = self
            .database
            .unwrap_or_else(|| config.influxdb.database.clone());
        command.start = self.start;
        command.end = self.end;
        command.evaluation = self.time;
        command.step = self.step.unwrap_or_default();
        command.timezone = self.timezone;
    }
}

impl QueryArgs {
    fn into_command(self, config: &Configuration) -> Command {
        let mut command = Command::new(self.query, "");
        self.time.apply(&mut command, config);
        command.data_type = Some(if self.graph {
            DataType::Graph
        } else {
            DataType::Table
        });
        command.value_field_key = self.value_field;
        command
    }
}

impl LabelValuesArgs {
    fn into_command(self, config: &Configuration) -> Command {
        let mut command = Command::new(self.selector.unwrap_or_default(), "");
        self.time.apply(&mut command, config);
        command.data_type = Some(DataType::LabelValues);
        command.label_name = Some(self.label);
        command
    }
}

/// Prometheus API envelope around a result
fn render(result: &RunResult) -> Result<String> {
    let body = serde_json::json!({
        "status": "success",
        "data": result,
    });
    serde_json::to_string_pretty(&body).context("Failed to serialize query result")
}

/// The InfluxQL `query` would send for `command`
fn translate(mut command: Command, config: &Configuration) -> Result<String> {
    runner::apply_defaults(&mut command, config);
    let translation = runner::translate(&command, config).context("Failed to translate PromQL")?;
    Ok(translation.node.to_string())
}

#[tracing::instrument(skip_all, fields(database = %command.database, query = %command.cmd))]
async fn run(config: Configuration, command: Command) -> Result<()> {
    let client =
        HttpInfluxClient::new(&config.influxdb).context("Failed to create InfluxDB client")?;
    let registry = Arc::new(RunnerRegistry::with_defaults());
    let adaptor = InfluxDbAdaptor::new(registry, Arc::new(client), Arc::new(config));

    let ctx = QueryContext::new();
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling query");
            cancel.cancel();
        }
    });

    let result = adaptor
        .query(&ctx, command)
        .await
        .context("Query failed")?;
    println!("{}", render(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command {
        Promql2InfluxqlCommands::Common(command) => utils::handle_common_command(&command, &config),
        Promql2InfluxqlCommands::Translate(args) => {
            let command = args.into_command(&config);
            println!("{}", translate(command, &config)?);
            Ok(())
        }
        Promql2InfluxqlCommands::Query(args) => {
            let command = args.into_command(&config);
            log::info!("Querying {} at {}", command.database, config.influxdb.url);
            run(config, command).await
        }
        Promql2InfluxqlCommands::LabelValues(args) => {
            let command = args.into_command(&config);
            run(config, command).await
        }
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments shared by every promql2influxql binary
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that only inspect the configuration
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};

    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments
    pub fn init_logging(args: &CommonArgs) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level(args)));

        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("promql2influxql Configuration:");
            println!("==============================");
            println!("InfluxDB URL: {}", config.influxdb.url);
            println!("InfluxDB database: {}", config.influxdb.database);
            match &config.influxdb.username {
                Some(user) => println!("InfluxDB user: {user}"),
                None => println!("InfluxDB user: anonymous"),
            }
            println!("Request timeout: {:?}", config.influxdb.request_timeout);
            println!("Query timeout: {:?}", config.query.timeout);
            println!("Max samples: {}", config.query.max_samples);
            println!("Value field key: {}", config.query.value_field_key);
            println!("@ modifier enabled: {}", config.promql.enable_at_modifier);
            println!(
                "Negative offset enabled: {}",
                config.promql.enable_negative_offset
            );
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        if config.influxdb.url.is_empty() {
            anyhow::bail!("InfluxDB URL cannot be empty");
        }
        url::Url::parse(&config.influxdb.url).context("InfluxDB URL is not a valid URL")?;

        if config.query.timeout.is_zero() {
            anyhow::bail!("Query timeout must be greater than zero");
        }

        if config.query.max_samples == 0 {
            anyhow::bail!("Max samples must be greater than zero");
        }

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle commands that only need the configuration
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Validate => validate_config(config),
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

//! Bond query CLI
//!
//! Operator front end for the query engine.
//!
//! # Usage
//!
//! ```bash
//! # One message per line, one session for the whole run
//! echo "precio del COB07CDOPY71 hoy" | bond-query ask
//!
//! # Conversational follow-ups share the session
//! printf 'CDTCLPS5V\nel que tiene la tasa del 8,85\n' | bond-query ask --session desk-1
//!
//! # Comparison requests are answered with the provider comparison
//! echo "compara PIP y PRECIA para COB07CDOPY71" | bond-query ask
//!
//! # Compare both providers for one identifier
//! bond-query compare COB07CDOPY71 --date 2025-06-03
//! ```

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use bond_query::normalize::parse_date;
use bond_query::{missing_data_alerts, EngineConfig, KeywordExtractor, QueryEngine};

#[derive(Parser)]
#[command(name = "bond-query")]
#[command(version)]
#[command(about = "Resolve bond valuation questions against the local cache and provider tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Read messages from stdin and resolve each as one conversational turn
    Ask {
        /// Session identifier shared by all messages
        #[arg(long, short, default_value = "cli", env = "BOND_QUERY_SESSION")]
        session: String,
    },

    /// Compare PIP_LATAM and PRECIA for one identifier
    Compare {
        identifier: String,

        /// Valuation date (defaults to the latest available)
        #[arg(long, short, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("unrecognised date '{}'", raw))
}

fn emit<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
    };
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bond_query=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let engine = QueryEngine::from_config(&config)
        .await
        .context("Failed to initialise query engine")?;

    match cli.command {
        Commands::Ask { session } => {
            let extractor = KeywordExtractor::new();
            for line in io::stdin().lock().lines() {
                let line = line.context("Failed to read stdin")?;
                if line.trim().is_empty() {
                    continue;
                }
                let extracted = match extractor.extract_sync(&line) {
                    Ok(extracted) => extracted,
                    Err(e) => {
                        tracing::warn!("Skipping message: {}", e);
                        continue;
                    }
                };
                let answer = engine
                    .answer(&extracted, &session)
                    .await
                    .context("Resolution failed")?;
                emit(cli.format, &answer)?;
            }
        }
        Commands::Compare { identifier, date } => {
            let comparison = engine
                .compare(&identifier, date)
                .await
                .context("Comparison failed")?;
            let alerts = missing_data_alerts(&comparison);
            emit(
                cli.format,
                &serde_json::json!({ "comparison": comparison, "alerts": alerts }),
            )?;
        }
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use macrosql_api::{HttpResponse, ResourceHandler, Route};
use macrosql_core::{Config, Diagnostic, QueryContext, Severity};
use macrosql_sql::{CteExtraction, CteExtractor, SqlParser};

mod serve;

const DEFAULT_CONFIG: &str = "macrosql.toml";

/// macrosql - SQL macro interpolation for dashboard queries
#[derive(Parser)]
#[command(name = "macrosql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: macrosql.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand the macros of an /interpolate request body
    Interpolate {
        /// Request JSON file, or - for stdin
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Print only the interpolated SQL
        #[arg(short, long)]
        raw: bool,
    },

    /// Print the parsed tree of a SQL file
    Ast {
        /// SQL file, or - for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// List the CTE placeholders of a SQL file
    Ctes {
        /// SQL file, or - for stdin
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Print a table instead of the response envelope
        #[arg(short, long)]
        pretty: bool,
    },

    /// Serve the resource routes as line-delimited JSON over stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        Config::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        Config::default()
    };

    init_tracing(&config, cli.verbose);

    if cli.verbose {
        eprintln!("{} dialect: {}", "Using".cyan(), config.dialect);
    }

    match cli.command {
        Commands::Interpolate { input, raw } => interpolate_command(config, &input, raw),
        Commands::Ast { input } => ast_command(config, &input),
        Commands::Ctes { input, pretty } => ctes_command(config, &input, pretty, cli.verbose),
        Commands::Serve => serve_command(config).await,
    }
}

/// Logs go to stderr; stdout carries command output only
fn init_tracing(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Interpolate command - run /interpolate on a request body
fn interpolate_command(config: Config, input: &Path, raw: bool) -> Result<()> {
    let body = read_input(input)?;
    let handler = ResourceHandler::new(config);
    let response = handler.handle(Route::Interpolate.path(), body.as_bytes(), &QueryContext::new());

    if !raw {
        return print_envelope(&response);
    }

    match response.into_data::<String>() {
        Ok(sql) => {
            println!("{}", sql.unwrap_or_default());
            Ok(())
        }
        Err(message) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            std::process::exit(1);
        }
    }
}

/// Ast command - print the /ast envelope for a SQL file
fn ast_command(config: Config, input: &Path) -> Result<()> {
    let body = query_body(&read_input(input)?);
    let handler = ResourceHandler::new(config);
    let response = handler.handle(Route::Ast.path(), body.as_bytes(), &QueryContext::new());
    print_envelope(&response)
}

/// Ctes command - list CTE placeholders
fn ctes_command(config: Config, input: &Path, pretty: bool, verbose: bool) -> Result<()> {
    let sql = read_input(input)?;

    if !pretty {
        let handler = ResourceHandler::new(config);
        let response = handler.handle(Route::MacroCte.path(), query_body(&sql).as_bytes(), &QueryContext::new());
        return print_envelope(&response);
    }

    let parser = SqlParser::from_dialect(&config.dialect);
    let extraction = parser
        .parse(&sql)
        .map_err(macrosql_sql::Error::from)
        .and_then(|parsed| CteExtractor::with_source(&parsed.sql).extract(&parsed.statements));

    match extraction {
        Ok(extraction) => {
            print_cte_table(&extraction, verbose);
            Ok(())
        }
        Err(e) => {
            print_diagnostic(&e.to_diagnostic());
            std::process::exit(1);
        }
    }
}

/// Serve command - stdio request loop
async fn serve_command(config: Config) -> Result<()> {
    let timeout = config.request_timeout();
    let handler = Arc::new(ResourceHandler::new(config));

    tracing::info!(timeout_ms = timeout.as_millis() as u64, "Starting macrosql resource server on stdio");

    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    serve::serve(handler, timeout, reader, tokio::io::stdout()).await?;

    tracing::info!("macrosql resource server stopped");
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
    }
}

/// `{"data": {"query": sql}}`
fn query_body(sql: &str) -> String {
    serde_json::json!({ "data": { "query": sql } }).to_string()
}

fn print_envelope(response: &HttpResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(())
}

/// Print extracted CTEs to stdout
fn print_cte_table(extraction: &CteExtraction, verbose: bool) {
    if extraction.is_empty() {
        println!("{}", "No CTE placeholders found".yellow());
        return;
    }

    println!("{}", "CTE Placeholders".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());

    for cte in extraction.ctes.values() {
        let position = cte
            .macro_pos
            .map(|pos| pos.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} {} (at {})", cte.name.green().bold(), cte.macro_name, position);

        if verbose {
            println!("    {}", cte.body);
        }
    }

    let duplicates = extraction.duplicate_diagnostics();
    if !duplicates.is_empty() {
        println!();
        for diag in &duplicates {
            print_diagnostic(diag);
        }
    }
}

fn print_diagnostic(diag: &Diagnostic) {
    let severity_str = match diag.severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warn => "WARN".yellow().bold(),
        Severity::Info => "INFO".cyan(),
    };

    eprintln!("[{}] {}: {}", severity_str, diag.code, diag.message);
    if let Some(location) = &diag.location {
        eprintln!("    at {}", location);
    }
}

//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use transport::Method;

#[derive(Debug, Parser)]
#[command(name = "billing-cli")]
#[command(about = "Command-line client for the billing API")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(long, env = "CONFIG_PATH", default_value = "billing-cli.toml")]
    pub config: PathBuf,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Log in and store credentials
    Login { username: String, password: String },

    /// Revoke the refresh credential and forget the session
    Logout,

    /// Show whether a session is stored
    Status,

    /// Send an authenticated request and print the response body
    Request {
        #[arg(value_parser = parse_method)]
        method: Method,
        path: String,
        /// JSON request body
        #[arg(value_parser = parse_json)]
        body: Option<serde_json::Value>,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid method: {raw}"))
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("body is not valid JSON: {e}"))
}

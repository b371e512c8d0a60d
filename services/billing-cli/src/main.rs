//! Billing API command-line client
//!
//! Thin host around `AuthenticatedClient`:
//! 1. Loads config and the credential file
//! 2. Wires the HTTP transport, token store and session invalidator
//! 3. Runs one command (login, logout, status, request)
//! 4. Exits 0 on success, 1 on any failure, 2 on bad usage (from clap)

mod cli;
mod config;
mod error;
mod metrics;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use billing_auth::{FileStorage, TokenStore};
use billing_session::{AuthenticatedClient, ClientError, ClientOptions, SessionInvalidator};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{ApiRequest, ApiResponse, HeaderInjection, HttpTransport};

use crate::cli::{Cli, Command};
use crate::config::{Config, LogFormat};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing to stderr with LOG_LEVEL / RUST_LOG support.
///
/// stdout is reserved for command output.
fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_tracing(config.log.format);
    info!(
        path = %config_path.display(),
        base_url = %config.api.base_url,
        storage = %config.storage.path.display(),
        "configuration loaded"
    );

    let prometheus = if cli.metrics {
        Some(metrics::install_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let client = build_client(&config)?;
    let code = match cli.command {
        Command::Login { username, password } => login(&client, &username, &password).await?,
        Command::Logout => {
            client.logout().await;
            println!("logged out");
            ExitCode::SUCCESS
        }
        Command::Status => status(&client, &config),
        Command::Request { method, path, body } => {
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.with_json(&body)?;
            }
            request_command(&client, request).await?
        }
    };

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }
    Ok(code)
}

fn build_client(config: &Config) -> Result<AuthenticatedClient> {
    let storage = FileStorage::open(&config.storage.path).with_context(|| {
        format!(
            "failed to open credential storage {}",
            config.storage.path.display()
        )
    })?;
    let store = Arc::new(TokenStore::load(Arc::new(storage))?);

    let http = reqwest::Client::builder()
        .user_agent(concat!("billing-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let transport = Arc::new(HttpTransport::new(http, config.api.base_url.clone()));

    let invalidator = Arc::new(SessionInvalidator::new(|| {
        warn!("session expired, please log in again");
    }));

    let options = ClientOptions {
        request_timeout: config.api.timeout(),
        refresh_timeout: config.api.refresh_timeout(),
        headers: config
            .headers
            .iter()
            .map(|h| HeaderInjection::new(h.name.clone(), h.value.clone()))
            .collect(),
    };
    Ok(AuthenticatedClient::new(transport, store, invalidator, options))
}

async fn login(client: &AuthenticatedClient, username: &str, password: &str) -> Result<ExitCode> {
    match client.login(username, password).await {
        Ok(profile) => {
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_auth_failure() => {
            eprintln!("login failed: {e}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("login failed"),
    }
}

fn status(client: &AuthenticatedClient, config: &Config) -> ExitCode {
    if client.is_authenticated() {
        println!("logged in ({})", config.api.base_url);
        ExitCode::SUCCESS
    } else {
        println!("not logged in");
        ExitCode::FAILURE
    }
}

async fn request_command(client: &AuthenticatedClient, request: ApiRequest) -> Result<ExitCode> {
    match client.send(request).await {
        Ok(response) => {
            print_body(&response);
            Ok(ExitCode::SUCCESS)
        }
        Err(ClientError::Http(response)) => {
            eprintln!("HTTP {}", response.status());
            print_body(&response);
            Ok(ExitCode::FAILURE)
        }
        Err(e) if e.is_auth_failure() && !client.is_authenticated() => {
            debug!(error = %e, "request failed without a session");
            Err(error::Error::NotLoggedIn.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print a response body, pretty-printing JSON.
fn print_body(response: &ApiResponse) {
    if response.body().is_empty() {
        return;
    }
    match response.json::<serde_json::Value>() {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{}", String::from_utf8_lossy(response.body())),
        },
        Err(_) => println!("{}", String::from_utf8_lossy(response.body())),
    }
}

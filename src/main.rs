//! CLI entry point for hsdp: send one raw request through the dispatcher.
//!
//! Loads the client config (TOML), builds a request for the chosen service
//! family, attaches credentials per the strategy flags, and prints the
//! response status and body.
//!
//! Exit codes:
//! - 0: success (2xx)
//! - 1: runtime error (config, credentials, transport, non-2xx status)
//! - 2: argument validation error (clap handles this automatically)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use reqwest::Method;
use tracing_subscriber::EnvFilter;

use hsdp_api::client::{AuthStrategy, Client};
use hsdp_api::config::Config;
use hsdp_api::request::{Request, query};
use hsdp_api::response::Response;
use hsdp_api::service::Service;

#[derive(Parser)]
#[command(name = "hsdp", version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file with base URLs and signing keys.
    #[arg(long, env = "HSDP_CONFIG")]
    config: Option<PathBuf>,

    /// Service family: iam, idm, mdm, console or cartel.
    #[arg(long)]
    service: Service,

    /// HTTP method.
    #[arg(long, short = 'X', default_value = "GET")]
    method: String,

    /// Path relative to the service base URL.
    #[arg(long)]
    path: String,

    /// JSON request body.
    #[arg(long, short = 'd')]
    data: Option<String>,

    /// Query parameter as KEY=VALUE. Repeatable.
    #[arg(long = "query", short = 'q', value_name = "KEY=VALUE")]
    query: Vec<String>,

    /// Overrides the family's default `api-version` header.
    #[arg(long)]
    api_version: Option<String>,

    /// Overrides the configured base URL for the chosen service.
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token. Prefer the HSDP_TOKEN environment variable to keep the
    /// token out of process listings and shell history.
    #[arg(long, env = "HSDP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(flatten)]
    strategy: StrategyFlags,
}

/// Credential selection. At most one may be set; with none, the call is
/// signed when a valid signer is configured and uses the bearer token
/// otherwise.
#[derive(clap::Args)]
#[group(required = false, multiple = false)]
struct StrategyFlags {
    /// Require a signed request.
    #[arg(long)]
    signed: bool,

    /// Require a bearer token.
    #[arg(long)]
    bearer: bool,

    /// Send no credentials.
    #[arg(long)]
    anonymous: bool,
}

impl StrategyFlags {
    fn strategy(&self) -> AuthStrategy {
        if self.signed {
            AuthStrategy::Signed
        } else if self.bearer {
            AuthStrategy::Bearer
        } else if self.anonymous {
            AuthStrategy::Anonymous
        } else {
            AuthStrategy::SignedIfAvailable
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(cli.service, url.clone());
    }
    if let Some(token) = &cli.token {
        config = config.with_token(token.clone());
    }
    Ok(config)
}

fn build_request(cli: &Cli) -> Result<Request, String> {
    let method = Method::from_bytes(cli.method.to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid method {}: {e}", cli.method))?;
    let mut request = Request::new(cli.service, method, cli.path.clone());

    if let Some(data) = &cli.data {
        let body: serde_json::Value =
            serde_json::from_str(data).map_err(|e| format!("--data is not valid JSON: {e}"))?;
        request = request.json(&body).map_err(|e| e.to_string())?;
    }
    for pair in &cli.query {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("--query expects KEY=VALUE, got {pair}"))?;
        request = request.option(query(key, value)).map_err(|e| e.to_string())?;
    }
    if let Some(version) = &cli.api_version {
        request = request.api_version(version).map_err(|e| e.to_string())?;
    }
    Ok(request)
}

fn print_response(response: &Response) {
    println!("{}", response.status);
    if response.body.is_empty() {
        return;
    }
    match serde_json::from_slice::<serde_json::Value>(&response.body) {
        Ok(json) => match serde_json::to_string_pretty(&json) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{}", response.text()),
        },
        Err(_) => println!("{}", response.text()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let client = match Client::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let request = match build_request(&cli) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match client.send(request, cli.strategy.strategy()).await {
        Ok(response) => {
            print_response(&response);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(response) = e.response() {
                print_response(response);
            }
            ExitCode::FAILURE
        }
    }
}

//! rolegate-check - validate a deployment's role and backend configuration
//!
//! Loads the role catalog and the backends file, checks that every backend a
//! role references is configured, and with `--probe` opens a service session
//! on each backend.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use rolegate_connector::traits::Backend;
use rolegate_connector_ldap::{BackendRegistry, BackendsConfig};
use rolegate_roles::RoleCatalog;

mod logging;

/// Validate rolegate configuration
#[derive(Parser, Debug)]
#[command(name = "rolegate-check")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Roles file
    #[arg(long, env = "ROLEGATE_ROLES")]
    roles: PathBuf,

    /// Backends file
    #[arg(long, env = "ROLEGATE_BACKENDS")]
    backends: PathBuf,

    /// Connect to every backend and bind with its service account
    #[arg(long)]
    probe: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = logging::DEFAULT_FILTER)]
    log_filter: String,
}

/// What a successful check found.
#[derive(Debug)]
struct Summary {
    roles: usize,
    admin_roles: Vec<String>,
    backends: Vec<String>,
}

/// Load both files and cross-check them.
fn check(roles: &PathBuf, backends: &PathBuf) -> anyhow::Result<(Summary, BackendRegistry)> {
    let catalog = RoleCatalog::load(roles)
        .with_context(|| format!("role catalog {} is invalid", roles.display()))?;

    let config = BackendsConfig::from_file(backends)
        .with_context(|| format!("backends file {} is invalid", backends.display()))?;
    let registry = BackendRegistry::from_config(&config)
        .with_context(|| format!("backends file {} is invalid", backends.display()))?;

    let names: Vec<&str> = registry.names().collect();
    catalog
        .check_backends(&names)
        .context("roles do not match the configured backends")?;

    let summary = Summary {
        roles: catalog.len(),
        admin_roles: catalog.admin_roles().into_iter().map(str::to_string).collect(),
        backends: names.iter().map(|n| n.to_string()).collect(),
    };
    Ok((summary, registry))
}

/// Test every backend. Returns the names of those that failed.
async fn probe(registry: &BackendRegistry) -> Vec<String> {
    let mut failed = Vec::new();
    for (name, backend) in registry.iter() {
        match backend.test_connection().await {
            Ok(()) => info!(backend = %name, backend_type = %backend.backend_type(), "Backend reachable"),
            Err(e) => {
                error!(backend = %name, error = %e, code = e.error_code(), "Backend probe failed");
                failed.push(name.to_string());
            }
        }
    }
    failed
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = logging::init_logging(&cli.log_filter, cli.json_logs) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    let (summary, registry) = match check(&cli.roles, &cli.backends) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        roles = summary.roles,
        admin_roles = ?summary.admin_roles,
        backends = ?summary.backends,
        "Configuration is valid"
    );

    if cli.probe {
        let failed = probe(&registry).await;
        if !failed.is_empty() {
            eprintln!("error: unreachable backends: {}", failed.join(", "));
            return ExitCode::FAILURE;
        }
    }

    println!(
        "ok: {} roles, {} backends ({})",
        summary.roles,
        summary.backends.len(),
        summary.backends.join(", ")
    );
    ExitCode::SUCCESS
}

//! pep-extauth - Envoy external authorization backed by Keycloak permissions

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use pep_extauth::config::AuthServerConfig;
use pep_extauth::server::AuthServer;
use pep_extauth::telemetry::{init_tracing, LogFormat};

/// Envoy ext_authz decision point: upstream check, then Keycloak UMA permission
#[derive(Parser, Debug)]
#[command(name = "pep-extauth", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file; when omitted configuration is read from the environment
    #[arg(short = 'c', long = "config", env = "PEP_EXTAUTH_CONFIG")]
    config_file: Option<PathBuf>,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format)?;

    let config = match &cli.config_file {
        Some(path) => AuthServerConfig::load(path)?,
        None => AuthServerConfig::from_env()?,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    AuthServer::from_config(&config)?.run(addr).await?;

    Ok(())
}

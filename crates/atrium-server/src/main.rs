use atrium_backends::Backends;
use atrium_core::{Gateway, GatewaySettings};
use atrium_server::{Api, ServerConfig, ServerError};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "atriumd", about = "Atrium control-plane API gateway")]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 80)]
    port: u16,

    /// Address to bind to.
    #[arg(long = "bind", env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    bind_address: String,

    /// Directory holding the downloadable CLI binaries.
    #[arg(long, env = "CLI_RESOURCES_DIR", default_value = "./resources")]
    resources_dir: PathBuf,

    /// Accept every request as an admin without checking tokens.
    #[arg(long, env = "DISABLE_AUTH")]
    disable_auth: bool,
}

fn run(cli: Cli) -> Result<(), ServerError> {
    let backends = Backends::from_env()?;
    let settings = GatewaySettings::from_env()?;
    if cli.disable_auth {
        warn!("authorization is disabled, every request acts as admin");
    }
    info!("CLI resources directory: {}", cli.resources_dir.display());

    let api = Arc::new(Api::new(
        Gateway::new(backends, settings),
        ServerConfig {
            resources_dir: cli.resources_dir,
            disable_auth: cli.disable_auth,
        },
    ));
    let addr = format!("{}:{}", cli.bind_address, cli.port);
    info!("starting atriumd on {addr}");
    atrium_server::run_server(&api, &addr)
}

fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = dotenv {
        info!("loaded environment from {}", path.display());
    }

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

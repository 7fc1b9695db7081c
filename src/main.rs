//! VOMS Metadata Server - VM metadata behind VOMS authentication.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use voms_metadata_server::{
    Result,
    cli::{Cli, Command, PolicyCommand},
    config::Config,
    server::Server,
    setup_tracing,
    voms::{AttributeValidator, VomsPolicy},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Policy(PolicyCommand::Check { file })) => run_policy_check(&file),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Validate a policy file offline and print the allow-list.
fn run_policy_check(file: &Path) -> ExitCode {
    match VomsPolicy::load(file) {
        Ok(policy) => {
            println!("{}: {} VO(s) allowed", file.display(), policy.len());
            for vo in policy.vo_names() {
                println!("  {vo}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Policy check failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the server
async fn run_server(cli: Cli) -> ExitCode {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    // CLI flags override file/env configuration
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    let validator = match build_validator(&config) {
        Ok(validator) => validator,
        Err(e) => {
            error!("Failed to initialise the validation backend: {e}");
            return ExitCode::FAILURE;
        }
    };

    match Server::new(config, validator).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "libvoms")]
fn build_validator(config: &Config) -> Result<Arc<dyn AttributeValidator>> {
    use voms_metadata_server::voms::{LibVomsValidator, ValidatorOptions};

    let options = ValidatorOptions {
        vomsdir_path: config.voms.vomsdir_path.clone(),
        ca_path: config.voms.ca_path.clone(),
        skip_verify: config.voms.skip_verify,
    };
    let validator = LibVomsValidator::open(&config.voms.vomsapi_lib, &options)?;
    Ok(Arc::new(validator))
}

#[cfg(not(feature = "libvoms"))]
fn build_validator(config: &Config) -> Result<Arc<dyn AttributeValidator>> {
    let _ = config;
    Err(voms_metadata_server::Error::Config(
        "this build has no attribute-certificate validation backend; \
         rebuild with `--features libvoms`"
            .to_string(),
    ))
}

//! VOMS Metadata Server Library
//!
//! A small VM metadata store fronted by VOMS attribute-certificate
//! authentication. The authentication layer intercepts every request,
//! reconstructs the client certificate chain from transport metadata,
//! has the attribute certificate verified by the external VOMS routine,
//! decodes the FQANs, checks the asserted VO against a startup-loaded
//! allow-list, and only then stamps the request with an identity the
//! metadata handlers can trust.
//!
//! # Features
//!
//! - `libvoms` — native `libvomsapi` validation backend (off by default)

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod server;
pub mod voms;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}

//! Attribute-certificate validation boundary.
//!
//! Cryptographic verification of the VOMS attribute certificate is not
//! done here: it is delegated to an external, already-trusted routine
//! behind the [`AttributeValidator`] trait. The production binding lives
//! in [`crate::voms::libvoms`] (feature `libvoms`); tests plug in doubles.
//!
//! Implementations must scope whatever verification session they need to
//! a single `validate` call and release it on every exit path. The
//! middleware runs `validate` on a blocking-capable context, and a spawned
//! blocking task runs to completion even when the request that started it
//! is cancelled, so RAII guards inside implementations are sufficient.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::chain::CertificateChain;

/// The decoded attribute-certificate payload.
///
/// Produced once per request by the validation boundary, immutable after
/// construction, discarded at request end. `fqans` preserves the order
/// returned by the validator, which reflects the groups ordering inside
/// the certificate. An empty `fqans` means the certificate encodes no
/// group memberships; a certificate with no attribute data at all never
/// gets here (the validator reports a [`ValidationFailure`] instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCertificateInfo {
    /// Subject DN of the holder
    pub user: String,
    /// DN of the CA that issued the holder certificate
    pub user_ca: String,
    /// DN of the issuing VOMS server
    pub server: String,
    /// DN of the CA that issued the server certificate
    pub server_ca: String,
    /// Virtual Organization name
    pub vo_name: String,
    /// URI of the issuing VOMS server
    pub uri: String,
    /// Attribute certificate version
    pub version: i32,
    /// Attribute certificate serial
    pub serial: String,
    /// Validity window start
    pub not_before: DateTime<Utc>,
    /// Validity window end
    pub not_after: DateTime<Utc>,
    /// Raw FQAN strings, in certificate order
    pub fqans: Vec<String>,
}

/// Opaque diagnostic from the external verification routine.
///
/// Covers bad signatures, untrusted CAs and absent attribute data alike.
/// The code is for server-side logs only and is never echoed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationFailure {
    code: i32,
}

impl ValidationFailure {
    /// Wrap a native error code.
    #[must_use]
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    /// The native diagnostic code.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attribute certificate validation failed (code {})",
            self.code
        )
    }
}

impl std::error::Error for ValidationFailure {}

/// Options for the validation boundary, fixed at construction.
///
/// `skip_verify` exists for local testing against unsigned ACs and is
/// never toggled after startup.
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Directory with per-VO LSC/certificate files
    pub vomsdir_path: PathBuf,
    /// Directory with trusted CA certificates
    pub ca_path: PathBuf,
    /// Skip AC signature verification (local testing only)
    pub skip_verify: bool,
}

/// The validation boundary contract.
///
/// `validate` is blocking by design: it may perform CPU-bound
/// cryptographic checks and read the CA/VOMS directories. Callers must
/// not run it on a cooperative scheduler thread.
pub trait AttributeValidator: Send + Sync {
    /// Verify the chain's attribute certificate and decode its payload.
    fn validate(
        &self,
        chain: &CertificateChain,
    ) -> Result<AttributeCertificateInfo, ValidationFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_display_carries_the_code() {
        let failure = ValidationFailure::new(14);
        assert_eq!(
            failure.to_string(),
            "attribute certificate validation failed (code 14)"
        );
        assert_eq!(failure.code(), 14);
    }
}

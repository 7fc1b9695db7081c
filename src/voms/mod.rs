//! VOMS attribute-certificate authentication.
//!
//! Authenticates callers from the TLS client certificate chain and the
//! VOMS attribute certificate it carries, then authorizes the asserted
//! Virtual Organization against a startup-loaded allow-list.
//!
//! # Architecture
//!
//! ```text
//! request headers (SSL_CLIENT_*)
//!   → chain      certificate chain extraction (x509 sanity checks)
//!   → validator  attribute-certificate verification (external routine)
//!   → fqan       group/role/capability decoding
//!   → policy     VO allow-list membership
//!   → middleware stamps AuthenticatedIdentity, forwards downstream
//! ```
//!
//! # Modules
//!
//! - [`chain`] — `TlsMetadata`, `CertificateChain`, PEM re-flowing
//! - [`validator`] — the validation boundary contract
//! - [`fqan`] — FQAN grammar (`ParsedFqan`)
//! - [`policy`] — `VomsPolicy` allow-list
//! - [`middleware`] — the per-request pipeline
//! - [`libvoms`] — native `libvomsapi` binding (feature `libvoms`)

pub mod chain;
pub mod fqan;
#[cfg(feature = "libvoms")]
pub mod libvoms;
pub mod middleware;
pub mod policy;
pub mod validator;

pub use chain::{CertificateChain, ChainExtractionError, TlsMetadata};
pub use fqan::{FqanParseError, ParsedFqan, parse_fqan};
#[cfg(feature = "libvoms")]
pub use libvoms::LibVomsValidator;
pub use middleware::{
    AuthRejection, AuthenticatedIdentity, VomsAttributes, VomsAuthState, voms_auth_middleware,
};
pub use policy::VomsPolicy;
pub use validator::{
    AttributeCertificateInfo, AttributeValidator, ValidationFailure, ValidatorOptions,
};

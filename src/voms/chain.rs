//! Certificate chain extraction.
//!
//! The TLS-terminating frontend (Apache mod_ssl or equivalent) forwards the
//! client certificate material as request headers using the classic
//! `SSL_CLIENT_*` names. Header values cannot carry newlines, so PEM
//! arrives newline-folded (spaces or tabs in place of line breaks); the
//! extractor re-flows the base64 body into canonical PEM and checks that
//! each blob actually parses as X.509 before handing it to the validation
//! boundary.

use axum::http::HeaderMap;
use thiserror::Error;
use x509_parser::pem::parse_x509_pem;

/// Header carrying the client certificate subject DN.
pub const SSL_CLIENT_S_DN_HEADER: &str = "ssl-client-s-dn";
/// Header carrying the PEM client certificate.
pub const SSL_CLIENT_CERT_HEADER: &str = "ssl-client-cert";
/// Header carrying the PEM first intermediate certificate.
pub const SSL_CLIENT_CERT_CHAIN_0_HEADER: &str = "ssl-client-cert-chain-0";

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Why chain extraction failed.
///
/// Distinct from a validation failure: this is the transport handing us
/// nothing (or garbage), before any cryptographic check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChainExtractionError {
    /// No client certificate in the transport metadata
    #[error("client certificate missing from transport metadata")]
    MissingCertificate,
    /// No chain certificate in the transport metadata
    #[error("chain certificate missing from transport metadata")]
    MissingChain,
    /// Value is not a PEM CERTIFICATE block
    #[error("certificate material is not valid PEM")]
    MalformedPem,
    /// PEM decoded but the DER payload is not an X.509 certificate
    #[error("certificate material is not valid X.509")]
    InvalidX509,
}

/// Transport-layer metadata for one connection, as handed over by the
/// TLS frontend. Every field may legitimately be absent.
#[derive(Debug, Clone, Default)]
pub struct TlsMetadata {
    /// Subject DN reported by the frontend
    pub subject_dn: Option<String>,
    /// PEM client certificate (possibly newline-folded)
    pub client_cert: Option<String>,
    /// PEM first chain certificate (possibly newline-folded)
    pub client_chain: Option<String>,
}

impl TlsMetadata {
    /// Collect the `SSL_CLIENT_*` headers from a request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            subject_dn: get(SSL_CLIENT_S_DN_HEADER),
            client_cert: get(SSL_CLIENT_CERT_HEADER),
            client_chain: get(SSL_CLIENT_CERT_CHAIN_0_HEADER),
        }
    }
}

/// The subject certificate plus its issuer chain, reconstructed from
/// transport metadata. Owned by a single request and discarded with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    /// Subject DN (frontend-reported, falling back to the parsed leaf)
    pub subject_dn: String,
    /// Canonical PEM of the client certificate
    pub cert_pem: String,
    /// Canonical PEM of the issuer certificates, ordered leaf-first
    pub chain_pem: Vec<String>,
}

impl CertificateChain {
    /// Build a chain from transport metadata.
    ///
    /// Pure transform, no side effects. Missing or unparseable material
    /// is an expected failure input, not a crash condition.
    pub fn extract(metadata: &TlsMetadata) -> Result<Self, ChainExtractionError> {
        let cert_raw = metadata
            .client_cert
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ChainExtractionError::MissingCertificate)?;
        let chain_raw = metadata
            .client_chain
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ChainExtractionError::MissingChain)?;

        let cert_pem = normalize_pem(cert_raw)?;
        let leaf_subject = parse_subject(&cert_pem)?;

        let chain_cert = normalize_pem(chain_raw)?;
        parse_subject(&chain_cert)?;

        let subject_dn = metadata
            .subject_dn
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map_or(leaf_subject, str::to_owned);

        Ok(Self {
            subject_dn,
            cert_pem,
            chain_pem: vec![chain_cert],
        })
    }
}

/// Re-flow a possibly newline-folded PEM blob into canonical form.
fn normalize_pem(raw: &str) -> Result<String, ChainExtractionError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix(PEM_BEGIN)
        .and_then(|rest| rest.strip_suffix(PEM_END))
        .ok_or(ChainExtractionError::MalformedPem)?;

    let b64: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if b64.is_empty() || !b64.is_ascii() {
        return Err(ChainExtractionError::MalformedPem);
    }

    let mut out = String::with_capacity(b64.len() + b64.len() / 64 + 64);
    out.push_str(PEM_BEGIN);
    out.push('\n');
    for chunk in b64.as_bytes().chunks(64) {
        let line =
            std::str::from_utf8(chunk).map_err(|_| ChainExtractionError::MalformedPem)?;
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(PEM_END);
    out.push('\n');
    Ok(out)
}

/// Parse canonical PEM as X.509 and return the subject DN.
fn parse_subject(pem: &str) -> Result<String, ChainExtractionError> {
    let (_, parsed) =
        parse_x509_pem(pem.as_bytes()).map_err(|_| ChainExtractionError::MalformedPem)?;
    let cert = parsed
        .parse_x509()
        .map_err(|_| ChainExtractionError::InvalidX509)?;
    Ok(cert.subject().to_string())
}

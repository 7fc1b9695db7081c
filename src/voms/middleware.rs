//! VOMS authentication middleware.
//!
//! Every request to a protected route runs a strictly sequential
//! five-stage pipeline:
//!
//! ```text
//! Start → ChainExtracted → Validated → Parsed → PolicyChecked
//!                                                  → Authenticated | Rejected
//! ```
//!
//! On success the request is stamped with [`AuthenticatedIdentity`] (and
//! the parsed FQAN list as [`VomsAttributes`]) and forwarded downstream
//! otherwise unchanged. Any rejection is terminal: the downstream handler
//! is never invoked, and no stage is retried within a request. A fresh
//! request always starts a fresh pipeline; nothing survives between
//! requests except the read-only policy.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error, warn};

use super::chain::{CertificateChain, ChainExtractionError, TlsMetadata};
use super::fqan::{FqanParseError, ParsedFqan, parse_fqan};
use super::policy::VomsPolicy;
use super::validator::{AttributeValidator, ValidationFailure};

/// Shared state of the authentication layer.
///
/// The policy is the only cross-request resource and is read-only after
/// startup; the validator holds no per-request state of its own.
pub struct VomsAuthState {
    /// VO allow-list, immutable post-load
    pub policy: VomsPolicy,
    /// Validation boundary implementation
    pub validator: Arc<dyn AttributeValidator>,
}

/// The identity stamped onto an authenticated request.
///
/// Lives in the request extensions for the lifetime of that request only;
/// never persisted or shared across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    /// Authenticated principal: the certificate subject DN
    pub principal: String,
    /// Virtual Organization the request authenticated under
    pub vo_name: String,
}

/// The request's parsed FQANs, in certificate order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VomsAttributes(pub Vec<ParsedFqan>);

/// Terminal rejection outcomes of the pipeline.
///
/// One variant per failure kind so callers and tests can switch on kind;
/// none of these is retried within a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// Certificate or chain material missing/malformed
    Chain(ChainExtractionError),
    /// External validator rejected the attribute certificate
    Validation(ValidationFailure),
    /// A raw FQAN did not match the expected grammar
    FqanParse(FqanParseError),
    /// Certificate fine, VO not in the allow-list
    PolicyDenied {
        /// The VO name that was denied
        vo_name: String,
    },
    /// The validator task could not be run to completion
    Internal,
}

impl IntoResponse for AuthRejection {
    // Diagnostic detail (native codes, parse positions) stays in the
    // server logs; response bodies carry generic messages only.
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Chain(_) => (
                StatusCode::UNAUTHORIZED,
                "client certificate chain missing or malformed",
            ),
            Self::Validation(_) => (
                StatusCode::UNAUTHORIZED,
                "attribute certificate rejected",
            ),
            Self::FqanParse(_) => (
                StatusCode::UNAUTHORIZED,
                "attribute certificate rejected",
            ),
            Self::PolicyDenied { .. } => {
                (StatusCode::FORBIDDEN, "VO is not authorized")
            }
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "authentication backend unavailable",
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Authentication middleware entry point.
pub async fn voms_auth_middleware(
    State(state): State<Arc<VomsAuthState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    // Start → ChainExtracted
    let metadata = TlsMetadata::from_headers(request.headers());
    let chain = match CertificateChain::extract(&metadata) {
        Ok(chain) => chain,
        Err(e) => {
            warn!(path = %path, error = %e, "Certificate chain extraction failed");
            return AuthRejection::Chain(e).into_response();
        }
    };

    // ChainExtracted → Validated. The boundary call does CPU-bound
    // verification plus CA-directory I/O, so it runs off the cooperative
    // scheduler. The blocking task runs to completion even if this future
    // is dropped mid-await, which is what guarantees the validator's
    // session guard releases under cancellation.
    let validator = Arc::clone(&state.validator);
    let subject = chain.subject_dn.clone();
    let outcome = tokio::task::spawn_blocking(move || validator.validate(&chain)).await;
    let info = match outcome {
        Ok(Ok(info)) => info,
        Ok(Err(failure)) => {
            warn!(
                path = %path,
                subject = %subject,
                code = failure.code(),
                "Attribute certificate validation failed"
            );
            return AuthRejection::Validation(failure).into_response();
        }
        Err(e) => {
            error!(path = %path, error = %e, "Validator task did not complete");
            return AuthRejection::Internal.into_response();
        }
    };

    // Validated → Parsed
    let mut fqans = Vec::with_capacity(info.fqans.len());
    for raw in &info.fqans {
        match parse_fqan(raw) {
            Ok(parsed) => fqans.push(parsed),
            Err(e) => {
                warn!(path = %path, fqan = %raw, error = %e, "Malformed FQAN in attribute certificate");
                return AuthRejection::FqanParse(e).into_response();
            }
        }
    }

    // Parsed → PolicyChecked. The gate dominates validity: a perfectly
    // signed certificate for a VO outside the allow-list is still denied.
    if !state.policy.is_allowed(&info.vo_name) {
        warn!(path = %path, vo = %info.vo_name, user = %info.user, "VO not in allow-list");
        return AuthRejection::PolicyDenied {
            vo_name: info.vo_name,
        }
        .into_response();
    }

    // PolicyChecked → Authenticated
    debug!(path = %path, user = %info.user, vo = %info.vo_name, "Request authenticated");
    request.extensions_mut().insert(AuthenticatedIdentity {
        principal: info.user,
        vo_name: info.vo_name,
    });
    request.extensions_mut().insert(VomsAttributes(fqans));
    next.run(request).await
}

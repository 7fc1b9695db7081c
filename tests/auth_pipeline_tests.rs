//! End-to-end authentication pipeline tests
//!
//! Drives the full middleware + metadata router through `tower::oneshot`:
//! - chain extraction failures terminate the pipeline before validation
//! - the policy gate dominates a successfully validated certificate
//! - validator sessions are released exactly once per acquisition
//! - concurrent requests never see each other's identity
//! - the metadata handlers honor the stamped identity

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Extension, Json, Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::Response,
    routing::get,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use voms_metadata_server::server::create_router;
use voms_metadata_server::voms::{
    AttributeCertificateInfo, AttributeValidator, AuthenticatedIdentity, CertificateChain,
    ValidationFailure, VomsAuthState, VomsPolicy, voms_auth_middleware,
};

// ── helpers ──────────────────────────────────────────────────────────────

/// Self-signed PEM cert with the given CN, newline-folded the way an HTTP
/// frontend forwards it.
fn folded_cert_pem(cn: &str) -> String {
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    let key_pair = KeyPair::generate().expect("key generation failed");
    params
        .self_signed(&key_pair)
        .expect("rcgen cert generation failed")
        .pem()
        .trim()
        .replace('\n', " ")
}

fn ac_info(user: &str, vo: &str, fqans: &[&str]) -> AttributeCertificateInfo {
    AttributeCertificateInfo {
        user: user.to_string(),
        user_ca: "/DC=org/CN=Test CA".to_string(),
        server: "/DC=org/CN=voms.example.org".to_string(),
        server_ca: "/DC=org/CN=Test CA".to_string(),
        vo_name: vo.to_string(),
        uri: "voms.example.org:15001".to_string(),
        version: 1,
        serial: "42".to_string(),
        not_before: Utc::now() - Duration::hours(1),
        not_after: Utc::now() + Duration::hours(11),
        fqans: fqans.iter().map(ToString::to_string).collect(),
    }
}

/// Request with the three SSL_CLIENT_* headers a TLS frontend would set.
fn certified_request(method: &str, uri: &str, cn: &str, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("ssl-client-s-dn", format!("CN={cn}"))
        .header("ssl-client-cert", folded_cert_pem(cn))
        .header("ssl-client-cert-chain-0", folded_cert_pem("Test CA"));
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ── test doubles ─────────────────────────────────────────────────────────

/// Always returns the same payload; counts invocations.
struct StaticValidator {
    info: AttributeCertificateInfo,
    calls: AtomicUsize,
}

impl StaticValidator {
    fn new(info: AttributeCertificateInfo) -> Self {
        Self {
            info,
            calls: AtomicUsize::new(0),
        }
    }
}

impl AttributeValidator for StaticValidator {
    fn validate(
        &self,
        _chain: &CertificateChain,
    ) -> Result<AttributeCertificateInfo, ValidationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.clone())
    }
}

/// Fails every validation while tracking session acquire/release pairs.
#[derive(Default)]
struct LeakTrackingValidator {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

struct SessionGuard<'a>(&'a AtomicUsize);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl AttributeValidator for LeakTrackingValidator {
    fn validate(
        &self,
        _chain: &CertificateChain,
    ) -> Result<AttributeCertificateInfo, ValidationFailure> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let _session = SessionGuard(&self.released);
        Err(ValidationFailure::new(5))
    }
}

/// Derives the payload from the presented chain, like the real boundary.
struct SubjectEchoValidator;

impl AttributeValidator for SubjectEchoValidator {
    fn validate(
        &self,
        chain: &CertificateChain,
    ) -> Result<AttributeCertificateInfo, ValidationFailure> {
        Ok(ac_info(
            &chain.subject_dn,
            "myvo",
            &["/myvo/Role=NULL/Capability=NULL"],
        ))
    }
}

fn auth_state(
    validator: Arc<dyn AttributeValidator>,
    vos: &[&str],
) -> Arc<VomsAuthState> {
    Arc::new(VomsAuthState {
        policy: VomsPolicy::from_vo_names(vos.iter().copied()),
        validator,
    })
}

fn app(validator: Arc<dyn AttributeValidator>, vos: &[&str]) -> Router {
    create_router(
        auth_state(validator, vos),
        Arc::new(voms_metadata_server::metadata::MetadataStore::new()),
        1024 * 1024,
    )
}

/// Minimal downstream that echoes the stamped identity.
fn whoami_app(validator: Arc<dyn AttributeValidator>, vos: &[&str]) -> Router {
    async fn whoami(Extension(identity): Extension<AuthenticatedIdentity>) -> Json<Value> {
        Json(json!({
            "principal": identity.principal,
            "vo_name": identity.vo_name,
        }))
    }

    Router::new()
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn_with_state(
            auth_state(validator, vos),
            voms_auth_middleware,
        ))
}

// ── pipeline outcomes ────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_success_stamps_identity() {
    let validator = Arc::new(SubjectEchoValidator);
    let app = whoami_app(validator, &["myvo"]);

    let response = app
        .oneshot(certified_request("GET", "/whoami", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["principal"], "CN=Alice");
    assert_eq!(body["vo_name"], "myvo");
}

#[tokio::test]
async fn policy_gate_dominates_validity() {
    // Validation succeeds, but the VO is not in the allow-list.
    let validator = Arc::new(StaticValidator::new(ac_info(
        "/DC=org/CN=Alice",
        "othervo",
        &["/othervo/Role=NULL/Capability=NULL"],
    )));
    let app = whoami_app(Arc::clone(&validator) as Arc<dyn AttributeValidator>, &["myvo"]);

    let response = app
        .oneshot(certified_request("GET", "/whoami", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    // validation did run; the policy gate rejected afterwards
    assert_eq!(validator.calls.load(Ordering::SeqCst), 1);

    let body = body_json(response).await;
    assert_eq!(body["error"], "VO is not authorized");
}

#[tokio::test]
async fn missing_chain_rejects_without_invoking_validator() {
    let validator = Arc::new(StaticValidator::new(ac_info("CN=Alice", "myvo", &[])));
    let app = whoami_app(Arc::clone(&validator) as Arc<dyn AttributeValidator>, &["myvo"]);

    // certificate present, chain header absent
    let request = Request::builder()
        .method("GET")
        .uri("/whoami")
        .header("ssl-client-cert", folded_cert_pem("Alice"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_certificate_at_all_is_rejected() {
    let validator = Arc::new(StaticValidator::new(ac_info("CN=Alice", "myvo", &[])));
    let app = whoami_app(validator, &["myvo"]);

    let request = Request::builder()
        .method("GET")
        .uri("/whoami")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_failure_rejects_and_releases_every_session() {
    let validator = Arc::new(LeakTrackingValidator::default());
    let app = whoami_app(Arc::clone(&validator) as Arc<dyn AttributeValidator>, &["myvo"]);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(certified_request("GET", "/whoami", "Alice", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        // no native diagnostic code in the body
        let body = body_json(response).await;
        assert_eq!(body["error"], "attribute certificate rejected");
    }

    let acquired = validator.acquired.load(Ordering::SeqCst);
    let released = validator.released.load(Ordering::SeqCst);
    assert_eq!(acquired, 3);
    assert_eq!(acquired, released, "validator sessions leaked");
}

#[tokio::test]
async fn malformed_fqan_rejects_the_request() {
    let validator = Arc::new(StaticValidator::new(ac_info(
        "CN=Alice",
        "myvo",
        // Role segment lacks its `=` marker
        &["/myvo/Role/Capability=NULL"],
    )));
    let app = whoami_app(validator, &["myvo"]);

    let response = app
        .oneshot(certified_request("GET", "/whoami", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_identity() {
    let app = whoami_app(Arc::new(SubjectEchoValidator), &["myvo"]);

    let (alice, bob) = tokio::join!(
        app.clone()
            .oneshot(certified_request("GET", "/whoami", "Alice", None)),
        app.clone()
            .oneshot(certified_request("GET", "/whoami", "Bob", None)),
    );

    let alice = body_json(alice.unwrap()).await;
    let bob = body_json(bob.unwrap()).await;
    assert_eq!(alice["principal"], "CN=Alice");
    assert_eq!(bob["principal"], "CN=Bob");
}

// ── full router: metadata behind the middleware ──────────────────────────

#[tokio::test]
async fn health_is_reachable_without_a_certificate() {
    let app = app(Arc::new(SubjectEchoValidator), &["myvo"]);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn store_then_read_a_document() {
    let app = app(Arc::new(SubjectEchoValidator), &["myvo"]);

    let response = app
        .clone()
        .oneshot(certified_request(
            "POST",
            "/data",
            "Alice",
            Some(json!({"uuid": "vm-1", "image": "debian-12"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["uuid"], "vm-1");

    // full document, date stamped on insert
    let response = app
        .clone()
        .oneshot(certified_request("GET", "/data/vm-1", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["image"], "debian-12");
    assert!(body["date"].is_string());

    // single field rendered as plain text
    let response = app
        .clone()
        .oneshot(certified_request("GET", "/data/vm-1/image", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"debian-12");
}

#[tokio::test]
async fn duplicate_uuid_is_a_bad_request() {
    let app = app(Arc::new(SubjectEchoValidator), &["myvo"]);
    let doc = json!({"uuid": "vm-1"});

    let first = app
        .clone()
        .oneshot(certified_request("POST", "/data", "Alice", Some(doc.clone())))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(certified_request("POST", "/data", "Alice", Some(doc)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn document_without_uuid_is_a_bad_request() {
    let app = app(Arc::new(SubjectEchoValidator), &["myvo"]);

    let response = app
        .oneshot(certified_request(
            "POST",
            "/data",
            "Alice",
            Some(json!({"image": "debian-12"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn documents_are_scoped_to_the_storing_vo() {
    /// Maps each subject to its own VO, so two tenants coexist.
    struct VoByCnValidator;

    impl AttributeValidator for VoByCnValidator {
        fn validate(
            &self,
            chain: &CertificateChain,
        ) -> Result<AttributeCertificateInfo, ValidationFailure> {
            let vo = if chain.subject_dn.contains("Alice") {
                "myvo"
            } else {
                "othervo"
            };
            Ok(ac_info(&chain.subject_dn, vo, &[]))
        }
    }

    let app = app(Arc::new(VoByCnValidator), &["myvo", "othervo"]);

    let stored = app
        .clone()
        .oneshot(certified_request(
            "POST",
            "/data",
            "Alice",
            Some(json!({"uuid": "vm-1"})),
        ))
        .await
        .unwrap();
    assert_eq!(stored.status(), StatusCode::OK);

    // Bob authenticates fine, but under another VO the record is invisible
    let response = app
        .clone()
        .oneshot(certified_request("GET", "/data/vm-1", "Bob", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(certified_request("GET", "/data/vm-1", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_uuid_and_unknown_field_read_as_not_found() {
    let app = app(Arc::new(SubjectEchoValidator), &["myvo"]);

    let response = app
        .clone()
        .oneshot(certified_request("GET", "/data/nope", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(certified_request(
            "POST",
            "/data",
            "Alice",
            Some(json!({"uuid": "vm-2"})),
        ))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(certified_request("GET", "/data/vm-2/missing", "Alice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

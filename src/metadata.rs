//! VM metadata store and CRUD handlers.
//!
//! Thin glue behind the authentication layer: an in-memory document
//! collection keyed by uuid. Every handler reads the
//! [`AuthenticatedIdentity`] the middleware guarantees to have stamped
//! onto the request, and reads are scoped to the VO that stored the
//! document.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::voms::AuthenticatedIdentity;

/// One stored document with its ownership stamp.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Subject DN of the principal that stored it
    pub owner: String,
    /// VO the owner authenticated under
    pub vo_name: String,
    /// The document body as submitted, plus the insertion `date` stamp
    pub body: Value,
}

/// In-memory metadata collection, keyed by uuid.
#[derive(Debug, Default)]
pub struct MetadataStore {
    documents: DashMap<String, StoredDocument>,
}

impl MetadataStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document. Returns `false` if the uuid is already taken.
    pub fn insert(&self, uuid: String, document: StoredDocument) -> bool {
        match self.documents.entry(uuid) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(document);
                true
            }
        }
    }

    /// Fetch a document body, visible only within the VO that stored it.
    ///
    /// A record owned by another VO reads as absent, so callers cannot
    /// probe for uuids across VOs.
    #[must_use]
    pub fn get_for_vo(&self, uuid: &str, vo_name: &str) -> Option<Value> {
        self.documents
            .get(uuid)
            .filter(|doc| doc.vo_name == vo_name)
            .map(|doc| doc.body.clone())
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Metadata routes, to be layered behind the authentication middleware.
pub fn routes() -> Router<Arc<MetadataStore>> {
    Router::new()
        .route("/data", post(put_data))
        .route("/data/{uuid}", get(show_data))
        .route("/data/{uuid}/{field}", get(get_data_field))
}

/// POST /data - store a new document
async fn put_data(
    State(store): State<Arc<MetadataStore>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Json(body): Json<Value>,
) -> Response {
    let Some(uuid) = body.get("uuid").and_then(Value::as_str).map(str::to_owned) else {
        return bad_request("document must carry a uuid");
    };

    let mut body = body;
    body["date"] = json!(Utc::now().to_rfc3339());

    let document = StoredDocument {
        owner: identity.principal.clone(),
        vo_name: identity.vo_name.clone(),
        body,
    };

    if store.insert(uuid.clone(), document) {
        info!(uuid = %uuid, owner = %identity.principal, vo = %identity.vo_name, "Document stored");
        Json(json!({ "uuid": uuid })).into_response()
    } else {
        bad_request("uuid already exists")
    }
}

/// GET /data/{uuid} - fetch a full document
async fn show_data(
    State(store): State<Arc<MetadataStore>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Path(uuid): Path<String>,
) -> Response {
    match store.get_for_vo(&uuid, &identity.vo_name) {
        Some(body) => Json(body).into_response(),
        None => {
            debug!(uuid = %uuid, vo = %identity.vo_name, "Document not visible");
            not_found()
        }
    }
}

/// GET /data/{uuid}/{field} - fetch one field rendered as plain text
async fn get_data_field(
    State(store): State<Arc<MetadataStore>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Path((uuid, field)): Path<(String, String)>,
) -> Response {
    let Some(body) = store.get_for_vo(&uuid, &identity.vo_name) else {
        return not_found();
    };
    match body.get(&field) {
        Some(Value::String(s)) => s.clone().into_response(),
        Some(other) => other.to_string().into_response(),
        None => not_found(),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn doc(vo: &str, body: Value) -> StoredDocument {
        StoredDocument {
            owner: "CN=Alice".to_string(),
            vo_name: vo.to_string(),
            body,
        }
    }

    #[test]
    fn insert_then_get_within_same_vo() {
        let store = MetadataStore::new();
        assert!(store.insert("id-1".to_string(), doc("atlas", json!({"a": 1}))));
        assert_eq!(store.get_for_vo("id-1", "atlas"), Some(json!({"a": 1})));
    }

    #[test]
    fn duplicate_uuid_is_rejected() {
        let store = MetadataStore::new();
        assert!(store.insert("id-1".to_string(), doc("atlas", json!({}))));
        assert!(!store.insert("id-1".to_string(), doc("atlas", json!({}))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn other_vo_cannot_see_the_document() {
        let store = MetadataStore::new();
        store.insert("id-1".to_string(), doc("atlas", json!({"a": 1})));
        assert_eq!(store.get_for_vo("id-1", "cms"), None);
    }

    #[test]
    fn unknown_uuid_reads_as_absent() {
        let store = MetadataStore::new();
        assert_eq!(store.get_for_vo("nope", "atlas"), None);
        assert!(store.is_empty());
    }
}

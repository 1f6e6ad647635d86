//! HTTP interface to the registry.
//!
//! Callers identify themselves with the `x-issuer-id` header; the id is
//! looked up in the configured issuer directory and the resulting
//! [`Issuer`] capability value is handed to the engine. Unknown ids become
//! unauthorized identities, so the engine decides what they may do.
//!
//! Endpoints:
//! - `POST /certificates` issue
//! - `GET  /certificates/:fingerprint` record
//! - `GET  /certificates/:fingerprint/file` archived original
//! - `POST /certificates/:fingerprint/revoke` revoke
//! - `GET  /issuers/:issuer/certificates?limit=N` recent issuances
//! - `GET  /verify?hash=…` / `GET /verify?qr=…` verify by fingerprint or QR payload
//! - `POST /verify` verify an uploaded file (raw body)
//! - `GET  /stats` verification and registry statistics

use crate::blockchain::{LedgerMirror, MirrorStats};
use crate::crypto::Fingerprint;
use crate::error::RegistryError;
use crate::metrics::{RegistrySummary, VerificationSnapshot};
use crate::pki::{CertificateRecord, IssueRequest, Issuer, RegistryEngine};
use crate::verify::{Resolver, VerificationInput, VerificationOutcome, VerificationReport};
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

pub const ISSUER_HEADER: &str = "x-issuer-id";

const DEFAULT_RECENT: usize = 20;
const MAX_RECENT: usize = 100;

#[derive(Debug, Deserialize)]
struct IssueCertificateRequest {
    recipient: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    file_base64: String,
}

#[derive(Debug, Serialize)]
struct RevokeResponse {
    already_revoked: bool,
    record: CertificateRecord,
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    hash: Option<String>,
    qr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    verifications: VerificationSnapshot,
    registry: RegistrySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    ledger: Option<MirrorStats>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub enum ApiError {
    MissingIdentity,
    BadRequest(String),
    Registry(RegistryError),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingIdentity => (StatusCode::UNAUTHORIZED, "missing_identity"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Registry(err) => match err {
                RegistryError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "unauthorized"),
                RegistryError::AlreadyIssued(_) => (StatusCode::CONFLICT, "already_issued"),
                RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                RegistryError::InvalidField { .. } => (StatusCode::BAD_REQUEST, "invalid_field"),
                RegistryError::PayloadTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
                }
                RegistryError::IssuanceFailed(_) => (StatusCode::BAD_GATEWAY, "issuance_failed"),
                RegistryError::ArchiveUnavailable(_) => {
                    (StatusCode::BAD_GATEWAY, "archive_unavailable")
                }
                RegistryError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match &self {
            ApiError::MissingIdentity => format!("missing {ISSUER_HEADER} header"),
            ApiError::BadRequest(reason) => reason.clone(),
            ApiError::Registry(err) => err.to_string(),
        };
        if status.is_server_error() {
            warn!("request failed: {}", message);
        }
        (status, Json(ErrorBody { error: kind, message })).into_response()
    }
}

#[derive(Clone)]
pub struct ApiServer {
    engine: Arc<RegistryEngine>,
    resolver: Arc<Resolver>,
    issuers: Arc<HashMap<String, Issuer>>,
    ledger: Option<LedgerMirror>,
}

impl ApiServer {
    pub fn new(
        engine: Arc<RegistryEngine>,
        resolver: Arc<Resolver>,
        issuers: HashMap<String, Issuer>,
    ) -> Self {
        Self {
            engine,
            resolver,
            issuers: Arc::new(issuers),
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, mirror: LedgerMirror) -> Self {
        self.ledger = Some(mirror);
        self
    }

    pub fn router(&self) -> Router {
        // base64 inflates uploads by a third; leave room for the JSON around it
        let body_limit = self.engine.limits().max_file_bytes / 3 * 4 + 64 * 1024;

        Router::new()
            .route("/certificates", post(Self::issue_handler))
            .route("/certificates/:fingerprint", get(Self::certificate_handler))
            .route("/certificates/:fingerprint/file", get(Self::file_handler))
            .route("/certificates/:fingerprint/revoke", post(Self::revoke_handler))
            .route("/issuers/:issuer/certificates", get(Self::recent_handler))
            .route(
                "/verify",
                get(Self::verify_query_handler).post(Self::verify_file_handler),
            )
            .route("/stats", get(Self::stats_handler))
            .layer(DefaultBodyLimit::max(body_limit))
            .with_state(Arc::new(self.clone()))
    }

    pub async fn run(
        &self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("certificate registry listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    fn caller(&self, headers: &HeaderMap) -> Result<Issuer, ApiError> {
        let id = headers
            .get(ISSUER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ApiError::MissingIdentity)?;
        Ok(self
            .issuers
            .get(id)
            .cloned()
            .unwrap_or_else(|| Issuer::unauthorized(id)))
    }

    fn parse_fingerprint(text: &str) -> Result<Fingerprint, ApiError> {
        Fingerprint::parse(text).map_err(|e| ApiError::BadRequest(format!("fingerprint: {e}")))
    }

    fn verification_response(report: VerificationReport) -> Response {
        let status = if report.outcome == VerificationOutcome::Malformed {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        };
        (status, Json(report)).into_response()
    }

    async fn issue_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<IssueCertificateRequest>,
    ) -> Result<(StatusCode, Json<CertificateRecord>), ApiError> {
        let issuer = state.caller(&headers)?;
        let file = base64::decode(payload.file_base64.trim())
            .map_err(|e| ApiError::BadRequest(format!("file_base64: {e}")))?;

        let mut request = IssueRequest::new(payload.recipient, payload.title, file);
        request.description = payload.description;

        let record = state.engine.issue(&issuer, request).await?;
        Ok((StatusCode::CREATED, Json(record)))
    }

    async fn certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Path(fingerprint): Path<String>,
    ) -> Result<Json<CertificateRecord>, ApiError> {
        let fingerprint = Self::parse_fingerprint(&fingerprint)?;
        state
            .engine
            .certificate(&fingerprint)
            .await?
            .map(Json)
            .ok_or(ApiError::Registry(RegistryError::NotFound(fingerprint)))
    }

    async fn file_handler(
        State(state): State<Arc<ApiServer>>,
        Path(fingerprint): Path<String>,
    ) -> Result<Response, ApiError> {
        let fingerprint = Self::parse_fingerprint(&fingerprint)?;
        let bytes = state.engine.fetch_original(&fingerprint).await?;
        Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
    }

    async fn revoke_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Path(fingerprint): Path<String>,
    ) -> Result<Json<RevokeResponse>, ApiError> {
        let issuer = state.caller(&headers)?;
        let fingerprint = Self::parse_fingerprint(&fingerprint)?;
        let revocation = state.engine.revoke(&issuer, &fingerprint).await?;
        Ok(Json(RevokeResponse {
            already_revoked: revocation.was_already_revoked(),
            record: revocation.into_record(),
        }))
    }

    async fn recent_handler(
        State(state): State<Arc<ApiServer>>,
        Path(issuer): Path<String>,
        Query(query): Query<RecentQuery>,
    ) -> Result<Json<Vec<CertificateRecord>>, ApiError> {
        let limit = query.limit.unwrap_or(DEFAULT_RECENT).min(MAX_RECENT);
        Ok(Json(state.engine.recent_issuances(&issuer, limit).await?))
    }

    async fn verify_query_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<VerifyQuery>,
    ) -> Result<Response, ApiError> {
        let input = match (query.hash, query.qr) {
            (Some(hash), None) => VerificationInput::Fingerprint(hash),
            (None, Some(qr)) => VerificationInput::ExternalReference(qr),
            _ => {
                return Err(ApiError::BadRequest(
                    "supply exactly one of `hash` or `qr`".to_string(),
                ));
            }
        };
        let report = state.resolver.verify(input).await?;
        Ok(Self::verification_response(report))
    }

    async fn verify_file_handler(
        State(state): State<Arc<ApiServer>>,
        body: Bytes,
    ) -> Result<Response, ApiError> {
        let report = state
            .resolver
            .verify(VerificationInput::File(body.to_vec()))
            .await?;
        Ok(Self::verification_response(report))
    }

    async fn stats_handler(State(state): State<Arc<ApiServer>>) -> Result<Json<StatsResponse>, ApiError> {
        let records = state
            .engine
            .store()
            .records()
            .await
            .map_err(RegistryError::from)?;
        Ok(Json(StatsResponse {
            verifications: state.resolver.stats().snapshot(),
            registry: RegistrySummary::from_records(&records),
            ledger: state.ledger.as_ref().map(LedgerMirror::stats),
        }))
    }
}

//! REST endpoints: the federation endpoint and the operator API

use actix_web::http::header::{self, ContentType};
use actix_web::middleware::Logger;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::host::host_url;
use crate::api::responses::{status_for, ApiResponse, ListResponse};
use crate::config::Settings;
use crate::federation::{as_pull_link, FEDERATION_PATH};
use crate::models::{
    FederationError, FederationRegistration, FederationRequest, FederationToken, PullStatus,
    RepositoryModel, UserModel,
};
use crate::services::{FederationService, InboundRequest};
use crate::store::{FederationStore, RepositoryCatalog, UserCatalog};

use super::health::configure_health_routes;

/// Upper bound on proposal and status bodies
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Access log line; path only, federation tokens travel in the query string
pub const ACCESS_LOG_FORMAT: &str = r#"%a "%U" %s %b %T"#;

pub fn access_logger() -> Logger {
    Logger::new(ACCESS_LOG_FORMAT)
}

/// Shared application state
#[derive(Clone)]
pub struct ApiState {
    pub federation: Arc<FederationService>,
    pub store: Arc<FederationStore>,
    pub settings: Arc<RwLock<Settings>>,
    /// Config file re-read on reload; `None` uses the default lookup
    pub config_path: Option<PathBuf>,
}

impl ApiState {
    pub fn new(
        federation: Arc<FederationService>,
        store: Arc<FederationStore>,
        settings: Settings,
    ) -> Self {
        Self {
            federation,
            store,
            settings: Arc::new(RwLock::new(settings)),
            config_path: None,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    fn canonical_url(&self) -> Option<String> {
        self.settings.read().instance.canonical_url.clone()
    }
}

/// Configure all REST API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Health endpoints at root
    configure_health_routes(cfg);

    cfg.service(
        web::resource(FEDERATION_PATH)
            .app_data(web::PayloadConfig::new(MAX_PAYLOAD_BYTES))
            .route(web::get().to(federation_request))
            .route(web::post().to(federation_request)),
    );

    // API v1 routes
    cfg.service(web::scope("/api/v1").configure(configure_v1_routes));
}

/// Configure operator API v1 routes
fn configure_v1_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Registration routes
        .service(
            web::scope("/registrations")
                .route("", web::get().to(list_registrations))
                .route("/entry", web::get().to(get_registration))
                .route("/entry", web::delete().to(delete_registration)),
        )
        // Proposal routes
        .service(
            web::scope("/proposals")
                .route("", web::get().to(list_proposals))
                .route("/{id}", web::get().to(get_proposal))
                .route("/{id}", web::delete().to(reject_proposal))
                .route("/{id}/approve", web::post().to(approve_proposal))
                .route("/{id}/reject", web::post().to(reject_proposal)),
        )
        // Catalog routes
        .service(
            web::scope("/repositories")
                .route("", web::get().to(list_repositories))
                .route("", web::post().to(upsert_repository))
                .route("/{name:.*}", web::delete().to(delete_repository)),
        )
        .service(
            web::scope("/users")
                .route("", web::get().to(list_users))
                .route("", web::post().to(upsert_user))
                .route("/{username}", web::delete().to(delete_user)),
        )
        .route("/tokens", web::get().to(list_tokens))
        .route("/reload", web::post().to(reload_settings));
}

fn error_response(e: FederationError) -> actix_web::Error {
    let message = e.to_string();
    actix_web::error::InternalError::from_response(message, HttpResponse::from(e)).into()
}

// ============================================================================
// Federation endpoint
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FederationQuery {
    pub req: Option<String>,
    pub token: Option<String>,
    pub token_type: Option<String>,
    pub url: Option<String>,
}

impl FederationQuery {
    /// Never fails: bad escapes are kept as-is and the first of a repeated key wins
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match decode_component(key).as_str() {
                "req" => &mut parsed.req,
                "token" => &mut parsed.token,
                "tokenType" => &mut parsed.token_type,
                "url" => &mut parsed.url,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(decode_component(value));
            }
        }
        parsed
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

/// Federation peers only read the status code
fn federation_error_response(e: FederationError) -> HttpResponse {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("Federation request failed: {}", e);
    }
    HttpResponse::build(status).finish()
}

async fn federation_request(
    req: HttpRequest,
    state: web::Data<ApiState>,
    body: web::Bytes,
) -> HttpResponse {
    let query = FederationQuery::parse(req.query_string());
    let inbound = InboundRequest {
        req: query.req,
        token: query.token,
        token_type: query.token_type,
        url: query.url,
        remote_addr: req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        host_url: host_url(&req, state.canonical_url().as_deref()),
        body: body.to_vec(),
    };

    let response = match state.federation.handle(inbound).await {
        Ok(response) => response,
        Err(e) => return federation_error_response(e),
    };
    match response.body() {
        Ok(Some(json)) => HttpResponse::Ok().content_type(ContentType::json()).body(json),
        Ok(None) => HttpResponse::Ok().finish(),
        Err(e) => federation_error_response(e),
    }
}

// ============================================================================
// Operator authentication
// ============================================================================

/// Compares digests so the time taken does not depend on a matching prefix
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn authorize(req: &HttpRequest, state: &ApiState) -> Result<(), actix_web::Error> {
    let expected = state
        .settings
        .read()
        .federation
        .admin_token
        .clone()
        .filter(|token| !token.is_empty());

    let Some(expected) = expected else {
        let response = HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Operator API is disabled: no admin token configured"));
        return Err(actix_web::error::InternalError::from_response("operator API disabled", response).into());
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    if !presented.is_some_and(|presented| tokens_match(presented, &expected)) {
        warn!(
            "Rejected operator request to {} from {:?}",
            req.path(),
            req.peer_addr().map(|addr| addr.ip())
        );
        let response = HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid admin token"));
        return Err(actix_web::error::InternalError::from_response("invalid admin token", response).into());
    }
    Ok(())
}

// ============================================================================
// Registration Handlers
// ============================================================================

/// Registration with its derived display fields
#[derive(Debug, Serialize)]
pub struct RegistrationView {
    #[serde(flatten)]
    pub registration: FederationRegistration,
    pub overall_status: PullStatus,
    pub due: bool,
}

impl From<FederationRegistration> for RegistrationView {
    fn from(mut registration: FederationRegistration) -> Self {
        let overall_status = registration.lowest_status();
        let due = registration.is_due(Utc::now());
        registration.statuses = registration.sorted_statuses();
        Self {
            registration,
            overall_status,
            due,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistrationQuery {
    pub id: String,
}

async fn list_registrations(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let registrations = state.federation.status().list().map_err(error_response)?;
    let views: Vec<RegistrationView> = registrations.into_iter().map(RegistrationView::from).collect();
    Ok(HttpResponse::Ok().json(ListResponse::new(views)))
}

async fn get_registration(
    req: HttpRequest,
    state: web::Data<ApiState>,
    query: web::Query<RegistrationQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let registration = state.federation.status().get(&query.id).map_err(error_response)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(RegistrationView::from(registration))))
}

async fn delete_registration(
    req: HttpRequest,
    state: web::Data<ApiState>,
    query: web::Query<RegistrationQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    state.federation.status().remove(&query.id).map_err(error_response)?;
    Ok(HttpResponse::NoContent().finish())
}

// ============================================================================
// Proposal Handlers
// ============================================================================

async fn list_proposals(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let proposals = state.federation.proposals().list().map_err(error_response)?;
    Ok(HttpResponse::Ok().json(ListResponse::new(proposals)))
}

async fn get_proposal(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let proposal = state.federation.proposals().get(&path).map_err(error_response)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(proposal)))
}

async fn approve_proposal(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let registration = state
        .federation
        .approve_proposal(&path, state.store.as_ref())
        .map_err(error_response)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(RegistrationView::from(registration))))
}

async fn reject_proposal(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    state.federation.proposals().reject(&path).map_err(error_response)?;
    Ok(HttpResponse::NoContent().finish())
}

// ============================================================================
// Catalog Handlers
// ============================================================================

async fn list_repositories(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let repositories = state.store.list_repositories().map_err(error_response)?;
    Ok(HttpResponse::Ok().json(ListResponse::new(repositories)))
}

async fn upsert_repository(
    req: HttpRequest,
    state: web::Data<ApiState>,
    body: web::Json<RepositoryModel>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let repository = body.into_inner();
    if repository.name.trim().is_empty() {
        return Err(error_response(FederationError::malformed("repository name is required")));
    }
    state.store.put_repository(&repository).map_err(error_response)?;
    info!("Catalog repository {} updated", repository.name);
    Ok(HttpResponse::Ok().json(ApiResponse::success(repository)))
}

async fn delete_repository(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    if !state.store.remove_repository(&path).map_err(error_response)? {
        return Err(error_response(FederationError::not_found("repository", path.as_str())));
    }
    Ok(HttpResponse::NoContent().finish())
}

async fn list_users(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let users = state.store.list_users().map_err(error_response)?;
    Ok(HttpResponse::Ok().json(ListResponse::new(users)))
}

async fn upsert_user(
    req: HttpRequest,
    state: web::Data<ApiState>,
    body: web::Json<UserModel>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let user = body.into_inner();
    if user.username.trim().is_empty() {
        return Err(error_response(FederationError::malformed("username is required")));
    }
    state.store.put_user(&user).map_err(error_response)?;
    info!("Catalog user {} updated", user.username);
    Ok(HttpResponse::Ok().json(ApiResponse::success(user)))
}

async fn delete_user(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    if !state.store.remove_user(&path).map_err(error_response)? {
        return Err(error_response(FederationError::not_found("user", path.as_str())));
    }
    Ok(HttpResponse::NoContent().finish())
}

// ============================================================================
// Token and Configuration Handlers
// ============================================================================

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub tier: FederationToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    pub token: String,
    /// Link a puller uses with this token
    pub link: String,
}

async fn list_tokens(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let base = host_url(&req, state.canonical_url().as_deref());
    let config = state.federation.config();
    let tokens: Vec<IssuedToken> = config
        .tokens
        .issued()
        .into_iter()
        .map(|(token, grant)| IssuedToken {
            tier: grant.tier,
            set: grant.set.clone(),
            token: token.to_string(),
            link: as_pull_link(&base, token, Some(FederationRequest::PullRepositories)),
        })
        .collect();
    Ok(HttpResponse::Ok().json(ListResponse::new(tokens)))
}

async fn reload_settings(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> Result<HttpResponse, actix_web::Error> {
    authorize(&req, &state)?;

    let settings = match &state.config_path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| error_response(e.into()))?;

    state.federation.reload(&settings);
    *state.settings.write() = settings;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "reloaded": true }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    #[test]
    fn test_access_log_format_omits_query_string() {
        assert!(ACCESS_LOG_FORMAT.contains("%U"));
        // %r logs the request line and %q the query, both carry the token
        assert!(!ACCESS_LOG_FORMAT.contains("%r"));
        assert!(!ACCESS_LOG_FORMAT.contains("%q"));
        assert!(!ACCESS_LOG_FORMAT.contains("Referer"));
    }

    #[test]
    fn test_query_parse_decodes_known_keys() {
        let query = FederationQuery::parse(
            "req=proposal&token=abc&tokenType=REPOSITORIES&url=https%3A%2F%2Fpeer.example.com&extra=1",
        );
        assert_eq!(
            query,
            FederationQuery {
                req: Some("proposal".to_string()),
                token: Some("abc".to_string()),
                token_type: Some("REPOSITORIES".to_string()),
                url: Some("https://peer.example.com".to_string()),
            }
        );
    }

    #[test]
    fn test_query_parse_is_lenient() {
        let query = FederationQuery::parse("req=pull_users&req=pull_settings&token=%zz&url");
        assert_eq!(query.req.as_deref(), Some("pull_users"));
        assert_eq!(query.token.as_deref(), Some("%zz"));
        assert_eq!(query.url.as_deref(), Some(""));
        assert_eq!(FederationQuery::parse(""), FederationQuery::default());
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("secret-admin", "secret-admin"));
        assert!(!tokens_match("secret-admim", "secret-admin"));
        assert!(!tokens_match("secret", "secret-admin"));
        assert!(!tokens_match("", "secret-admin"));
    }

    #[test]
    fn test_federation_errors_carry_no_body() {
        let response = federation_error_response(FederationError::ProposalsDisabled);
        assert_eq!(response.status(), actix_web::http::StatusCode::METHOD_NOT_ALLOWED);
        assert!(matches!(
            response.body().size(),
            actix_web::body::BodySize::Sized(0)
        ));
    }
}

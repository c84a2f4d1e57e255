//! End-to-end tests of the federation endpoint and operator API

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use std::sync::Arc;
use tempfile::TempDir;

use repo_federation::api::{configure_routes, ApiState, AppState};
use repo_federation::config::Settings;
use repo_federation::federation::{derive_token, LogNotifier, ProposalNotice};
use repo_federation::models::{FederationToken, RepositoryModel, UserModel};
use repo_federation::services::{
    FederationConfig, FederationService, ProposalService, PullService, StatusService,
};
use repo_federation::store::{FederationStore, ProposalStore, RegistrationStore, RocksStore};

const UUID: &str = "integration-instance";
const ADMIN_TOKEN: &str = "operator-secret";

struct Fixture {
    _dir: TempDir,
    store: Arc<FederationStore>,
    app_state: AppState,
    api_state: ApiState,
}

fn fixture(settings: Settings) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FederationStore::new(RocksStore::open(dir.path()).unwrap()));
    let federation = Arc::new(FederationService::new(
        FederationConfig::from_settings(&settings),
        PullService::new(store.clone(), store.clone()),
        ProposalService::new(store.clone(), Arc::new(LogNotifier)),
        StatusService::new(store.clone()),
    ));
    Fixture {
        _dir: dir,
        app_state: AppState::new(settings.instance.name.clone()),
        api_state: ApiState::new(federation, store.clone(), settings),
        store,
    }
}

fn settings(allow_proposals: bool) -> Settings {
    let mut settings = Settings::default();
    settings.federation.uuid = UUID.to_string();
    settings.federation.allow_proposals = allow_proposals;
    settings.federation.admin_token = Some(ADMIN_TOKEN.to_string());
    settings
}

fn token(tier: FederationToken) -> String {
    derive_token(UUID, tier.token_seed())
}

macro_rules! app {
    ($fixture:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($fixture.app_state.clone()))
                .app_data(web::Data::new($fixture.api_state.clone()))
                .configure(configure_routes),
        )
        .await
    };
}

const SNAPSHOT: &str = r#"{"https://remote.example.com/git/a.git": {"name": "a.git"}}"#;

#[actix_web::test]
async fn test_proposal_refused_when_not_allowed() {
    let fixture = fixture(settings(false));
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/federation?req=proposal&token=abc&tokenType=all&url=https%3A%2F%2Fremote.example.com")
        .set_payload(SNAPSHOT)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(test::read_body(resp).await.is_empty());
    assert!(fixture.store.list_proposals().unwrap().is_empty());
}

#[actix_web::test]
async fn test_proposal_queued_when_allowed() {
    let fixture = fixture(settings(true));
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/federation?req=proposal&token=abc&tokenType=users_and_repositories&url=https%3A%2F%2Fremote.example.com")
        .set_payload(SNAPSHOT)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(body.is_empty());

    let proposals = fixture.store.list_proposals().unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].url, "https://remote.example.com");
    assert_eq!(proposals[0].token_type, FederationToken::UsersAndRepositories);
    assert_eq!(proposals[0].token, "abc");
}

#[actix_web::test]
async fn test_empty_proposal_is_bad_request() {
    let fixture = fixture(settings(true));
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/federation?req=proposal&token=abc&url=https%3A%2F%2Fremote.example.com")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(test::read_body(resp).await.is_empty());
}

#[actix_web::test]
async fn test_pull_users_needs_users_tier() {
    let fixture = fixture(settings(false));
    fixture.store.put_user(&UserModel::new("alice")).unwrap();
    fixture.store.put_user(&UserModel::new("bob").excluded()).unwrap();
    let app = app!(fixture);

    let uri = format!("/federation?req=pull_users&token={}", token(FederationToken::Repositories));
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let uri = format!(
        "/federation?req=pull_users&token={}",
        token(FederationToken::UsersAndRepositories)
    );
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let users: Vec<UserModel> = test::read_body_json(resp).await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");
}

#[actix_web::test]
async fn test_pull_repositories_uses_forwarded_host() {
    let fixture = fixture(settings(false));
    fixture.store.put_repository(&RepositoryModel::new("app.git")).unwrap();
    let app = app!(fixture);

    let uri = format!(
        "/federation?req=pull_repositories&token={}",
        token(FederationToken::Repositories)
    );
    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(("Host", "git.example.com"))
        .insert_header(("X-Forwarded-Proto", "https"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();
    assert!(text.contains('\n'), "payload is pretty printed");

    let map: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(map["https://git.example.com/git/app.git"]["name"], "app.git");
}

#[actix_web::test]
async fn test_disabled_federation_is_forbidden() {
    let mut disabled = settings(true);
    disabled.federation.uuid = String::new();
    let fixture = fixture(disabled);
    let app = app!(fixture);

    for uri in ["/federation?req=pull_repositories&token=x", "/federation?req=status"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{}", uri);
    }
}

#[actix_web::test]
async fn test_unknown_request_kind_is_bad_request() {
    let fixture = fixture(settings(false));
    let app = app!(fixture);

    for uri in ["/federation?req=pull_everything&token=x", "/federation"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[actix_web::test]
async fn test_irregular_query_strings_reach_the_handler() {
    let fixture = fixture(settings(false));
    fixture.store.put_user(&UserModel::new("alice")).unwrap();
    let app = app!(fixture);

    // Repeated keys: the first value is used
    let uri = format!(
        "/federation?req=pull_users&req=pull_settings&token={}&token=other",
        token(FederationToken::All)
    );
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let users: Vec<UserModel> = test::read_body_json(resp).await;
    assert_eq!(users.len(), 1);

    // A bad escape is a wrong token, not a rejected query
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/federation?req=pull_users&token=%zz")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/federation?req=%zz&token=x")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_status_report() {
    let fixture = fixture(settings(false));
    let app = app!(fixture);

    let empty = test::TestRequest::post()
        .uri("/federation?req=status&url=https%3A%2F%2Fpuller.example.com")
        .peer_addr("10.0.0.5:40000".parse().unwrap())
        .to_request();
    let resp = test::call_service(&app, empty).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(test::read_body(resp).await.is_empty());

    let report = r#"{"name": "mirror", "frequency": "2 hrs", "statuses": [{"name": "a.git", "status": "pulled"}]}"#;
    let req = test::TestRequest::post()
        .uri("/federation?req=status&url=https%3A%2F%2Fpuller.example.com")
        .peer_addr("10.0.0.5:40000".parse().unwrap())
        .set_payload(report)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let registration = fixture
        .store
        .get_registration("https://puller.example.com (10.0.0.5)")
        .unwrap()
        .unwrap();
    assert_eq!(registration.statuses.len(), 1);
    assert_eq!(
        registration.next_pull.unwrap() - registration.last_pull.unwrap(),
        chrono::Duration::minutes(120)
    );
}

#[actix_web::test]
async fn test_operator_api_requires_admin_token() {
    let mut closed = settings(true);
    closed.federation.admin_token = None;
    let fixture = fixture(closed);
    let app = app!(fixture);

    let req = test::TestRequest::get()
        .uri("/api/v1/proposals")
        .insert_header(("Authorization", "Bearer anything"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let fixture = self::fixture(settings(true));
    let app = app!(fixture);
    let req = test::TestRequest::get()
        .uri("/api/v1/proposals")
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_operator_approves_proposal() {
    let fixture = fixture(settings(true));
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/federation?req=proposal&token=their-token&tokenType=all&url=https%3A%2F%2Fremote.example.com%2F")
        .set_payload(SNAPSHOT)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let id = fixture.store.list_proposals().unwrap()[0].id.clone();
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/proposals/{}/approve", id))
        .insert_header(("Authorization", format!("Bearer {}", ADMIN_TOKEN)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert!(fixture.store.list_proposals().unwrap().is_empty());
    let registration = fixture
        .store
        .get_registration("https://remote.example.com")
        .unwrap()
        .unwrap();
    assert_eq!(registration.token, "their-token");
    assert_eq!(registration.frequency, "60 mins");
    assert_eq!(registration.folder, "federated");

    let req = test::TestRequest::get()
        .uri("/api/v1/registrations/entry?id=https%3A%2F%2Fremote.example.com")
        .insert_header(("Authorization", format!("Bearer {}", ADMIN_TOKEN)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["overall_status"], "pending");
    assert_eq!(body["data"]["due"], true);
}

#[actix_web::test]
async fn test_notice_review_url_is_served() {
    let fixture = fixture(settings(true));
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/federation?req=proposal&token=their-token&tokenType=all&url=https%3A%2F%2Fremote.example.com")
        .set_payload(SNAPSHOT)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let proposal = fixture.store.list_proposals().unwrap().remove(0);
    let notice = ProposalNotice::new(&proposal, "https://me.example.com");
    let path = notice.review_url.strip_prefix("https://me.example.com").unwrap();

    let req = test::TestRequest::get()
        .uri(path)
        .insert_header(("Authorization", format!("Bearer {}", ADMIN_TOKEN)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["id"], proposal.id.as_str());
}

#[actix_web::test]
async fn test_health_reports_federation_state() {
    let fixture = fixture(settings(true));
    let app = app!(fixture);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["federation"]["enabled"], true);
    assert_eq!(body["federation"]["allow_proposals"], true);
}

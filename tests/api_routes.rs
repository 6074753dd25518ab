use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use snowdash::auth::SessionUser;
use snowdash::config::AppConfig;
use snowdash::server::{build_router, AppState};
use snowdash::servicenow::{
    Credential, EmailMessage, NowApi, NowError, OAuthClient, OAuthToken, Record, TablePage,
    TableQuery,
};

#[derive(Clone, Debug, PartialEq)]
enum Call {
    List(String),
    Create(String, Value),
    Update(String, String, Value),
    Replace(String, String, Value),
    Delete(String, String),
    SendEmail(EmailMessage),
}

/// In-memory instance: canned rows per table, optional failures per table,
/// and a log of every call made.
#[derive(Default)]
struct FakeNow {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    failures: Mutex<HashMap<String, (u16, String)>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeNow {
    fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        let rows = rows.into_iter().filter_map(Record::from_value).collect();
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    fn failing(self, table: &str, status: u16, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(table.to_string(), (status, message.to_string()));
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, table: &str) -> Result<(), NowError> {
        match self.failures.lock().unwrap().get(table) {
            Some((status, message)) => Err(NowError::Status {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NowApi for FakeNow {
    async fn list_with_count(
        &self,
        _cred: &Credential,
        table: &str,
        _query: &TableQuery,
    ) -> Result<TablePage, NowError> {
        self.record(Call::List(table.to_string()));
        self.check(table)?;
        let records = self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default();
        Ok(TablePage {
            total_count: Some(records.len() as u64),
            records,
        })
    }

    async fn create(
        &self,
        _cred: &Credential,
        table: &str,
        body: &Value,
    ) -> Result<Record, NowError> {
        self.record(Call::Create(table.to_string(), body.clone()));
        self.check(table)?;
        let mut record = Record::from_value(body.clone()).unwrap_or_default();
        record.insert("sys_id", json!("created-1"));
        Ok(record)
    }

    async fn update(
        &self,
        _cred: &Credential,
        table: &str,
        sys_id: &str,
        body: &Value,
    ) -> Result<Record, NowError> {
        self.record(Call::Update(
            table.to_string(),
            sys_id.to_string(),
            body.clone(),
        ));
        self.check(table)?;
        let mut record = Record::from_value(body.clone()).unwrap_or_default();
        record.insert("sys_id", json!(sys_id));
        Ok(record)
    }

    async fn replace(
        &self,
        _cred: &Credential,
        table: &str,
        sys_id: &str,
        body: &Value,
    ) -> Result<Record, NowError> {
        self.record(Call::Replace(
            table.to_string(),
            sys_id.to_string(),
            body.clone(),
        ));
        self.check(table)?;
        let mut record = Record::from_value(body.clone()).unwrap_or_default();
        record.insert("sys_id", json!(sys_id));
        Ok(record)
    }

    async fn delete(&self, _cred: &Credential, table: &str, sys_id: &str) -> Result<(), NowError> {
        self.record(Call::Delete(table.to_string(), sys_id.to_string()));
        self.check(table)
    }

    async fn send_email(
        &self,
        _cred: &Credential,
        message: &EmailMessage,
    ) -> Result<Option<String>, NowError> {
        self.record(Call::SendEmail(message.clone()));
        self.check("sys_email")?;
        Ok(Some("email-1".into()))
    }

    async fn oauth_password_grant(
        &self,
        _client: &OAuthClient,
        _username: &str,
        _password: &str,
    ) -> Result<OAuthToken, NowError> {
        Err(NowError::Status {
            status: 401,
            message: "access_denied".into(),
        })
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.servicenow.instance_url = "https://acme.service-now.com/".into();
    config.session.secret = Some("integration-secret".into());
    config
}

struct Harness {
    fake: Arc<FakeNow>,
    state: AppState,
    router: Router,
}

impl Harness {
    fn new(fake: FakeNow) -> Self {
        let fake = Arc::new(fake);
        let api: Arc<dyn NowApi> = fake.clone();
        let state = AppState::from_config(&test_config(), api).unwrap();
        let router = build_router(state.clone());
        Self {
            fake,
            state,
            router,
        }
    }

    async fn token(&self) -> String {
        let user = SessionUser {
            sys_id: "user-1".into(),
            user_name: "jdoe".into(),
            ..Default::default()
        };
        let (_, token) = self
            .state
            .sessions
            .create(user, Credential::basic("jdoe", "pw"))
            .await
            .unwrap();
        token
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body, cookie)
    }

    async fn authed(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = self.token().await;
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, body, _) = self.send(request).await;
        (status, body)
    }
}

const RITM_SYS_ID: &str = "9d385017c611228701d22104cc95c371";

fn discovery_ritm() -> Value {
    json!({
        "sys_id": RITM_SYS_ID,
        "number": "RITM0010001",
        "short_description": "Onboard datacenter subnet",
        "requested_for": {"value": "user-9", "display_value": "Pat Lee"},
    })
}

#[tokio::test]
async fn protected_routes_reject_without_calling_upstream() {
    let harness = Harness::new(FakeNow::default());
    for uri in ["/api/ritms", "/api/servicenow/incident", "/api/servicenow/itom"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "Unauthorized");
    }
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn basic_sign_in_sets_session_cookie() {
    let fake = FakeNow::default().with_rows(
        "sys_user",
        vec![json!({"sys_id": "user-1", "user_name": "jdoe", "first_name": "Jo", "last_name": "Doe"})],
    );
    let harness = Harness::new(fake);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/signin")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"username": "jdoe", "password": "pw", "mode": "basic"}).to_string(),
        ))
        .unwrap();
    let (status, body, cookie) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authMode"], "basic");
    assert_eq!(body["user"]["userName"], "jdoe");
    let cookie = cookie.expect("session cookie");
    assert!(cookie.starts_with("snowdash_session="));
    assert!(cookie.contains("HttpOnly"));

    let token = body["token"].as_str().unwrap().to_string();
    let request = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, format!("snowdash_session={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["displayName"], "Jo Doe");
    assert_eq!(body["instanceUrl"], "https://acme.service-now.com");
}

#[tokio::test]
async fn sign_in_with_missing_password_is_rejected() {
    let harness = Harness::new(FakeNow::default());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/signin")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"username": "jdoe"}).to_string()))
        .unwrap();
    let (status, body, cookie) = harness.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password are required");
    assert!(cookie.is_none());
}

#[tokio::test]
async fn patch_forwards_only_workflow_fields() {
    let harness = Harness::new(FakeNow::default());
    let (status, body) = harness
        .authed(
            Method::PATCH,
            &format!("/api/ritms/{RITM_SYS_ID}"),
            Some(json!({"u_notes": "called twice", "state": "closed", "priority": "1"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sys_id"], RITM_SYS_ID);
    assert_eq!(body["u_notes"], "called twice");
    assert!(body.get("success").is_none());
    assert_eq!(
        harness.fake.calls(),
        vec![Call::Update(
            "sc_req_item".into(),
            RITM_SYS_ID.into(),
            json!({"u_notes": "called twice"}),
        )]
    );
}

#[tokio::test]
async fn patch_without_allowed_fields_is_rejected() {
    let harness = Harness::new(FakeNow::default());
    let (status, body) = harness
        .authed(
            Method::PATCH,
            &format!("/api/ritms/{RITM_SYS_ID}"),
            Some(json!({"state": "closed"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No valid fields to update");
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn patch_rejects_sys_id_with_query_operators() {
    let harness = Harness::new(FakeNow::default());
    let (status, body) = harness
        .authed(
            Method::PATCH,
            "/api/ritms/nope%5EORsys_idISNOTEMPTY",
            Some(json!({"u_notes": "hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid RITM sys_id");
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn send_email_rejects_sys_id_with_query_operators() {
    let harness = Harness::new(FakeNow::default().with_rows("sc_req_item", vec![discovery_ritm()]));
    for uri in [
        "/api/ritms/nope%5EORsys_idISNOTEMPTY/send-email",
        "/api/ritms/abc%3Ddef/send-email",
    ] {
        let (status, body) = harness
            .authed(Method::POST, uri, Some(json!({"emailNum": 1})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "Invalid RITM sys_id");
    }
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn send_email_rejects_unknown_email_numbers() {
    let harness = Harness::new(FakeNow::default().with_rows("sc_req_item", vec![discovery_ritm()]));
    for email_num in [json!(4), json!("1"), json!(0)] {
        let (status, body) = harness
            .authed(
                Method::POST,
                &format!("/api/ritms/{RITM_SYS_ID}/send-email"),
                Some(json!({"emailNum": email_num})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid emailNum. Must be 1, 2, or 3.");
    }
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn send_email_needs_a_requester_email() {
    let fake = FakeNow::default()
        .with_rows("sc_req_item", vec![discovery_ritm()])
        .with_rows("sys_user", vec![json!({"sys_id": "user-9", "name": "Pat Lee", "email": ""})]);
    let harness = Harness::new(fake);
    let (status, body) = harness
        .authed(
            Method::POST,
            &format!("/api/ritms/{RITM_SYS_ID}/send-email"),
            Some(json!({"emailNum": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Requester has no email. Add an email to the requested_for user in ServiceNow."
    );
    assert!(!harness
        .fake
        .calls()
        .iter()
        .any(|call| matches!(call, Call::SendEmail(_) | Call::Update(..))));
}

#[tokio::test]
async fn send_email_queues_then_records_status() {
    let fake = FakeNow::default()
        .with_rows("sc_req_item", vec![discovery_ritm()])
        .with_rows(
            "sys_user",
            vec![json!({"sys_id": "user-9", "name": "Pat Lee", "email": "pat@example.com"})],
        );
    let harness = Harness::new(fake);
    let (status, body) = harness
        .authed(
            Method::POST,
            &format!("/api/ritms/{RITM_SYS_ID}/send-email"),
            Some(json!({"emailNum": 2})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Email 2 sent to pat@example.com. Check ServiceNow: System > Email > Outbound."
    );

    let calls = harness.fake.calls();
    let send_at = calls
        .iter()
        .position(|call| matches!(call, Call::SendEmail(_)))
        .expect("email sent");
    let Call::SendEmail(message) = &calls[send_at] else {
        unreachable!()
    };
    assert_eq!(message.to, vec!["pat@example.com".to_string()]);
    assert_eq!(message.subject, "[Reminder] Discovery Onboarding - RITM0010001");
    assert!(message.text.starts_with("Dear Pat Lee,"));

    let Call::Update(table, sys_id, patch) = &calls[send_at + 1] else {
        panic!("expected status update after send, got {:?}", calls[send_at + 1]);
    };
    assert_eq!(table, "sc_req_item");
    assert_eq!(sys_id, RITM_SYS_ID);
    assert_eq!(patch["u_discovery_status"], "email_2_sent");
    assert!(patch["u_last_email_date"].as_str().is_some());
}

#[tokio::test]
async fn send_email_for_unknown_ritm_is_not_found() {
    let harness = Harness::new(FakeNow::default());
    let (status, body) = harness
        .authed(
            Method::POST,
            "/api/ritms/missing/send-email",
            Some(json!({"emailNum": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "RITM not found");
}

#[tokio::test]
async fn table_failures_surface_upstream_details() {
    let harness =
        Harness::new(FakeNow::default().failing("incident", 503, "Instance hibernating"));
    let (status, body) = harness
        .authed(Method::GET, "/api/servicenow/incident?limit=5", None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to fetch data");
    assert_eq!(body["details"], "Instance hibernating");
}

#[tokio::test]
async fn ritm_list_reports_total_and_instance() {
    let harness = Harness::new(FakeNow::default().with_rows("sc_req_item", vec![discovery_ritm()]));
    let (status, body) = harness.authed(Method::GET, "/api/ritms?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["limit"], 5);
    assert_eq!(body["offset"], 0);
    assert_eq!(body["instanceUrl"], "https://acme.service-now.com");
    assert_eq!(body["ritms"][0]["number"], "RITM0010001");
}

fn board_rows() -> Vec<Value> {
    vec![
        json!({
            "sys_id": RITM_SYS_ID,
            "number": {"value": "RITM0010001", "display_value": "RITM0010001"},
            "cat_item": {"value": "cat-1", "display_value": "Initiate Discovery"},
            "requested_for": {"value": "user-9", "display_value": "Pat Lee"},
            "state": {"value": "-5", "display_value": "Pending"},
            "u_discovery_status": {"value": "email_1_sent", "display_value": "Email 1 Sent"},
        }),
        json!({
            "sys_id": "7f2a0c55db1e2010a0c8f3b7d4961902",
            "number": {"value": "RITM0010002", "display_value": "RITM0010002"},
            "cat_item": {"value": "cat-2", "display_value": "Standard Laptop"},
            "requested_for": {"value": "user-3", "display_value": "Abel Tuter"},
            "state": {"value": "1", "display_value": "Open"},
        }),
    ]
}

#[tokio::test]
async fn board_filters_by_status_and_search() {
    let harness = Harness::new(FakeNow::default().with_rows("sc_req_item", board_rows()));

    let (status, body) = harness.authed(Method::GET, "/api/ritms/board", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    assert_eq!(body["stats"]["total"], 1);
    assert_eq!(body["demo"], false);

    let (status, body) = harness
        .authed(
            Method::GET,
            "/api/ritms/board?status=discovery&search=pat",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["number"], "RITM0010001");
    assert_eq!(rows[0]["discovery"], true);
    assert_eq!(
        rows[0]["link"],
        format!("https://acme.service-now.com/nav_to.do?uri=sc_req_item.do?sys_id={RITM_SYS_ID}")
    );

    let (status, body) = harness
        .authed(Method::GET, "/api/ritms/board?search=laptop", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"][0]["number"], "RITM0010002");
    assert_eq!(body["rows"].as_array().unwrap().len(), 1);

    let (status, body) = harness
        .authed(Method::GET, "/api/ritms/board?status=discovery&demo=true", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["demo"], true);
    assert_eq!(body["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn board_rejects_unknown_status_filter() {
    let harness = Harness::new(FakeNow::default().with_rows("sc_req_item", board_rows()));
    let (status, body) = harness
        .authed(Method::GET, "/api/ritms/board?status=bogus", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown status filter");
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn platform_dashboard_requires_a_name() {
    let harness = Harness::new(FakeNow::default());
    let (status, body) = harness
        .authed(
            Method::POST,
            "/api/servicenow/dashboards/create",
            Some(json!({"name": "   "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Dashboard name is required");
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn platform_dashboard_delete_passes_not_found_through() {
    let harness =
        Harness::new(FakeNow::default().failing("par_dashboard", 404, "No Record found"));
    let (status, body) = harness
        .authed(
            Method::DELETE,
            "/api/servicenow/dashboards/delete?sys_id=dash-1",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Dashboard not found");

    let (status, body) = harness
        .authed(Method::DELETE, "/api/servicenow/dashboards/delete", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Dashboard sys_id is required");
}

#[tokio::test]
async fn dashboard_preference_is_created_on_first_save() {
    let harness = Harness::new(FakeNow::default());
    let (status, body) = harness
        .authed(
            Method::POST,
            "/api/servicenow/dashboards",
            Some(json!({"dashboards": [], "snFavorites": ["par-1"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preferenceId"], "created-1");

    let created = harness
        .fake
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Create(table, body) => Some((table, body)),
            _ => None,
        })
        .expect("preference created");
    assert_eq!(created.0, "sys_user_preference");
    assert_eq!(created.1["name"], "custom_dashboard_config");
    assert_eq!(created.1["user"], "user-1");
}

#[tokio::test]
async fn dashboard_preference_is_replaced_and_merged_when_present() {
    let stored = json!({
        "revision": 3,
        "savedAt": "2024-03-01T09:00:00Z",
        "activeDashboardId": "default-ritms",
        "dashboards": [{
            "id": "dashboard-ops",
            "name": "Ops",
            "type": "incidents",
            "createdAt": "2024-02-01T09:00:00Z",
            "updatedAt": "2024-02-01T09:00:00Z",
        }],
        "snFavorites": ["par-9"],
    });
    let fake = FakeNow::default().with_rows(
        "sys_user_preference",
        vec![json!({
            "sys_id": "pref-1",
            "name": "custom_dashboard_config",
            "value": stored.to_string(),
        })],
    );
    let harness = Harness::new(fake);
    let (status, body) = harness
        .authed(
            Method::POST,
            "/api/servicenow/dashboards",
            Some(json!({"dashboards": [], "snFavorites": ["par-1"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preferenceId"], "pref-1");
    assert_eq!(body["data"]["revision"], 4);
    let ids: Vec<&str> = body["data"]["dashboards"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|dashboard| dashboard["id"].as_str())
        .collect();
    assert!(ids.contains(&"dashboard-ops"), "{ids:?}");
    assert!(ids.contains(&"default-ritms"), "{ids:?}");

    let calls = harness.fake.calls();
    assert!(!calls.iter().any(|call| matches!(call, Call::Create(..))));
    let (table, sys_id, written) = calls
        .into_iter()
        .find_map(|call| match call {
            Call::Replace(table, sys_id, body) => Some((table, sys_id, body)),
            _ => None,
        })
        .expect("preference replaced");
    assert_eq!(table, "sys_user_preference");
    assert_eq!(sys_id, "pref-1");
    let written: Value = serde_json::from_str(written["value"].as_str().unwrap()).unwrap();
    assert_eq!(written["revision"], 4);
    assert_eq!(written["snFavorites"], json!(["par-9"]));
}

#[tokio::test]
async fn itom_summary_tolerates_upstream_failures() {
    let fake = FakeNow::default()
        .failing("discovery_status", 403, "ACL")
        .failing("em_event", 500, "boom")
        .with_rows("cmdb_ci", vec![json!({"sys_id": "ci-1"}), json!({"sys_id": "ci-2"})]);
    let harness = Harness::new(fake);
    let (status, body) = harness.authed(Method::GET, "/api/servicenow/itom", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"]["discoveryRuns"], 0);
    assert_eq!(body["metrics"]["openEvents"], 0);
    assert_eq!(body["instanceUrl"], "https://acme.service-now.com");
}

#[tokio::test]
async fn widget_chart_groups_rows() {
    let fake = FakeNow::default().with_rows(
        "incident",
        vec![
            json!({"sys_id": "1", "state": {"value": "1", "display_value": "New"}}),
            json!({"sys_id": "2", "state": {"value": "1", "display_value": "New"}}),
            json!({"sys_id": "3", "state": {"value": "7", "display_value": "Closed"}}),
        ],
    );
    let harness = Harness::new(fake);
    let (status, body) = harness
        .authed(
            Method::GET,
            "/api/widgets/data?source=incident&kind=chart&groupBy=state",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "chart");
    assert_eq!(body["groups"][0], json!({"name": "New", "value": 2}));
    assert_eq!(body["groups"][1], json!({"name": "Closed", "value": 1}));
}

#[tokio::test]
async fn widget_sources_list_every_table() {
    let harness = Harness::new(FakeNow::default());
    let (status, body) = harness.authed(Method::GET, "/api/widgets/sources", None).await;
    assert_eq!(status, StatusCode::OK);
    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 6);
    assert!(sources
        .iter()
        .any(|source| source["table"] == "incident" && source["groupFields"].is_array()));
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn health_endpoints_follow_readiness() {
    let harness = Harness::new(FakeNow::default());
    let ready = || Request::builder().uri("/readyz").body(Body::empty()).unwrap();

    let (status, _, _) = harness.send(ready()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    harness.state.mark_live();
    harness.state.mark_ready();
    let (status, body, _) = harness.send(ready()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body, _) = harness.send(health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instance_url"], "https://acme.service-now.com");
    assert_eq!(body["oauth_enabled"], false);

    harness.state.mark_unready("shutting down");
    let (status, body, _) = harness.send(ready()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
    assert_eq!(body["last_error"], "shutting down");
}

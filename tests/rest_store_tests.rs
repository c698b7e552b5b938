//! REST store and audit sink tests against a mock backend

use serde_json::json;
use std::sync::Arc;
use tenant_gate::access_control::{AccessScope, PermissionRequirement, PermissionUpdate, Role};
use tenant_gate::audit::{AuditRecord, AuditSink, RestAuditSink, kinds};
use tenant_gate::config::StoreConfig;
use tenant_gate::error::{AuditError, StoreError};
use tenant_gate::store::{AuthorizationStore, RestAuthorizationStore, RestClient};
use tenant_gate::util::ApiKey;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "service-key";

fn client(mock_server: &MockServer, max_retries: u32) -> Arc<RestClient> {
    let config = StoreConfig {
        url: mock_server.uri(),
        api_key: None,
        timeout_secs: 5,
        max_retries,
    };
    Arc::new(RestClient::new(&config, ApiKey::new(KEY)).unwrap())
}

fn store(mock_server: &MockServer) -> RestAuthorizationStore {
    RestAuthorizationStore::new(client(mock_server, 0))
}

fn teacher_scope() -> AccessScope {
    AccessScope {
        subject_id: "u-1".to_string(),
        tenant_id: Some("school-a".to_string()),
        role: Some(Role::Teacher),
    }
}

#[tokio::test]
async fn test_check_permission_calls_rpc() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_permission"))
        .and(header("apikey", KEY))
        .and(header("Authorization", "Bearer service-key"))
        .and(body_json(json!({
            "p_user_id": "u-1",
            "p_tenant_id": "school-a",
            "p_role": "teacher",
            "p_resource": "concepts",
            "p_action": "update",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let granted = store(&mock_server)
        .check_permission(&teacher_scope(), &PermissionRequirement::new("concepts", "update"))
        .await
        .unwrap();

    assert!(granted);
}

#[tokio::test]
async fn test_granted_permissions_intersects_requested() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_user_permissions"))
        .and(body_json(json!({ "p_user_id": "u-1", "p_tenant_id": "school-a" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "resource_key": "concepts", "actions": ["read", "update"] },
            { "resource_key": "reports", "actions": ["read"] },
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let requested = [
        PermissionRequirement::new("concepts", "update"),
        PermissionRequirement::new("concepts", "delete"),
        PermissionRequirement::new("reports", "read"),
    ];
    let granted = store(&mock_server)
        .granted_permissions(&teacher_scope(), &requested)
        .await
        .unwrap();

    assert_eq!(granted.len(), 2);
    assert!(granted.contains(&requested[0]));
    assert!(!granted.contains(&requested[1]));
    assert!(granted.contains(&requested[2]));
}

#[tokio::test]
async fn test_can_access_path_matches_pattern_then_checks_grant() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pages"))
        .and(query_param("select", "id,path"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "p-1", "path": "/domains" },
            { "id": "p-2", "path": "/domains/:slug" },
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/page_permissions"))
        .and(query_param("page_id", "eq.p-2"))
        .and(query_param("role", "eq.teacher"))
        .and(query_param("is_active", "is.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 9 }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let granted = store(&mock_server)
        .can_access_path(&teacher_scope(), "/domains/fractions")
        .await
        .unwrap();

    assert!(granted);
}

#[tokio::test]
async fn test_unregistered_path_is_denied_without_grant_lookup() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "path": "/domains" }])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/page_permissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let granted = store(&mock_server)
        .can_access_path(&teacher_scope(), "/billing")
        .await
        .unwrap();

    assert!(!granted);
}

#[tokio::test]
async fn test_accessible_paths_for_role() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/page_permissions"))
        .and(query_param("role", "eq.teacher"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "page": { "path": "/teacher/classes" } },
            { "page": { "path": "/domains/:slug" } },
        ])))
        .mount(&mock_server)
        .await;

    let paths = store(&mock_server)
        .accessible_paths(&teacher_scope())
        .await
        .unwrap();

    assert_eq!(paths, vec!["/teacher/classes", "/domains/:slug"]);
}

#[tokio::test]
async fn test_apply_updates_sends_one_batch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/apply_permission_updates"))
        .and(body_json(json!({
            "p_tenant_id": "school-a",
            "p_updates": [
                { "user_id": "u-1", "resource": "concepts", "action": "update", "granted": true },
                { "user_id": "u-2", "resource": "concepts", "action": "update", "granted": false },
            ],
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    store(&mock_server)
        .apply_updates(
            Some("school-a"),
            &[
                PermissionUpdate::grant("u-1", "concepts", "update"),
                PermissionUpdate::revoke("u-2", "concepts", "update"),
            ],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_key_is_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_permission"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
        .mount(&mock_server)
        .await;

    let result = store(&mock_server)
        .check_permission(&teacher_scope(), &PermissionRequirement::new("concepts", "read"))
        .await;

    assert!(matches!(result, Err(StoreError::Unauthorized)));
}

#[tokio::test]
async fn test_server_error_is_not_retried_without_budget() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = store(&mock_server).all_paths().await;

    assert!(matches!(result, Err(StoreError::Api { status: 503, .. })));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pages"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "path": "/domains" }])),
        )
        .mount(&mock_server)
        .await;

    let store = RestAuthorizationStore::new(client(&mock_server, 2));
    let paths = store.all_paths().await.unwrap();

    assert_eq!(paths, vec!["/domains"]);
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_permission"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let result = store(&mock_server)
        .check_permission(&teacher_scope(), &PermissionRequirement::new("concepts", "read"))
        .await;

    assert!(matches!(result, Err(StoreError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_audit_sink_inserts_row() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/audit_logs"))
        .and(header("Prefer", "return=minimal"))
        .and(body_partial_json(json!({
            "tenant_id": "school-a",
            "user_id": "u-1",
            "action": "access_denied",
            "resource_type": "route",
            "resource_id": "/admin/users",
            "changes": { "result": false },
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = RestAuditSink::new(client(&mock_server, 0), "audit_logs");
    let record = AuditRecord::new("u-1", kinds::ACCESS_DENIED, "route", false)
        .with_tenant(Some("school-a".to_string()))
        .with_target(Some("/admin/users".to_string()));

    sink.append(&record).await.unwrap();
}

#[tokio::test]
async fn test_audit_sink_surfaces_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/audit_logs"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let sink = RestAuditSink::new(client(&mock_server, 0), "audit_logs");
    let record = AuditRecord::new("u-1", kinds::ACCESS, "route", true);

    let result = sink.append(&record).await;
    assert!(matches!(
        result,
        Err(AuditError::Sink(StoreError::Unauthorized))
    ));
}

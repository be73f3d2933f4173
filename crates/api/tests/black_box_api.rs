use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use rolegate_api::app::services::AppServices;
use rolegate_api::config::FeatureFlags;
use rolegate_api::middleware::PRINCIPAL_HEADER;
use rolegate_auth::{RoleDraft, SystemRole};
use rolegate_core::{AccountId, PrincipalId};

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(features: FeatureFlags) -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let services = Arc::new(AppServices::in_memory(features));
        let app = rolegate_api::app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    async fn member(&self, account_id: AccountId, role: SystemRole) -> PrincipalId {
        let principal_id = PrincipalId::new();
        self.services
            .roles
            .register_principal(account_id, principal_id, role)
            .await
            .unwrap();
        principal_id
    }

    fn roles_url(&self, account_id: AccountId) -> String {
        format!("{}/accounts/{}/custom_roles", self.base_url, account_id)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn support_lead() -> Value {
    json!({
        "custom_role": {
            "name": "Support Lead",
            "description": "Handles escalations",
            "permissions": ["conversation_unassigned_manage", "report_manage"]
        }
    })
}

#[tokio::test]
async fn health_is_open() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn identity_required() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();

    let res = reqwest::Client::new()
        .get(srv.roles_url(account))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn feature_gate_runs_before_admin_gate() {
    let account = AccountId::new();
    let srv = TestServer::spawn(FeatureFlags::default().disable_for(account)).await;
    let agent = srv.member(account, SystemRole::Agent).await;

    let res = reqwest::Client::new()
        .get(srv.roles_url(account))
        .header(PRINCIPAL_HEADER, agent.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "FEATURE_NOT_ENABLED");
    assert_eq!(body["details"]["required_plan"], "Business or Enterprise plan required");
}

#[tokio::test]
async fn agents_and_outsiders_are_denied() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let agent = srv.member(account, SystemRole::Agent).await;
    let outsider = srv.member(AccountId::new(), SystemRole::Administrator).await;

    let client = reqwest::Client::new();
    for principal in [agent, outsider] {
        let res = client
            .get(srv.roles_url(account))
            .header(PRINCIPAL_HEADER, principal.to_string())
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "ACCESS_DENIED");
        assert_eq!(body["message"], "Only administrators can manage custom roles.");
    }
}

#[tokio::test]
async fn custom_role_lifecycle_create_update_delete() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.roles_url(account))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .json(&support_lead())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "Support Lead");
    assert_eq!(created["conversation_permission_level"], "manage_unassigned");
    assert_eq!(created["assigned_users_count"], 0);
    assert_eq!(created["deletable"], true);
    assert_eq!(
        created["permissions_by_category"]["management"],
        json!(["report_manage"])
    );

    let res = client
        .patch(format!("{}/{}", srv.roles_url(account), id))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .json(&json!({ "custom_role": { "description": "Escalations and reporting" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["description"], "Escalations and reporting");
    assert_eq!(updated["name"], "Support Lead");

    let res = client
        .get(srv.roles_url(account))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let res = client
        .delete(format!("{}/{}", srv.roles_url(account), id))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(format!("{}/{}", srv.roles_url(account), id))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "CUSTOM_ROLE_NOT_FOUND");
}

#[tokio::test]
async fn validation_errors_are_reported_per_field() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;

    let res = reqwest::Client::new()
        .post(srv.roles_url(account))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .json(&json!({
            "custom_role": {
                "name": "X",
                "description": "",
                "permissions": ["conversation_manage", "conversation_participating_manage", "billing"]
            }
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "VALIDATION_FAILED");
    assert!(body["field_errors"]["name"].is_array());
    assert!(body["field_errors"]["description"].is_array());
    assert!(body["field_errors"]["permissions"].as_array().unwrap().len() >= 2);
    assert!(body["details"].as_array().unwrap().iter().any(|m| m
        .as_str()
        .unwrap()
        .starts_with("Name ")));
}

#[tokio::test]
async fn duplicate_name_in_account_rejected() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;
    let client = reqwest::Client::new();

    for expected in [StatusCode::CREATED, StatusCode::UNPROCESSABLE_ENTITY] {
        let res = client
            .post(srv.roles_url(account))
            .header(PRINCIPAL_HEADER, admin.to_string())
            .json(&support_lead())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), expected);
    }
}

#[tokio::test]
async fn bound_role_cannot_be_deleted() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;

    let role = srv
        .services
        .roles
        .create_role(
            account,
            &RoleDraft::new("Support Lead", "Handles escalations", ["report_manage"]),
        )
        .await
        .unwrap();

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let agent = srv.member(account, SystemRole::Agent).await;
        let res = client
            .put(format!(
                "{}/accounts/{}/principals/{}/role",
                srv.base_url, account, agent
            ))
            .header(PRINCIPAL_HEADER, admin.to_string())
            .json(&json!({ "role": { "kind": "custom", "value": role.id } }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client
        .delete(format!("{}/{}", srv.roles_url(account), role.id))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ROLE_HAS_ASSIGNED_USERS");
    assert_eq!(body["details"]["assigned_users_count"], 3);

    let res = client
        .get(format!("{}/{}", srv.roles_url(account), role.id))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn foreign_role_looks_missing() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let other = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;

    let foreign = srv
        .services
        .roles
        .create_role(other, &RoleDraft::new("Theirs", "other account", ["contact_manage"]))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    for url in [
        format!("{}/{}", srv.roles_url(account), foreign.id),
        format!("{}/not-a-uuid", srv.roles_url(account)),
    ] {
        let res = client
            .get(url)
            .header(PRINCIPAL_HEADER, admin.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn permission_catalog_is_served() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;

    let res = reqwest::Client::new()
        .get(format!("{}/permissions", srv.roles_url(account)))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["permissions"].as_array().unwrap().len(), 6);
    assert_eq!(body["categories"]["conversation"][0], "conversation_manage");
}

#[tokio::test]
async fn principal_authorization_reflects_custom_role() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;
    let agent = srv.member(account, SystemRole::Agent).await;

    let role = srv
        .services
        .roles
        .create_role(
            account,
            &RoleDraft::new(
                "Support Lead",
                "Handles escalations",
                ["conversation_unassigned_manage", "report_manage"],
            ),
        )
        .await
        .unwrap();
    srv.services
        .roles
        .assign_custom_role(account, agent, role.id)
        .await
        .unwrap();

    let res = reqwest::Client::new()
        .get(format!(
            "{}/accounts/{}/principals/{}/authorization?permission=contact_manage",
            srv.base_url, account, agent
        ))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["effective_role"], "custom_role");
    assert_eq!(body["role_display_name"], "Support Lead");
    assert_eq!(body["conversation_permission_level"], "manage_unassigned");
    assert_eq!(body["can_manage_reports"], true);
    assert_eq!(body["can_manage_contacts"], false);
    assert_eq!(body["explanation"]["granted"], false);
}

#[tokio::test]
async fn promotion_clears_custom_role() {
    let srv = TestServer::spawn(FeatureFlags::default()).await;
    let account = AccountId::new();
    let admin = srv.member(account, SystemRole::Administrator).await;
    let agent = srv.member(account, SystemRole::Agent).await;

    let role = srv
        .services
        .roles
        .create_role(account, &RoleDraft::new("Reports", "reporting", ["report_manage"]))
        .await
        .unwrap();
    srv.services
        .roles
        .assign_custom_role(account, agent, role.id)
        .await
        .unwrap();

    let res = reqwest::Client::new()
        .put(format!(
            "{}/accounts/{}/principals/{}/role",
            srv.base_url, account, agent
        ))
        .header(PRINCIPAL_HEADER, admin.to_string())
        .json(&json!({ "role": { "kind": "system", "value": "administrator" } }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["binding"], json!({ "kind": "system", "value": "administrator" }));

    let summary = srv.services.roles.role_summary(account, role.id).await.unwrap();
    assert_eq!(summary.assigned_users_count, 0);
}

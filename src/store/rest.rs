//! REST authorization store
//!
//! Talks to a PostgREST-compatible backend (tables `pages`,
//! `page_permissions`, and the RPC functions `check_permission`,
//! `get_user_permissions` and `apply_permission_updates`).

use crate::access_control::{AccessScope, PermissionRequirement, PermissionUpdate, RouteTable};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::AuthorizationStore;
use crate::util::ApiKey;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// HTTP plumbing shared by the store and the audit sink
pub struct RestClient {
    http: Client,
    base_url: String,
    key: ApiKey,
    max_retries: u32,
}

impl RestClient {
    pub fn new(config: &StoreConfig, key: ApiKey) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("tenant-gate/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Request)?;

        Ok(Self {
            http,
            base_url: config.rest_url(),
            key,
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", self.key.expose())
            .header("Authorization", self.key.bearer())
    }

    /// Execute a request, retrying transient failures with exponential backoff
    async fn execute(&self, request: RequestBuilder) -> StoreResult<Response> {
        let mut attempt = 0;

        loop {
            let req = request
                .try_clone()
                .ok_or_else(|| StoreError::InvalidResponse("Cannot clone request".to_string()))?;

            let result = match req.send().await {
                Ok(response) => self.handle_response(response).await,
                Err(e) => Err(StoreError::Request(e)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "Store request failed, retrying");
                    let delay = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn handle_response(&self, response: Response) -> StoreResult<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(StoreError::RateLimited { retry_after: 60 });
        }

        Err(StoreError::from_response(status.as_u16(), &body))
    }

    /// Select rows from a table
    #[instrument(skip(self, query), fields(table = %table))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let request = self.authenticate(self.http.get(self.url(table)).query(query));
        let response = self.execute(request).await?;
        response.json().await.map_err(|e| {
            StoreError::InvalidResponse(format!("Failed to parse rows from {}: {}", table, e))
        })
    }

    /// Call a database function and decode its result
    #[instrument(skip(self, body), fields(function = %function))]
    pub async fn rpc<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        function: &str,
        body: &B,
    ) -> StoreResult<T> {
        let url = self.url(&format!("rpc/{}", function));
        let request = self.authenticate(self.http.post(url).json(body));
        let response = self.execute(request).await?;
        response.json().await.map_err(|e| {
            StoreError::InvalidResponse(format!("Failed to parse {} result: {}", function, e))
        })
    }

    /// Call a database function that returns nothing
    #[instrument(skip(self, body), fields(function = %function))]
    pub async fn rpc_no_content<B: Serialize + ?Sized>(
        &self,
        function: &str,
        body: &B,
    ) -> StoreResult<()> {
        let url = self.url(&format!("rpc/{}", function));
        let request = self.authenticate(self.http.post(url).json(body));
        self.execute(request).await?;
        Ok(())
    }

    /// Insert one row without asking for it back
    #[instrument(skip(self, row), fields(table = %table))]
    pub async fn insert<B: Serialize + ?Sized>(&self, table: &str, row: &B) -> StoreResult<()> {
        let request = self.authenticate(
            self.http
                .post(self.url(table))
                .header("Prefer", "return=minimal")
                .json(row),
        );
        self.execute(request).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct PageRow {
    id: serde_json::Value,
    path: String,
}

#[derive(Deserialize)]
struct PathRow {
    path: String,
}

#[derive(Deserialize)]
struct PagePermissionRow {
    page: PathRow,
}

#[derive(Deserialize)]
struct UserPermissionRow {
    resource_key: String,
    #[serde(default)]
    actions: Vec<String>,
}

/// Authorization store backed by the hosted REST interface
pub struct RestAuthorizationStore {
    client: Arc<RestClient>,
}

impl RestAuthorizationStore {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }

    fn role_param(scope: &AccessScope) -> StoreResult<String> {
        scope
            .role
            .map(|role| format!("eq.{}", role))
            .ok_or_else(|| StoreError::InvalidResponse("scope has no role".to_string()))
    }
}

#[async_trait]
impl AuthorizationStore for RestAuthorizationStore {
    async fn check_permission(
        &self,
        scope: &AccessScope,
        requirement: &PermissionRequirement,
    ) -> StoreResult<bool> {
        debug!(subject = %scope.subject_id, requirement = %requirement, "Querying permission");
        self.client
            .rpc(
                "check_permission",
                &json!({
                    "p_user_id": scope.subject_id,
                    "p_tenant_id": scope.tenant_id,
                    "p_role": scope.role.map(|r| r.as_str()),
                    "p_resource": requirement.resource,
                    "p_action": requirement.action,
                }),
            )
            .await
    }

    async fn granted_permissions(
        &self,
        scope: &AccessScope,
        requirements: &[PermissionRequirement],
    ) -> StoreResult<HashSet<PermissionRequirement>> {
        let rows: Vec<UserPermissionRow> = self
            .client
            .rpc(
                "get_user_permissions",
                &json!({
                    "p_user_id": scope.subject_id,
                    "p_tenant_id": scope.tenant_id,
                }),
            )
            .await?;

        let held: HashSet<PermissionRequirement> = rows
            .into_iter()
            .flat_map(|row| {
                let resource = row.resource_key;
                row.actions
                    .into_iter()
                    .map(move |action| PermissionRequirement::new(resource.clone(), action))
            })
            .collect();

        Ok(requirements
            .iter()
            .filter(|req| held.contains(*req))
            .cloned()
            .collect())
    }

    async fn can_access_path(&self, scope: &AccessScope, path: &str) -> StoreResult<bool> {
        let role = Self::role_param(scope)?;
        let pages: Vec<PageRow> = self
            .client
            .select("pages", &[("select", "id,path".to_string())])
            .await?;

        let table = RouteTable::new(&pages.iter().map(|p| p.path.as_str()).collect::<Vec<_>>())
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let Some(matched) = table.find_match(path) else {
            debug!(path, "No page registered for path");
            return Ok(false);
        };
        let Some(page) = pages.iter().find(|p| p.path == matched) else {
            return Ok(false);
        };
        let page_id = match &page.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let grants: Vec<serde_json::Value> = self
            .client
            .select(
                "page_permissions",
                &[
                    ("select", "id".to_string()),
                    ("page_id", format!("eq.{}", page_id)),
                    ("role", role),
                    ("is_active", "is.true".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        Ok(!grants.is_empty())
    }

    async fn accessible_paths(&self, scope: &AccessScope) -> StoreResult<Vec<String>> {
        let role = Self::role_param(scope)?;
        let rows: Vec<PagePermissionRow> = self
            .client
            .select(
                "page_permissions",
                &[
                    ("select", "page:pages!inner(path)".to_string()),
                    ("role", role),
                    ("is_active", "is.true".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.page.path).collect())
    }

    async fn all_paths(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<PathRow> = self
            .client
            .select("pages", &[("select", "path".to_string())])
            .await?;
        Ok(rows.into_iter().map(|row| row.path).collect())
    }

    async fn apply_updates(
        &self,
        tenant_id: Option<&str>,
        updates: &[PermissionUpdate],
    ) -> StoreResult<()> {
        let rows: Vec<_> = updates
            .iter()
            .map(|u| {
                json!({
                    "user_id": u.subject_id,
                    "resource": u.resource,
                    "action": u.action,
                    "granted": u.granted,
                })
            })
            .collect();

        self.client
            .rpc_no_content(
                "apply_permission_updates",
                &json!({ "p_tenant_id": tenant_id, "p_updates": rows }),
            )
            .await
    }
}

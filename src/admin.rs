//! Admin-only endpoints: system statistics and user management.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{MarchiveClient, segment};
use crate::error::Error;
use crate::transport::{ApiRequest, Transport};
use crate::types::{BookHash, MessageResponse, Pagination, Role, UserId, lenient};

/// A user row in the admin listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct UserWithStats {
    #[serde(deserialize_with = "lenient::id")]
    pub id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default, deserialize_with = "lenient::option")]
    pub last_active: Option<String>,
    #[serde(default)]
    pub request_credits: Option<i64>,
    #[serde(default)]
    pub daily_download_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<UserWithStats>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct RecentDownload {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::id")]
    pub user_id: UserId,
    #[serde(alias = "md5")]
    pub book_hash: BookHash,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct TopBook {
    pub hash: BookHash,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub download_count: u64,
}

/// Dashboard counters from `GET /admin/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct SystemStats {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub total_books: u64,
    #[serde(default)]
    pub total_downloads: u64,
    #[serde(default, rename = "active_users_24h")]
    pub active_users: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recent_downloads: Vec<RecentDownload>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub top_books: Vec<TopBook>,
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// Body of `POST /admin/users`.
#[derive(Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl NewUser {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            role: None,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
}

// Manual Debug: keep the password out of logs.
impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Partial update for `PUT /admin/users/:id`; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct CreditsGranted {
    #[serde(deserialize_with = "lenient::id")]
    pub user_id: UserId,
    pub request_credits: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct DailyLimitSet {
    #[serde(deserialize_with = "lenient::id")]
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    pub daily_download_limit: i64,
    #[serde(default)]
    pub message: String,
}

/// Numeric ids go over the wire as JSON numbers in admin request bodies.
fn id_value(id: &UserId) -> Value {
    id.0.parse::<i64>()
        .map_or_else(|_| Value::String(id.0.clone()), Value::from)
}

pub struct AdminApi<'a, T> {
    client: &'a MarchiveClient<T>,
}

impl<'a, T: Transport> AdminApi<'a, T> {
    pub(crate) fn new(client: &'a MarchiveClient<T>) -> Self {
        Self { client }
    }

    // ── Dashboard ──────────────────────────────────────────────────

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn stats(&self) -> Result<SystemStats, Error> {
        let stats: SystemStats = self.client.send_json(ApiRequest::get("/admin/stats")).await?;
        self.client.stores().set_system_stats(stats.clone());
        Ok(stats)
    }

    // ── Users ──────────────────────────────────────────────────────

    /// Page through all users; the page replaces the users store.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn users(&self, limit: u32, offset: u32) -> Result<UserList, Error> {
        let request = ApiRequest::get("/admin/users")
            .query("limit", limit)
            .query("offset", offset);
        let list: UserList = self.client.send_json(request).await?;
        self.client.stores().set_users(list.clone());
        Ok(list)
    }

    /// Filter users by name fragment and/or role.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn search_users(
        &self,
        query: Option<&str>,
        role: Option<&Role>,
        limit: u32,
        offset: u32,
    ) -> Result<UserList, Error> {
        #[derive(Serialize)]
        struct Body<'q> {
            #[serde(skip_serializing_if = "Option::is_none")]
            query: Option<&'q str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            role: Option<&'q Role>,
            limit: u32,
            offset: u32,
        }

        let request = ApiRequest::post("/admin/users/search").json(&Body {
            query,
            role,
            limit,
            offset,
        })?;
        let list: UserList = self.client.send_json(request).await?;
        self.client.stores().set_users(list.clone());
        Ok(list)
    }

    /// # Errors
    ///
    /// [`Error::Validation`] if the username is taken, or any other [`Error`]
    /// from the request.
    pub async fn create_user(&self, user: &NewUser) -> Result<UserWithStats, Error> {
        let created: UserWithStats = self
            .client
            .send_json(ApiRequest::post("/admin/users").json(user)?)
            .await?;
        tracing::info!(user_id = %created.id, username = %created.username, "User created");
        Ok(created)
    }

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn user(&self, id: &UserId) -> Result<UserWithStats, Error> {
        self.client
            .send_json(ApiRequest::get(format!("/admin/users/{}", segment(&id.0))))
            .await
    }

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn update_user(&self, id: &UserId, update: &UserUpdate) -> Result<UserWithStats, Error> {
        let request = ApiRequest::put(format!("/admin/users/{}", segment(&id.0))).json(update)?;
        self.client.send_json(request).await
    }

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn delete_user(&self, id: &UserId) -> Result<MessageResponse, Error> {
        let response: MessageResponse = self
            .client
            .send_json(ApiRequest::delete(format!("/admin/users/{}", segment(&id.0))))
            .await?;
        tracing::info!(user_id = %id, "User deleted");
        Ok(response)
    }

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn set_user_password(&self, id: &UserId, new_password: &str) -> Result<MessageResponse, Error> {
        let request = ApiRequest::post(format!("/admin/users/{}/password", segment(&id.0)))
            .json(&serde_json::json!({ "new_password": new_password }))?;
        self.client.send_json(request).await
    }

    /// Sign the user out everywhere.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn invalidate_sessions(&self, id: &UserId) -> Result<MessageResponse, Error> {
        let request =
            ApiRequest::post(format!("/admin/users/{}/invalidate-sessions", segment(&id.0))).empty_object();
        self.client.send_json(request).await
    }

    // ── Credits & limits ───────────────────────────────────────────

    /// Add request credits to a user. `amount` must be positive.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a non-positive amount or unknown user, or any
    /// other [`Error`] from the request.
    pub async fn grant_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: &str,
    ) -> Result<CreditsGranted, Error> {
        let request = ApiRequest::post("/admin/users/credits/grant").json(&serde_json::json!({
            "user_id": id_value(user_id),
            "amount": amount,
            "reason": reason,
        }))?;
        self.client.send_json(request).await
    }

    /// # Errors
    ///
    /// [`Error::Validation`] for a negative limit or unknown user, or any
    /// other [`Error`] from the request.
    pub async fn set_daily_limit(&self, user_id: &UserId, limit: i64) -> Result<DailyLimitSet, Error> {
        let request = ApiRequest::post("/admin/users/daily-limit").json(&serde_json::json!({
            "user_id": id_value(user_id),
            "daily_limit": limit,
        }))?;
        self.client.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::guard::tests::ScriptedTransport;

    fn client(transport: ScriptedTransport) -> MarchiveClient<ScriptedTransport> {
        MarchiveClient::with_transport(
            ClientConfig::new("http://localhost".parse().unwrap()),
            transport.with_role("admin"),
        )
    }

    #[tokio::test]
    async fn stats_fill_store() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/admin/stats",
            200,
            r#"{"total_users":12,"total_books":340,"total_downloads":981,"active_users_24h":4,
                "recent_downloads":null,
                "top_books":[{"hash":"a1","title":"Dune","authors":"Frank Herbert","download_count":40}]}"#,
        );
        let client = client(transport);

        let stats = client.admin().stats().await.unwrap();

        assert_eq!(stats.active_users, 4);
        assert!(stats.recent_downloads.is_empty());
        assert_eq!(stats.top_books[0].download_count, 40);
        assert_eq!(client.stores().system_stats().borrow().as_ref(), Some(&stats));
    }

    #[tokio::test]
    async fn search_replaces_users_page() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/admin/users/search",
            200,
            r#"{"users":[{"id":5,"username":"bob","role":"user","created_at":"1700000000","download_count":2}],
                "pagination":{"limit":20,"offset":0,"total":1,"has_next":false}}"#,
        );
        let client = client(transport);

        let list = client
            .admin()
            .search_users(Some("bo"), None, 20, 0)
            .await
            .unwrap();

        assert_eq!(list.users[0].id, UserId::from("5"));
        assert_eq!(client.stores().users().borrow().as_ref(), Some(&list));
    }

    #[tokio::test]
    async fn non_admin_gets_forbidden() {
        let transport = ScriptedTransport::new();
        transport.respond("/admin/users/5", 403, r#"{"error":"admin access required"}"#);
        let client = client(transport);

        let err = client.admin().user(&UserId::from("5")).await.unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert_eq!(client.guard().transport().refreshes(), 0);
    }

    #[tokio::test]
    async fn grant_credits_decodes_balance() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/admin/users/credits/grant",
            200,
            r#"{"user_id":5,"request_credits":8,"message":"Successfully granted 5 request credits to bob"}"#,
        );
        let client = client(transport);

        let granted = client
            .admin()
            .grant_credits(&UserId::from("5"), 5, "Bonus")
            .await
            .unwrap();

        assert_eq!(granted.user_id, UserId::from("5"));
        assert_eq!(granted.request_credits, 8);
    }

    #[test]
    fn numeric_ids_serialize_as_numbers() {
        assert_eq!(id_value(&UserId::from("1843920011")), serde_json::json!(1843920011));
        assert_eq!(id_value(&UserId::from("abc")), serde_json::json!("abc"));
    }

    #[test]
    fn user_update_sends_only_set_fields() {
        let update = UserUpdate {
            role: Some(Role::admin()),
            ..UserUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            serde_json::json!({"role":"admin"})
        );
    }
}

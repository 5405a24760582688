use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Server-assigned user identifier (numeric, serialized as a string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Download job identifier (numeric, serialized as a string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct JobId(pub String);

/// MD5 content hash identifying a book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct BookHash(pub String);

/// Redemption code identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct CodeId(pub String);

/// Single-use invite token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct InviteToken(pub String);

impl From<&str> for BookHash {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for InviteToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for CodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Account role as reported by the server.
///
/// Only `"admin"` carries meaning on the client; any other value is an
/// ordinary user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const USER: &'static str = "user";

    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    #[must_use]
    pub fn admin() -> Self {
        Self(Self::ADMIN.into())
    }

    #[must_use]
    pub fn user() -> Self {
        Self(Self::USER.into())
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Profile of the signed-in user, as returned by `GET /auth/me`.
///
/// Snapshots are replaced wholesale on every fetch, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
    #[serde(default)]
    pub request_credits: i64,
    #[serde(default)]
    pub invite_tokens: i64,
    #[serde(default)]
    pub daily_download_limit: Option<i64>,
}

impl User {
    /// Create a user snapshot with the required fields.
    #[must_use]
    pub fn new(id: impl Into<UserId>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
            created_at: String::new(),
            request_credits: 0,
            invite_tokens: 0,
            daily_download_limit: None,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Offset pagination block shared by every list endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub total: u64,
    pub has_next: bool,
}

/// Generic `{ "message": ... }` acknowledgement.
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct MessageResponse {
    #[serde(default, alias = "success")]
    pub message: Option<String>,
}

/// Deserializers for fields the server sends either as strings or numbers
/// (ids and unix timestamps).
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(crate) fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    pub(crate) fn id<'de, D: Deserializer<'de>, T: From<String>>(d: D) -> Result<T, D::Error> {
        string(d).map(T::from)
    }

    pub(crate) fn option<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_timestamps_are_accepted() {
        let user: User = serde_json::from_str(
            r#"{"id":"1","username":"bob","role":"user","created_at":1700000000}"#,
        )
        .unwrap();
        assert_eq!(user.created_at, "1700000000");
    }

    #[test]
    fn user_deserializes_with_string_ids() {
        let json = r#"{
            "id": "1843920011",
            "username": "alice",
            "role": "admin",
            "created_at": "1700000000",
            "request_credits": 5,
            "invite_tokens": 2
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, UserId::from("1843920011"));
        assert!(user.is_admin());
        assert_eq!(user.invite_tokens, 2);
        assert_eq!(user.daily_download_limit, None);
    }

    #[test]
    fn missing_counters_default_to_zero() {
        let user: User =
            serde_json::from_str(r#"{"id":"1","username":"bob","role":"user"}"#).unwrap();
        assert_eq!(user.request_credits, 0);
        assert!(!user.is_admin());
    }

    #[test]
    fn only_admin_role_is_admin() {
        assert!(Role::admin().is_admin());
        assert!(!Role::user().is_admin());
        assert!(!Role::new("Admin").is_admin());
        assert!(!Role::new("moderator").is_admin());
    }

    #[test]
    fn newtypes_display_inner_value() {
        assert_eq!(BookHash::from("abc123").to_string(), "abc123");
        assert_eq!(JobId::from("42").to_string(), "42");
    }

    #[test]
    fn message_response_accepts_success_key() {
        let msg: MessageResponse =
            serde_json::from_str(r#"{"success":"Ghost mode updated successfully"}"#).unwrap();
        assert_eq!(
            msg.message.as_deref(),
            Some("Ghost mode updated successfully")
        );
    }
}

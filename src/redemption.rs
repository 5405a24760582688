use serde::{Deserialize, Serialize};

use crate::client::MarchiveClient;
use crate::error::Error;
use crate::transport::{ApiRequest, Transport};
use crate::types::{CodeId, Pagination, lenient};

#[cfg(feature = "admin")]
use crate::client::segment;
#[cfg(feature = "admin")]
use crate::types::MessageResponse;

/// An admin-issued code granting invite tokens and request credits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct RedemptionCode {
    #[serde(deserialize_with = "lenient::id")]
    pub id: CodeId,
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub invite_tokens: i64,
    #[serde(default)]
    pub request_credits: i64,
    #[serde(default)]
    pub max_uses: i64,
    #[serde(default)]
    pub current_uses: i64,
    #[serde(default, deserialize_with = "lenient::option")]
    pub expires_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub revoked_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_by: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
}

impl RedemptionCode {
    #[must_use]
    pub fn uses_left(&self) -> i64 {
        (self.max_uses - self.current_uses).max(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct RedemptionCodeList {
    #[serde(default)]
    pub codes: Vec<RedemptionCode>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Body of `POST /admin/redemption-codes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct NewRedemptionCode {
    pub code: String,
    pub description: String,
    pub invite_tokens: i64,
    pub request_credits: i64,
    pub max_uses: i64,
    /// Unix timestamp (seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl NewRedemptionCode {
    /// Single-use code granting nothing yet; set the grants with the builders.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: String::new(),
            invite_tokens: 0,
            request_credits: 0,
            max_uses: 1,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_invite_tokens(mut self, tokens: i64) -> Self {
        self.invite_tokens = tokens;
        self
    }

    #[must_use]
    pub fn with_request_credits(mut self, credits: i64) -> Self {
        self.request_credits = credits;
        self
    }

    #[must_use]
    pub fn with_max_uses(mut self, max_uses: i64) -> Self {
        self.max_uses = max_uses;
        self
    }

    #[must_use]
    pub fn expires_at(mut self, unix_seconds: i64) -> Self {
        self.expires_at = Some(unix_seconds);
        self
    }
}

/// What a redeemed code granted, and the new balances.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct RedeemResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub invite_tokens_granted: Option<i64>,
    #[serde(default)]
    pub request_credits_granted: Option<i64>,
    #[serde(default)]
    pub new_invite_tokens_total: Option<i64>,
    #[serde(default)]
    pub new_request_credits_total: Option<i64>,
}

pub struct RedemptionCodesApi<'a, T> {
    client: &'a MarchiveClient<T>,
}

impl<'a, T: Transport> RedemptionCodesApi<'a, T> {
    pub(crate) fn new(client: &'a MarchiveClient<T>) -> Self {
        Self { client }
    }

    /// Redeem a code for the signed-in user.
    ///
    /// The session snapshot is not patched; call
    /// [`AuthApi::fetch_user`](crate::AuthApi::fetch_user) to see the new
    /// balances.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an unknown, expired or used-up code, or any
    /// other [`Error`] from the request.
    pub async fn redeem(&self, code: &str) -> Result<RedeemResponse, Error> {
        let request =
            ApiRequest::post("/redemption-codes/redeem").json(&serde_json::json!({ "code": code }))?;
        let response: RedeemResponse = self.client.send_json(request).await?;
        tracing::info!(
            invite_tokens = response.invite_tokens_granted,
            request_credits = response.request_credits_granted,
            "Redemption code redeemed"
        );
        Ok(response)
    }
}

#[cfg(feature = "admin")]
impl<T: Transport> RedemptionCodesApi<'_, T> {
    /// # Errors
    ///
    /// [`Error::Validation`] if the code already exists, or any other
    /// [`Error`] from the request.
    pub async fn create(&self, code: &NewRedemptionCode) -> Result<RedemptionCode, Error> {
        let request = ApiRequest::post("/admin/redemption-codes").json(code)?;
        self.client.send_json(request).await
    }

    /// Page through codes; the page replaces the redemption-codes store.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn list(&self, limit: u32, offset: u32) -> Result<RedemptionCodeList, Error> {
        let request = ApiRequest::get("/admin/redemption-codes")
            .query("limit", limit)
            .query("offset", offset);
        let list: RedemptionCodeList = self.client.send_json(request).await?;
        self.client.stores().set_redemption_codes(list.clone());
        Ok(list)
    }

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn revoke(&self, id: &CodeId) -> Result<MessageResponse, Error> {
        let request =
            ApiRequest::post(format!("/admin/redemption-codes/{}/revoke", segment(&id.0))).empty_object();
        self.client.send_json(request).await
    }

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn delete(&self, id: &CodeId) -> Result<MessageResponse, Error> {
        let request = ApiRequest::delete(format!("/admin/redemption-codes/{}", segment(&id.0)));
        self.client.send_json(request).await
    }
}

use serde::Deserialize;

use crate::client::{MarchiveClient, segment};
use crate::error::Error;
use crate::transport::{ApiRequest, Transport};
use crate::types::{InviteToken, MessageResponse, UserId, lenient};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct Invite {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    pub token: InviteToken,
    #[serde(deserialize_with = "lenient::id")]
    pub inviter_id: UserId,
    #[serde(default)]
    pub invitee_username: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub invitee_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub used_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub revoked_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
}

impl Invite {
    /// Neither used nor revoked.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.used_at.is_none() && self.revoked_at.is_none()
    }
}

/// A freshly generated invite.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct InviteResponse {
    pub token: InviteToken,
    #[serde(default)]
    pub invite_url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: String,
}

/// The user's invites plus their remaining invite-token balance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct InviteList {
    #[serde(default)]
    pub invites: Vec<Invite>,
    #[serde(default)]
    pub tokens: i64,
}

pub struct InvitesApi<'a, T> {
    client: &'a MarchiveClient<T>,
}

impl<'a, T: Transport> InvitesApi<'a, T> {
    pub(crate) fn new(client: &'a MarchiveClient<T>) -> Self {
        Self { client }
    }

    /// Spend one invite token on a new invite, then reload the list.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from creating the invite. A failed reload is only logged.
    pub async fn create(&self) -> Result<InviteResponse, Error> {
        let invite: InviteResponse = self
            .client
            .send_json(ApiRequest::post("/invites").empty_object())
            .await?;
        tracing::info!(token = %invite.token, "Invite created");
        self.reload().await;
        Ok(invite)
    }

    /// Fetch the user's invites and token balance into the invites store.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn list(&self) -> Result<InviteList, Error> {
        let list: InviteList = self.client.send_json(ApiRequest::get("/invites")).await?;
        self.client.stores().set_invites(list.clone());
        Ok(list)
    }

    /// Revoke an unused invite and get its token back, then reload the list.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the revoke call. A failed reload is only logged.
    pub async fn revoke(&self, token: &InviteToken) -> Result<MessageResponse, Error> {
        let request = ApiRequest::post(format!("/invites/{}/revoke", segment(&token.0))).empty_object();
        let message = self.client.send_json(request).await?;
        self.reload().await;
        Ok(message)
    }

    /// Create an account from an invite without signing in.
    ///
    /// See [`AuthApi::register`](crate::AuthApi::register) to also load the
    /// new session.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an invalid token or taken username, or any
    /// other [`Error`] from the request.
    pub async fn use_invite(
        &self,
        token: &InviteToken,
        username: &str,
        password: &str,
    ) -> Result<MessageResponse, Error> {
        let request = ApiRequest::post("/invites/use")
            .json(&serde_json::json!({
                "token": token,
                "username": username,
                "password": password,
            }))?
            .unguarded();
        self.client.send_json(request).await
    }

    async fn reload(&self) {
        if let Err(e) = self.list().await {
            tracing::warn!(error = %e, "Failed to reload invites");
        }
    }
}

use serde::Serialize;
use tokio::sync::watch;

use crate::client::MarchiveClient;
use crate::error::Error;
use crate::guard::ME_PATH;
use crate::session::SessionEvent;
use crate::transport::{ApiRequest, Transport};
use crate::types::{InviteToken, MessageResponse, User};

/// Username and password for `POST /auth/login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Manual Debug: keep the password out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Account flows that change who is signed in.
pub struct AuthApi<'a, T> {
    client: &'a MarchiveClient<T>,
}

impl<'a, T: Transport> AuthApi<'a, T> {
    pub(crate) fn new(client: &'a MarchiveClient<T>) -> Self {
        Self { client }
    }

    /// Sign in, then load the identity of the new session.
    ///
    /// Wrong credentials are a [`Error::Validation`] with status 401; they do
    /// not go through the session refresh.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the login call or the identity fetch.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, Error> {
        let request = ApiRequest::post("/auth/login")
            .json(credentials)?
            .unguarded();
        self.client
            .guard()
            .request(request)
            .await?
            .error_for_status()?;

        self.client.guard().reset_failures();
        let user = self.fetch_user().await?;
        tracing::info!(username = %user.username, "Signed in");
        self.client.session().emit(SessionEvent::SignedIn);
        Ok(user)
    }

    /// End this session. Local state is cleared even if the server call fails.
    pub async fn logout(&self) {
        self.sign_out("/auth/logout").await;
    }

    /// End every session of this account.
    pub async fn logout_all(&self) {
        self.sign_out("/auth/logout-all").await;
    }

    async fn sign_out(&self, path: &str) {
        let request = ApiRequest::post(path).empty_object().unguarded();
        let result = match self.client.guard().request(request).await {
            Ok(response) => response.error_for_status().map(drop),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, path, "Server logout failed, clearing local session anyway");
        }
        self.clear_auth();
        self.client.session().emit(SessionEvent::SignedOut);
    }

    /// Load the current identity and replace the session snapshot.
    ///
    /// # Errors
    ///
    /// Any [`Error`]; the session is cleared before it is returned.
    pub async fn fetch_user(&self) -> Result<User, Error> {
        let session = self.client.session();
        match self.client.send_json::<User>(ApiRequest::get(ME_PATH)).await {
            Ok(user) => {
                session.set_user(user.clone());
                Ok(user)
            }
            Err(e) => {
                session.clear();
                Err(e)
            }
        }
    }

    /// Drop the local session without contacting the server.
    pub fn clear_auth(&self) {
        self.client.session().clear();
    }

    /// Create an account from an invite, then load its identity.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the invite call or the identity fetch.
    pub async fn register(
        &self,
        token: &InviteToken,
        username: &str,
        password: &str,
    ) -> Result<User, Error> {
        let request = ApiRequest::post("/invites/use")
            .json(&serde_json::json!({
                "token": token,
                "username": username,
                "password": password,
            }))?
            .unguarded();
        self.client
            .guard()
            .request(request)
            .await?
            .error_for_status()?;

        self.client.guard().reset_failures();
        let user = self.fetch_user().await?;
        tracing::info!(username = %user.username, "Registered from invite");
        self.client.session().emit(SessionEvent::SignedIn);
        Ok(user)
    }

    /// # Errors
    ///
    /// [`Error::Validation`] if the current password is wrong, or any other
    /// [`Error`] from the request.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<MessageResponse, Error> {
        let request = ApiRequest::post("/auth/change-password").json(&serde_json::json!({
            "current_password": current_password,
            "new_password": new_password,
        }))?;
        self.client.send_json(request).await
    }

    /// Page-load identity check.
    ///
    /// Network and server errors are retried with the configured
    /// [`RetryPolicy`](crate::RetryPolicy). A rejected session is not an error:
    /// it yields `Ok(None)`. The session is marked initialized whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// The last transient [`Error`] once retries are used up.
    pub async fn initialize(&self) -> Result<Option<User>, Error> {
        let result = self.check_identity().await;
        self.client.session().mark_initialized();
        result
    }

    async fn check_identity(&self) -> Result<Option<User>, Error> {
        let policy = self.client.config().identity_retry();
        let mut attempt = 0;
        loop {
            match self.fetch_user().await {
                Ok(user) => {
                    self.client.session().emit(SessionEvent::SignedIn);
                    return Ok(Some(user));
                }
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(error = %e, attempt, ?delay, "Identity check failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "Unable to verify authentication status");
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "No active session");
                    return Ok(None);
                }
            }
        }
    }

    /// Watch the signed-in user.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.client.session().subscribe()
    }
}

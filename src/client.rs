use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::auth::AuthApi;
use crate::books::BooksApi;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::guard::SessionGuard;
use crate::invites::InvitesApi;
use crate::redemption::RedemptionCodesApi;
use crate::routes::RouteGuard;
use crate::session::{SessionEvent, SessionState};
use crate::stores::Stores;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

#[cfg(feature = "admin")]
use crate::admin::AdminApi;

/// mArchive API client.
///
/// Owns the session context, the session guard and the snapshot stores.
/// Cloning is cheap and every clone shares the same session.
///
/// ```rust,ignore
/// use marchive_client::{ClientConfig, Credentials, MarchiveClient};
///
/// let client = MarchiveClient::new(ClientConfig::from_env()?)?;
/// client.auth().login(&Credentials::new("alice", "hunter2")).await?;
/// let results = client.books().search("dune", 20, 0).await?;
/// ```
pub struct MarchiveClient<T = HttpTransport> {
    config: ClientConfig,
    guard: SessionGuard<T>,
    stores: Arc<Stores>,
}

// Manual Clone: avoid derive adding a `T: Clone` bound.
impl<T> Clone for MarchiveClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            guard: self.guard.clone(),
            stores: self.stores.clone(),
        }
    }
}

impl MarchiveClient<HttpTransport> {
    /// Create a client talking HTTP to the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> MarchiveClient<T> {
    /// Create a client over a custom transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let session = Arc::new(SessionState::new());
        let guard = SessionGuard::new(transport, session, config.max_refresh_failures());
        Self {
            config,
            guard,
            stores: Arc::new(Stores::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current session context.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionState> {
        self.guard.session()
    }

    #[must_use]
    pub fn guard(&self) -> &SessionGuard<T> {
        &self.guard
    }

    /// Last-fetched snapshots (search results, favorites, jobs, ...).
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Subscribe to session lifecycle events, including
    /// [`SessionEvent::Expired`] when a refresh fails.
    #[must_use]
    pub fn on_session_expired(&self) -> broadcast::Receiver<SessionEvent> {
        self.session().events()
    }

    #[must_use]
    pub fn auth(&self) -> AuthApi<'_, T> {
        AuthApi::new(self)
    }

    #[must_use]
    pub fn books(&self) -> BooksApi<'_, T> {
        BooksApi::new(self)
    }

    #[must_use]
    pub fn invites(&self) -> InvitesApi<'_, T> {
        InvitesApi::new(self)
    }

    #[must_use]
    pub fn redemption_codes(&self) -> RedemptionCodesApi<'_, T> {
        RedemptionCodesApi::new(self)
    }

    #[cfg(feature = "admin")]
    #[must_use]
    pub fn admin(&self) -> AdminApi<'_, T> {
        AdminApi::new(self)
    }

    /// Navigation guard bound to this client's session.
    #[must_use]
    pub fn route_guard(&self) -> RouteGuard<T> {
        RouteGuard::new(self.clone())
    }

    /// Send through the session guard and map non-2xx to a typed error.
    ///
    /// # Errors
    ///
    /// Any [`Error`]; see [`SessionGuard::request`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        self.guard.request(request).await?.error_for_status()
    }

    /// [`send`](Self::send) and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Any [`Error`], including [`Error::Decode`] for an unexpected body.
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, Error> {
        self.send(request).await?.json()
    }
}

/// Percent-encode a single path segment.
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

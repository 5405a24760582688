//! Navigation guard: decides whether a route may be entered given the
//! current session.

use crate::client::MarchiveClient;
use crate::session::Session;
use crate::transport::{HttpTransport, Transport};

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_HOME_PATH: &str = "/";

/// Access requirements attached to a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMeta {
    pub requires_auth: bool,
    pub requires_admin: bool,
    pub requires_guest: bool,
}

impl RouteMeta {
    /// Open to everyone.
    #[must_use]
    pub const fn public() -> Self {
        Self {
            requires_auth: false,
            requires_admin: false,
            requires_guest: false,
        }
    }

    /// Signed-in users only.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            requires_auth: true,
            requires_admin: false,
            requires_guest: false,
        }
    }

    /// Signed-in admins only.
    #[must_use]
    pub const fn admin() -> Self {
        Self {
            requires_auth: true,
            requires_admin: true,
            requires_guest: false,
        }
    }

    /// Signed-out visitors only (login, register).
    #[must_use]
    pub const fn guest() -> Self {
        Self {
            requires_auth: false,
            requires_admin: false,
            requires_guest: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(String),
}

pub struct RouteGuard<T = HttpTransport> {
    client: MarchiveClient<T>,
    login_path: String,
    home_path: String,
}

impl<T: Transport> RouteGuard<T> {
    #[must_use]
    pub fn new(client: MarchiveClient<T>) -> Self {
        Self {
            client,
            login_path: DEFAULT_LOGIN_PATH.into(),
            home_path: DEFAULT_HOME_PATH.into(),
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    /// Run before entering a route. The first call performs the identity
    /// check; an identity check that errors leaves the visitor signed out.
    pub async fn before_each(&self, meta: &RouteMeta) -> Navigation {
        let session = self.client.session();
        if !session.is_initialized() {
            if let Err(e) = self.client.auth().initialize().await {
                tracing::warn!(error = %e, "Identity check failed, treating visitor as signed out");
            }
        }
        self.decide(meta, &session.snapshot())
    }

    /// Pure routing decision for a session snapshot.
    #[must_use]
    pub fn decide(&self, meta: &RouteMeta, session: &Session) -> Navigation {
        if meta.requires_auth && !session.authenticated {
            Navigation::Redirect(self.login_path.clone())
        } else if meta.requires_admin && !session.admin {
            Navigation::Redirect(self.home_path.clone())
        } else if meta.requires_guest && session.authenticated {
            Navigation::Redirect(self.home_path.clone())
        } else {
            Navigation::Proceed
        }
    }
}

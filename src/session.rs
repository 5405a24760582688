use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, watch};

use crate::types::User;

/// Point-in-time view of the session.
///
/// `authenticated` and `admin` are derived from `user` on construction and
/// never set independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub authenticated: bool,
    pub admin: bool,
}

impl Session {
    #[must_use]
    pub fn from_user(user: Option<User>) -> Self {
        let authenticated = user.is_some();
        let admin = user.as_ref().is_some_and(User::is_admin);
        Self {
            user,
            authenticated,
            admin,
        }
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Identity fetched after login, registration or a page-load check.
    SignedIn,
    /// The session guard renewed credentials and re-verified the identity.
    Refreshed,
    /// The session could not be renewed; local state was cleared.
    Expired,
    /// The user logged out.
    SignedOut,
}

const EVENT_CAPACITY: usize = 16;

/// Owner of the current user snapshot.
///
/// One instance per client, shared by the session guard and the UI layer.
/// Subscribers see every replacement through a `watch` channel.
#[derive(Debug)]
pub struct SessionState {
    user: watch::Sender<Option<User>>,
    events: broadcast::Sender<SessionEvent>,
    initialized: AtomicBool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        let (user, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            user,
            events,
            initialized: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        Session::from_user(self.user.borrow().clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.borrow().is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.borrow().as_ref().is_some_and(User::is_admin)
    }

    /// Whether an identity check has completed at least once.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Replace the user snapshot wholesale.
    pub fn set_user(&self, user: User) {
        tracing::debug!(username = %user.username, role = %user.role, "Session user updated");
        self.user.send_replace(Some(user));
    }

    /// Drop the user snapshot. Returns whether a user was removed; calling
    /// this on an empty session is a no-op.
    pub fn clear(&self) -> bool {
        self.user.send_if_modified(|current| current.take().is_some())
    }

    /// Watch the user snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }

    /// Receive session lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

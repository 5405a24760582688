//! Single-flight session refresh around the transport.
//!
//! When a guarded request comes back 401, the guard issues one
//! `POST /auth/refresh` no matter how many requests failed concurrently.
//! Every caller awaits the same shared outcome and, on success, replays its
//! original request exactly once.
//!
//! ```text
//! Idle ──401──▶ Refreshing ──ok──▶ Idle (failures = 0, generation + 1, replay)
//!                   │
//!                   └──err──▶ Idle (failures + 1, generation + 1, session cleared, reject)
//! ```
//!
//! A 401 for a request sent before the latest refresh resolved reuses that
//! refresh's outcome: it replays if the refresh succeeded and fails with the
//! same error if it did not.
//!
//! After `max_failures` consecutive failed refreshes the guard stops
//! refreshing and returns [`Error::AuthExpired`] until
//! [`SessionGuard::reset_failures`] is called by a successful login.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::{Error, error_message};
use crate::session::{SessionEvent, SessionState};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::User;

pub(crate) const REFRESH_PATH: &str = "/auth/refresh";
pub(crate) const ME_PATH: &str = "/auth/me";

#[derive(Debug, Clone)]
struct RefreshFailure {
    status: Option<u16>,
    message: String,
}

impl RefreshFailure {
    fn from_response(response: &ApiResponse) -> Self {
        Self {
            status: Some(response.status),
            message: error_message(&response.body),
        }
    }

    fn from_error(error: &Error) -> Self {
        Self {
            status: error.status(),
            message: error.to_string(),
        }
    }
}

impl From<RefreshFailure> for Error {
    fn from(f: RefreshFailure) -> Self {
        Self::AuthInvalid {
            status: f.status,
            message: f.message,
        }
    }
}

type RefreshOutcome = Result<(), RefreshFailure>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct GuardState {
    in_flight: Option<PendingRefresh>,
    failures: u32,
    /// Number of resolved refreshes, successful or not.
    generation: u64,
    /// Outcome of the latest refresh when it failed.
    last_failure: Option<RefreshFailure>,
}

struct Inner<T> {
    transport: T,
    session: Arc<SessionState>,
    state: Mutex<GuardState>,
    max_failures: u32,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Transport wrapper that recovers expired sessions transparently.
pub struct SessionGuard<T> {
    inner: Arc<Inner<T>>,
}

// Manual Clone: avoid derive adding a `T: Clone` bound.
impl<T> Clone for SessionGuard<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> SessionGuard<T> {
    #[must_use]
    pub fn new(transport: T, session: Arc<SessionState>, max_failures: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                session,
                state: Mutex::new(GuardState::default()),
                max_failures,
            }),
        }
    }

    /// Session context this guard updates.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionState> {
        &self.inner.session
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Consecutive failed refreshes since the last success or reset.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Whether a refresh is currently in progress.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    /// Forget previous refresh failures. Called after a successful login so a
    /// new session is not penalized by an old one.
    pub fn reset_failures(&self) {
        let mut state = self.inner.lock();
        state.failures = 0;
        state.last_failure = None;
    }

    /// Send a request, refreshing the session and replaying once on 401.
    ///
    /// Unguarded requests and requests to the refresh endpoint go straight to
    /// the transport and their 401 is returned as-is.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthInvalid`] if the refresh this request waited on, or the
    ///   one that resolved while it was in flight, failed.
    /// - [`Error::AuthExpired`] if refreshing is exhausted or the replay was
    ///   rejected again.
    /// - Any transport error.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        if !request.guarded || request.path == REFRESH_PATH {
            return self.inner.transport.send(request).await;
        }

        let generation = self.inner.lock().generation;
        let replay = request.clone();

        let response = self.inner.transport.send(request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!(path = %replay.path, "Request unauthorized, recovering session");
        self.recover(generation).await?;

        let response = self.inner.transport.send(replay).await?;
        if response.is_unauthorized() {
            tracing::warn!("Request still unauthorized after session refresh");
            return Err(Error::AuthExpired);
        }
        Ok(response)
    }

    /// Wait for a refresh newer than `seen_generation` to resolve, starting
    /// one only if none is running.
    async fn recover(&self, seen_generation: u64) -> Result<(), Error> {
        let pending = {
            let mut state = self.inner.lock();
            if state.generation != seen_generation {
                // A refresh resolved after this request went out.
                return match &state.last_failure {
                    Some(failure) => Err(failure.clone().into()),
                    None => Ok(()),
                };
            }
            if let Some(pending) = state.in_flight.clone() {
                pending
            } else if state.failures >= self.inner.max_failures {
                tracing::warn!(
                    failures = state.failures,
                    "Session refresh attempts exhausted"
                );
                if self.inner.session.clear() {
                    self.inner.session.emit(SessionEvent::Expired);
                }
                return Err(Error::AuthExpired);
            } else {
                let pending = refresh(self.inner.clone()).boxed().shared();
                state.in_flight = Some(pending.clone());
                pending
            }
        };

        pending.await.map_err(Error::from)
    }
}

async fn refresh<T: Transport>(inner: Arc<Inner<T>>) -> RefreshOutcome {
    tracing::info!("Refreshing session");
    let outcome = renew(&inner).await;

    // Publish the result before any waiter is released.
    match &outcome {
        Ok(user) => {
            inner.session.set_user(user.clone());
            let mut state = inner.lock();
            state.in_flight = None;
            state.failures = 0;
            state.generation += 1;
            state.last_failure = None;
        }
        Err(failure) => {
            inner.session.clear();
            let mut state = inner.lock();
            state.in_flight = None;
            state.failures += 1;
            state.generation += 1;
            state.last_failure = Some(failure.clone());
            tracing::warn!(
                status = ?failure.status,
                error = %failure.message,
                failures = state.failures,
                "Session refresh failed"
            );
        }
    }

    match outcome {
        Ok(_) => {
            inner.session.emit(SessionEvent::Refreshed);
            Ok(())
        }
        Err(failure) => {
            inner.session.emit(SessionEvent::Expired);
            Err(failure)
        }
    }
}

/// Renew the session cookie, then verify it by fetching the identity.
async fn renew<T: Transport>(inner: &Inner<T>) -> Result<User, RefreshFailure> {
    let response = inner
        .transport
        .send(ApiRequest::post(REFRESH_PATH).empty_object().unguarded())
        .await
        .map_err(|e| RefreshFailure::from_error(&e))?;
    if !response.is_success() {
        return Err(RefreshFailure::from_response(&response));
    }

    let me = inner
        .transport
        .send(ApiRequest::get(ME_PATH).unguarded())
        .await
        .map_err(|e| RefreshFailure::from_error(&e))?;
    if !me.is_success() {
        return Err(RefreshFailure::from_response(&me));
    }
    me.json::<User>()
        .map_err(|e| RefreshFailure::from_error(&e))
}

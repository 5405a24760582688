//! Last-fetched snapshots, observable through `watch` channels.
//!
//! A later fetch with different parameters replaces the snapshot; nothing is
//! merged except download jobs, which are updated by id.

use tokio::sync::watch;

use crate::books::{BookList, DownloadJob, SearchResponse};
use crate::invites::InviteList;
use crate::redemption::RedemptionCodeList;
use crate::types::JobId;

#[cfg(feature = "admin")]
use crate::admin::{SystemStats, UserList};

#[derive(Debug)]
pub struct Stores {
    search_results: watch::Sender<Option<SearchResponse>>,
    explored: watch::Sender<Option<BookList>>,
    favorites: watch::Sender<Option<BookList>>,
    download_jobs: watch::Sender<Vec<DownloadJob>>,
    invites: watch::Sender<Option<InviteList>>,
    redemption_codes: watch::Sender<Option<RedemptionCodeList>>,
    #[cfg(feature = "admin")]
    system_stats: watch::Sender<Option<SystemStats>>,
    #[cfg(feature = "admin")]
    users: watch::Sender<Option<UserList>>,
}

impl Default for Stores {
    fn default() -> Self {
        Self::new()
    }
}

impl Stores {
    #[must_use]
    pub fn new() -> Self {
        Self {
            search_results: watch::Sender::new(None),
            explored: watch::Sender::new(None),
            favorites: watch::Sender::new(None),
            download_jobs: watch::Sender::new(Vec::new()),
            invites: watch::Sender::new(None),
            redemption_codes: watch::Sender::new(None),
            #[cfg(feature = "admin")]
            system_stats: watch::Sender::new(None),
            #[cfg(feature = "admin")]
            users: watch::Sender::new(None),
        }
    }

    // ── Books ──────────────────────────────────────────────────────

    #[must_use]
    pub fn search_results(&self) -> watch::Receiver<Option<SearchResponse>> {
        self.search_results.subscribe()
    }

    #[must_use]
    pub fn explored(&self) -> watch::Receiver<Option<BookList>> {
        self.explored.subscribe()
    }

    #[must_use]
    pub fn favorites(&self) -> watch::Receiver<Option<BookList>> {
        self.favorites.subscribe()
    }

    #[must_use]
    pub fn download_jobs(&self) -> watch::Receiver<Vec<DownloadJob>> {
        self.download_jobs.subscribe()
    }

    pub(crate) fn set_search_results(&self, results: SearchResponse) {
        self.search_results.send_replace(Some(results));
    }

    pub(crate) fn set_explored(&self, list: BookList) {
        self.explored.send_replace(Some(list));
    }

    pub(crate) fn set_favorites(&self, list: BookList) {
        self.favorites.send_replace(Some(list));
    }

    /// Insert a job, or overwrite the fields of the job with the same id.
    pub fn upsert_job(&self, job: DownloadJob) {
        self.download_jobs.send_modify(|jobs| {
            match jobs.iter_mut().find(|j| j.id == job.id) {
                Some(existing) => *existing = job,
                None => jobs.push(job),
            }
        });
    }

    /// Current copy of one tracked job.
    #[must_use]
    pub fn job(&self, id: &JobId) -> Option<DownloadJob> {
        self.download_jobs
            .borrow()
            .iter()
            .find(|j| &j.id == id)
            .cloned()
    }

    /// Stop tracking a job. Returns whether it was tracked.
    pub fn remove_job(&self, id: &JobId) -> bool {
        self.download_jobs.send_if_modified(|jobs| {
            let before = jobs.len();
            jobs.retain(|j| &j.id != id);
            jobs.len() != before
        })
    }

    // ── Invites & codes ────────────────────────────────────────────

    #[must_use]
    pub fn invites(&self) -> watch::Receiver<Option<InviteList>> {
        self.invites.subscribe()
    }

    pub(crate) fn set_invites(&self, list: InviteList) {
        self.invites.send_replace(Some(list));
    }

    #[must_use]
    pub fn redemption_codes(&self) -> watch::Receiver<Option<RedemptionCodeList>> {
        self.redemption_codes.subscribe()
    }

    pub(crate) fn set_redemption_codes(&self, list: RedemptionCodeList) {
        self.redemption_codes.send_replace(Some(list));
    }

    // ── Admin ──────────────────────────────────────────────────────

    #[cfg(feature = "admin")]
    #[must_use]
    pub fn system_stats(&self) -> watch::Receiver<Option<SystemStats>> {
        self.system_stats.subscribe()
    }

    #[cfg(feature = "admin")]
    pub(crate) fn set_system_stats(&self, stats: SystemStats) {
        self.system_stats.send_replace(Some(stats));
    }

    #[cfg(feature = "admin")]
    #[must_use]
    pub fn users(&self) -> watch::Receiver<Option<UserList>> {
        self.users.subscribe()
    }

    #[cfg(feature = "admin")]
    pub(crate) fn set_users(&self, list: UserList) {
        self.users.send_replace(Some(list));
    }
}

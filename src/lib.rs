#![doc = include_str!("../README.md")]

#[cfg(feature = "admin")]
pub mod admin;
pub mod auth;
pub mod books;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod invites;
pub mod password;
pub mod redemption;
pub mod routes;
pub mod session;
pub mod stores;
pub mod transport;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "admin")]
pub use admin::{AdminApi, NewUser, SystemStats, UserList, UserUpdate, UserWithStats};
pub use auth::{AuthApi, Credentials};
#[cfg(feature = "admin")]
pub use books::{BookUpload, MetadataUpdate, RestoreReport};
pub use books::{
    Book, BookDetail, BookList, BooksApi, DownloadJob, DownloadList, DownloadRequest, FileUpload,
    JobStatus, PollPolicy, SearchResponse, SearchType,
};
pub use client::MarchiveClient;
pub use config::{ClientConfig, RetryPolicy};
pub use error::Error;
pub use guard::SessionGuard;
pub use invites::{Invite, InviteList, InviteResponse, InvitesApi};
pub use password::{
    PasswordRequirements, PasswordStrength, PasswordValidation, password_strength,
    validate_password,
};
pub use redemption::{
    NewRedemptionCode, RedeemResponse, RedemptionCode, RedemptionCodeList, RedemptionCodesApi,
};
pub use routes::{Navigation, RouteGuard, RouteMeta};
pub use session::{Session, SessionEvent, SessionState};
pub use stores::Stores;
pub use transport::{ApiRequest, ApiResponse, Body, FormField, HttpTransport, Transport};
pub use types::{BookHash, CodeId, InviteToken, JobId, MessageResponse, Pagination, Role, User, UserId};

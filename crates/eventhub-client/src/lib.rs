//! Client library for the Eventhub admin API.
//!
//! - [`client::ApiClient`]: bearer-token HTTP client with one-shot refresh and
//!   retry on 401
//! - [`cache::TtlCache`]: response cache with per-entry expiry
//! - [`session::SessionStore`]: persisted session with change notifications
//! - [`auth::AuthFlow`]: email one-time-password login
//! - [`resources`]: typed events, communities, users and settings

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod generation;
pub mod pagination;
pub mod resources;
pub mod roles;
pub mod session;
pub mod storage;
pub mod upload;

pub use auth::{AuthFlow, AuthState, VerifyOutcome};
pub use cache::{CacheStats, TtlCache, cache_key};
pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ApiError, StorageError, UploadError};
pub use generation::{RequestGeneration, Ticket};
pub use pagination::{ListQuery, Page, Pagination};
pub use resources::{
    Community, Event, ListController, ManagedUser, PlatformSettings, Resource, ResourceApi,
    SettingsApi,
};
pub use roles::{Role, Section, require_section};
pub use session::{Session, SessionEvent, SessionStore, TokenPair, User};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageKey};

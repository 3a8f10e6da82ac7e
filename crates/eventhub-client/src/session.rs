//! Session state shared by the API client and the front end.
//!
//! [`SessionStore`] owns the current tokens and user, mirrors them into a
//! [`SessionStorage`], and announces changes on a broadcast channel. It is
//! the single writer of session state; everything else reads snapshots.
//!
//! Every change to the tokens bumps an `epoch` counter. The API client
//! remembers the epoch a request was sent under, which lets concurrent
//! requests that were all rejected with 401 agree on a single refresh.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::roles::Role;
use crate::storage::{SessionStorage, StorageKey};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// The logged-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// Access and refresh tokens issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    pub device_id: String,
}

/// Token state as seen by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub has_refresh_token: bool,
    pub epoch: u64,
}

impl Credentials {
    /// No token of any kind is held.
    pub fn is_anonymous(&self) -> bool {
        self.access_token.is_none() && !self.has_refresh_token
    }
}

/// Changes announced by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(User),
    TokensRefreshed,
    LoggedOut,
    /// The session was dropped because its tokens could not be renewed.
    /// Front ends react by sending the user back to login.
    Invalidated,
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<User>,
    epoch: u64,
}

/// Holds the current session and persists it.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    state: RwLock<SessionState>,
    device_id: String,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionStore")
            .field("authenticated", &state.access_token.is_some())
            .field("user", &state.user.as_ref().map(|u| &u.email))
            .field("device_id", &self.device_id)
            .field("epoch", &state.epoch)
            .finish()
    }
}

impl SessionStore {
    /// Restores the session persisted in `storage`.
    ///
    /// A device id is generated and stored on first use. A stored user that
    /// no longer parses is dropped rather than failing the restore.
    pub fn restore(storage: Arc<dyn SessionStorage>) -> Result<Self, StorageError> {
        let device_id = match storage.get(StorageKey::DeviceId)? {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                storage.set(StorageKey::DeviceId, &id)?;
                tracing::debug!(device_id = %id, "generated device id");
                id
            }
        };

        let user = match storage.get(StorageKey::User)? {
            Some(raw) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable stored user");
                    storage.remove(StorageKey::User)?;
                    None
                }
            },
            None => None,
        };

        let state = SessionState {
            access_token: storage.get(StorageKey::AccessToken)?,
            refresh_token: storage.get(StorageKey::RefreshToken)?,
            user,
            epoch: 0,
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            storage,
            state: RwLock::new(state),
            device_id,
            events,
        })
    }

    /// Subscribes to session changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().access_token.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Consistent snapshot of the token state for a request.
    pub fn credentials(&self) -> Credentials {
        let state = self.read();
        Credentials {
            access_token: state.access_token.clone(),
            has_refresh_token: state.refresh_token.is_some(),
            epoch: state.epoch,
        }
    }

    /// Current session, if logged in.
    pub fn session(&self) -> Option<Session> {
        let state = self.read();
        state.access_token.as_ref().map(|token| Session {
            access_token: token.clone(),
            refresh_token: state.refresh_token.clone(),
            user: state.user.clone(),
            device_id: self.device_id.clone(),
        })
    }

    /// Starts a session after a successful login.
    pub fn establish(&self, tokens: TokenPair, user: User) -> Result<(), StorageError> {
        self.persist_tokens(&tokens)?;
        self.storage
            .set(StorageKey::User, &serde_json::to_string(&user)?)?;

        {
            let mut state = self.write();
            state.access_token = Some(tokens.access_token);
            state.refresh_token = tokens.refresh_token;
            state.user = Some(user.clone());
            state.epoch += 1;
        }

        tracing::info!(user = %user.email, role = %user.role, "session established");
        let _ = self.events.send(SessionEvent::LoggedIn(user));
        Ok(())
    }

    /// Replaces the tokens after a refresh.
    ///
    /// A refresh response without a refresh token keeps the current one.
    pub fn update_tokens(&self, tokens: TokenPair) -> Result<(), StorageError> {
        let refresh_token = tokens.refresh_token.or_else(|| self.refresh_token());
        let tokens = TokenPair {
            access_token: tokens.access_token,
            refresh_token,
        };
        self.persist_tokens(&tokens)?;

        {
            let mut state = self.write();
            state.access_token = Some(tokens.access_token);
            state.refresh_token = tokens.refresh_token;
            state.epoch += 1;
        }

        tracing::debug!("session tokens refreshed");
        let _ = self.events.send(SessionEvent::TokensRefreshed);
        Ok(())
    }

    /// Replaces the stored user, e.g. after fetching the profile.
    pub fn set_user(&self, user: User) -> Result<(), StorageError> {
        self.storage
            .set(StorageKey::User, &serde_json::to_string(&user)?)?;
        self.write().user = Some(user);
        Ok(())
    }

    /// Ends the session at the user's request.
    pub fn logout(&self) {
        if self.clear() {
            tracing::info!("logged out");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
    }

    /// Drops the session because it can no longer be renewed.
    ///
    /// Announces [`SessionEvent::Invalidated`] once; invalidating an already
    /// empty session is silent.
    pub fn invalidate(&self) {
        if self.clear() {
            tracing::warn!("session invalidated");
            let _ = self.events.send(SessionEvent::Invalidated);
        }
    }

    /// Clears state and session keys. Returns whether anything was held.
    ///
    /// Storage failures are logged; in-memory state is cleared regardless.
    fn clear(&self) -> bool {
        let had_session = {
            let mut state = self.write();
            let had = state.access_token.is_some()
                || state.refresh_token.is_some()
                || state.user.is_some();
            state.access_token = None;
            state.refresh_token = None;
            state.user = None;
            state.epoch += 1;
            had
        };

        for key in StorageKey::SESSION_KEYS {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key = key.as_str(), error = %e, "failed to clear stored session key");
            }
        }

        had_session
    }

    fn persist_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        self.storage
            .set(StorageKey::AccessToken, &tokens.access_token)?;
        match &tokens.refresh_token {
            Some(refresh) => self.storage.set(StorageKey::RefreshToken, refresh),
            None => self.storage.remove(StorageKey::RefreshToken),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

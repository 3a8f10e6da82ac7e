//! Email one-time-password login.
//!
//! ```text
//! Anonymous --request_otp--> OtpRequested --verify_otp--> Authenticated
//!                                 |                            |
//!                                 | active session elsewhere   | logout / invalidation
//!                                 v                            v
//!                            OtpConflict --logout_other_devices--> Authenticated
//!                                 |
//!                                 +--abort--> Anonymous
//! ```
//!
//! The backend signals a conflict with HTTP 409 on `verify-otp`. Resolving it
//! replays the verification with `forceLogout: true`, which ends the session
//! on every other device.

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::session::{TokenPair, User};

pub const REQUEST_OTP_PATH: &str = "/api/auth/request-otp";
pub const VERIFY_OTP_PATH: &str = "/api/auth/verify-otp";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const ME_PATH: &str = "/api/auth/me";

/// Where the login flow stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    OtpRequested {
        email: String,
    },
    /// The account is signed in on another device.
    OtpConflict {
        email: String,
        otp: String,
        message: String,
    },
    Authenticated(User),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::OtpRequested { .. } => "otp_requested",
            Self::OtpConflict { .. } => "otp_conflict",
            Self::Authenticated(_) => "authenticated",
        }
    }
}

/// Outcome of submitting a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    LoggedIn(User),
    /// Another device holds a session; see [`AuthFlow::logout_other_devices`].
    Conflict { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: User,
}

/// Drives the login state machine against the backend.
#[derive(Debug)]
pub struct AuthFlow {
    client: ApiClient,
    state: AuthState,
}

impl AuthFlow {
    /// Starts in `Authenticated` when the session already holds a user.
    pub fn new(client: ApiClient) -> Self {
        let state = match (client.session().is_authenticated(), client.session().user()) {
            (true, Some(user)) => AuthState::Authenticated(user),
            _ => AuthState::Anonymous,
        };
        Self { client, state }
    }

    /// Current state. A session invalidated behind the flow's back reads as
    /// `Anonymous`.
    pub fn state(&self) -> &AuthState {
        static ANONYMOUS: AuthState = AuthState::Anonymous;
        if matches!(self.state, AuthState::Authenticated(_)) && !self.client.session().is_authenticated()
        {
            return &ANONYMOUS;
        }
        &self.state
    }

    fn sync_with_session(&mut self) {
        if matches!(self.state, AuthState::Authenticated(_)) && !self.client.session().is_authenticated()
        {
            self.state = AuthState::Anonymous;
        }
    }

    /// Asks the backend to email a code to `email`.
    pub async fn request_otp(&mut self, email: &str) -> Result<(), ApiError> {
        self.sync_with_session();
        match &self.state {
            AuthState::Anonymous | AuthState::OtpRequested { .. } => {}
            other => {
                return Err(ApiError::InvalidState(format!(
                    "cannot request a code while {}",
                    other.name()
                )));
            }
        }

        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::InvalidState(format!(
                "'{email}' is not an email address"
            )));
        }

        let body = json!({
            "email": email,
            "deviceId": self.client.session().device_id(),
        });
        self.client
            .request(Method::POST, REQUEST_OTP_PATH, Some(&body))
            .await?;

        tracing::info!(email, "one-time password requested");
        self.state = AuthState::OtpRequested {
            email: email.to_string(),
        };
        Ok(())
    }

    /// Submits the emailed code.
    pub async fn verify_otp(&mut self, otp: &str) -> Result<VerifyOutcome, ApiError> {
        let AuthState::OtpRequested { email } = &self.state else {
            return Err(ApiError::InvalidState(format!(
                "cannot verify a code while {}",
                self.state.name()
            )));
        };
        let email = email.clone();
        let otp = otp.trim().to_string();

        match self.submit(&email, &otp, false).await {
            Ok(user) => Ok(VerifyOutcome::LoggedIn(user)),
            Err(ApiError::Http {
                status: 409,
                message,
                ..
            }) => {
                tracing::info!(email, "active session on another device");
                self.state = AuthState::OtpConflict {
                    email,
                    otp,
                    message: message.clone(),
                };
                Ok(VerifyOutcome::Conflict { message })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves a conflict by signing out every other device.
    pub async fn logout_other_devices(&mut self) -> Result<User, ApiError> {
        let AuthState::OtpConflict { email, otp, .. } = &self.state else {
            return Err(ApiError::InvalidState(format!(
                "no device conflict to resolve while {}",
                self.state.name()
            )));
        };
        let (email, otp) = (email.clone(), otp.clone());
        self.submit(&email, &otp, true).await
    }

    /// Gives up on a conflicted login.
    pub fn abort(&mut self) -> Result<(), ApiError> {
        match self.state {
            AuthState::OtpConflict { .. } | AuthState::OtpRequested { .. } => {
                self.state = AuthState::Anonymous;
                Ok(())
            }
            _ => Err(ApiError::InvalidState(format!(
                "nothing to abort while {}",
                self.state.name()
            ))),
        }
    }

    /// Ends the session. Local state is cleared even if the backend call fails.
    pub async fn logout(&mut self) -> Result<(), ApiError> {
        let session = self.client.session().clone();
        let result = if session.is_authenticated() {
            let body = json!({
                "refreshToken": session.refresh_token(),
                "deviceId": session.device_id(),
            });
            self.client
                .request(Method::POST, LOGOUT_PATH, Some(&body))
                .await
                .map(|_| ())
        } else {
            Ok(())
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "backend logout failed, clearing local session anyway");
        }
        self.client.clear_cache();
        session.logout();
        self.state = AuthState::Anonymous;
        match result {
            // An expired token means the backend session is already gone
            Err(e) if e.status() == Some(401) => Ok(()),
            Err(ApiError::SessionInvalidated) => Ok(()),
            other => other,
        }
    }

    /// Fetches the profile of the logged-in user and stores it.
    pub async fn refresh_profile(&mut self) -> Result<User, ApiError> {
        let user: User = self.client.request_json(Method::GET, ME_PATH, None).await?;
        self.client.session().set_user(user.clone())?;
        self.state = AuthState::Authenticated(user.clone());
        Ok(user)
    }

    async fn submit(&mut self, email: &str, otp: &str, force_logout: bool) -> Result<User, ApiError> {
        if otp.is_empty() {
            return Err(ApiError::InvalidState("the code is empty".to_string()));
        }
        let body = json!({
            "email": email,
            "otp": otp,
            "deviceId": self.client.session().device_id(),
            "forceLogout": force_logout,
        });
        let resp: LoginResponse = self
            .client
            .request_json(Method::POST, VERIFY_OTP_PATH, Some(&body))
            .await?;

        self.client.clear_cache();
        self.client.session().establish(
            TokenPair {
                access_token: resp.access_token,
                refresh_token: resp.refresh_token,
            },
            resp.user.clone(),
        )?;
        self.state = AuthState::Authenticated(resp.user.clone());
        Ok(resp.user)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ClientConfig;
    use crate::session::SessionStore;
    use crate::storage::MemoryStorage;

    fn flow() -> AuthFlow {
        let session = Arc::new(SessionStore::restore(Arc::new(MemoryStorage::new())).unwrap());
        // Nothing listens here; these tests never reach the network
        let client = ApiClient::new(
            &ClientConfig::default().with_base_url("http://127.0.0.1:9"),
            session,
        )
        .unwrap();
        AuthFlow::new(client)
    }

    #[tokio::test]
    async fn test_verify_requires_requested_code() {
        let mut flow = flow();
        assert_eq!(flow.state(), &AuthState::Anonymous);
        let err = flow.verify_otp("123456").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_conflict_resolution_requires_conflict() {
        let mut flow = flow();
        let err = flow.logout_other_devices().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
        assert!(flow.abort().is_err());
    }

    #[tokio::test]
    async fn test_request_otp_rejects_bad_email() {
        let mut flow = flow();
        let err = flow.request_otp("not-an-email").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
        assert_eq!(flow.state(), &AuthState::Anonymous);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(AuthState::Anonymous.name(), "anonymous");
        assert_eq!(
            AuthState::OtpRequested {
                email: "a@b.c".into()
            }
            .name(),
            "otp_requested"
        );
    }
}

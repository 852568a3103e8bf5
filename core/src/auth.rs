//! Sign-in flows on top of the shared `Session`.
//!
//! `Authenticator` drives the session through login, registration, demo
//! login, token restore and logout, and announces each outcome through the
//! `Notifier`. It holds no state of its own: everything observable lives in
//! the session it shares with the `ApiClient`.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::notify::Notifier;
use crate::session::Session;
use crate::types::{AuthResponse, Credentials, ProfileUpdate, Registration, Role, UserSummary};

pub const LOGIN_FAILED_MESSAGE: &str = "Login failed";
pub const REGISTRATION_FAILED_MESSAGE: &str = "Registration failed";
pub const LOGOUT_MESSAGE: &str = "Logged out successfully";

/// Seeded accounts available on demo deployments.
pub fn demo_credentials(role: Role) -> Credentials {
    let (email, password) = match role {
        Role::Requester => ("requester@promin.com", "requester123"),
        Role::Tasker => ("tasker@promin.com", "tasker123"),
        Role::Admin => ("admin@promin.com", "admin123"),
    };
    Credentials {
        email: email.to_string(),
        password: password.to_string(),
    }
}

pub struct Authenticator {
    api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
}

impl Authenticator {
    pub fn new(api: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self { api, notifier }
    }

    pub fn session(&self) -> &Session {
        self.api.session()
    }

    /// Verify a persisted token with the server. A rejected or missing
    /// token leaves the session signed out.
    pub async fn restore(&self) -> Option<UserSummary> {
        let session = self.session();
        let Some(stored) = session.token() else {
            session.logout();
            return None;
        };

        match self
            .api
            .send_json::<AuthResponse>(self.api.endpoints().build_verify())
            .await
        {
            Ok(AuthResponse { user, token }) => {
                session.establish(user.clone(), token.unwrap_or(stored));
                tracing::info!(user_id = user.id, "session restored");
                Some(user)
            }
            Err(e) => {
                tracing::info!(error = %e, "stored token rejected");
                session.logout();
                None
            }
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<UserSummary, ApiError> {
        self.session().begin();
        let result = self.authenticate(self.api.endpoints().build_login(credentials)).await;
        self.finish(result, LOGIN_FAILED_MESSAGE, |user| {
            format!("Welcome back, {}!", user.first_name)
        })
    }

    pub async fn register(&self, registration: &Registration) -> Result<UserSummary, ApiError> {
        self.session().begin();
        let result = self
            .authenticate(self.api.endpoints().build_register(registration))
            .await;
        self.finish(result, REGISTRATION_FAILED_MESSAGE, |user| {
            format!("Welcome to Prominis, {}!", user.first_name)
        })
    }

    pub async fn demo_login(&self, role: Role) -> Result<UserSummary, ApiError> {
        self.login(&demo_credentials(role)).await
    }

    pub fn logout(&self) {
        self.session().logout();
        self.notifier.success(LOGOUT_MESSAGE);
    }

    /// Merge profile changes into the session without a round-trip.
    pub fn update_user(&self, update: &ProfileUpdate) {
        self.session().update_user(update);
    }

    /// Save profile changes on the server, then merge them into the session.
    pub async fn save_profile(&self, update: &ProfileUpdate) -> Result<UserSummary, ApiError> {
        let request = self.api.endpoints().build_update_profile(update)?;
        match self.api.send_json::<UserSummary>(request).await {
            Ok(user) => {
                self.session().update_user(update);
                self.notifier.success("Profile updated successfully");
                Ok(user)
            }
            Err(e) => {
                self.notifier.error(&e.display_message());
                Err(e)
            }
        }
    }

    async fn authenticate(
        &self,
        request: Result<HttpRequest, ApiError>,
    ) -> Result<(UserSummary, String), ApiError> {
        let response: AuthResponse = self.api.send_json(request?).await?;
        let token = response
            .token
            .ok_or_else(|| ApiError::Deserialization("authentication response carried no token".to_string()))?;
        Ok((response.user, token))
    }

    fn finish(
        &self,
        result: Result<(UserSummary, String), ApiError>,
        fallback: &str,
        welcome: impl FnOnce(&UserSummary) -> String,
    ) -> Result<UserSummary, ApiError> {
        match result {
            Ok((user, token)) => {
                self.session().establish(user.clone(), token);
                tracing::info!(user_id = user.id, role = user.role.as_str(), "signed in");
                self.notifier.success(&welcome(&user));
                Ok(user)
            }
            Err(e) => {
                let message = e.display_message_or(fallback);
                self.session().fail(message.clone());
                self.notifier.error(&message);
                Err(e)
            }
        }
    }
}

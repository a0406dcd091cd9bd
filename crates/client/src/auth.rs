//! Account endpoints and the signed-in session.

use roomchat_shared::{
    ApiError, EmailRequest, LoginRequest, LoginResponse, ResetPasswordRequest, SignupRequest,
    UpdateProfileRequest, UserProfile, UserStatusUpdateRequest, VerifyOtpRequest,
};

use crate::api_client::ApiClient;
use crate::session::SessionStore;

const AUTH_PATH: &str = "/api/auth";

/// Authentication calls. A successful login is persisted in the
/// [`SessionStore`]; a 401/403 from any call clears it.
#[derive(Debug, Clone)]
pub struct AuthService {
    api: ApiClient,
    session: SessionStore,
}

impl AuthService {
    pub fn new(api: ApiClient, session: SessionStore) -> Self {
        Self { api, session }
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<String, ApiError> {
        let result = self.api.post_text(&path("signup"), request).await;
        self.guard(result)
    }

    /// Log in, store the session and return the signed-in user.
    pub async fn login(&self, request: &LoginRequest) -> Result<UserProfile, ApiError> {
        let response: LoginResponse = self.guard(self.api.post_json(&path("login"), request).await)?;
        let (token, user) = response.into_parts();
        let token = token.ok_or_else(|| ApiError::Deserialize("login response has no token".to_string()))?;

        if let Err(e) = self.session.save(&token, &user) {
            crate::log_warn!("Could not persist session: {}", e);
        }
        crate::log_info!("Logged in as {}", user.email);
        Ok(user)
    }

    pub async fn update_profile(&self, request: &UpdateProfileRequest) -> Result<String, ApiError> {
        let result = self.authorized().put_text(&path("update"), request).await;
        self.guard(result)
    }

    pub async fn update_status(&self, request: &UserStatusUpdateRequest) -> Result<String, ApiError> {
        let result = self.authorized().put_text(&path("status"), request).await;
        self.guard(result)
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<String, ApiError> {
        let result = self.api.put_text(&path("reset-password"), request).await;
        self.guard(result)
    }

    pub async fn send_otp(&self, email: &str) -> Result<String, ApiError> {
        let body = EmailRequest {
            email: email.to_string(),
        };
        let result = self.api.post_text(&path("send-otp"), &body).await;
        self.guard(result)
    }

    pub async fn verify_otp(&self, request: &VerifyOtpRequest) -> Result<String, ApiError> {
        let result = self.api.post_text(&path("verify-otp"), request).await;
        self.guard(result)
    }

    pub fn logout(&self) {
        self.session.clear();
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn token(&self) -> Option<String> {
        self.session.token()
    }

    /// API client carrying the stored token, for calls made after login.
    pub fn authorized(&self) -> ApiClient {
        self.api.clone().with_token(self.session.token())
    }

    fn guard<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(e) = &result {
            if e.is_auth_failure() {
                crate::log_warn!("Credential rejected ({}), clearing session", e);
                self.session.clear();
            }
        }
        result
    }
}

fn path(endpoint: &str) -> String {
    format!("{AUTH_PATH}/{endpoint}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn auth_failure_clears_session() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Storage::new(tmp.path()));
        store
            .save(
                "jwt",
                &UserProfile {
                    user_id: "u1".to_string(),
                    name: "Alice".to_string(),
                    email: "a@x.io".to_string(),
                    is_email_verified: true,
                },
            )
            .unwrap();
        let auth = AuthService::new(ApiClient::new(), store);
        assert_eq!(auth.authorized().token(), Some("jwt"));

        let not_found: Result<(), ApiError> = Err(ApiError::Http {
            status: 404,
            body: "User not found".to_string(),
        });
        assert!(auth.guard(not_found).is_err());
        assert!(auth.is_authenticated());

        let forbidden: Result<(), ApiError> = Err(ApiError::Http {
            status: 403,
            body: "User is deactivated".to_string(),
        });
        assert!(auth.guard(forbidden).is_err());
        assert!(!auth.is_authenticated());
        assert_eq!(auth.authorized().token(), None);
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(path("login"), "/api/auth/login");
        assert_eq!(path("reset-password"), "/api/auth/reset-password");
    }
}

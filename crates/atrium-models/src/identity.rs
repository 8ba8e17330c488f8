use crate::ModelError;
use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE: &str = "tap.admin";
pub const USER_ROLE: &str = "tap.user";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    pub jti: String,
}

/// Result of a UAA `check_token` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenInfo {
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub client_id: String,
    pub scope: Vec<String>,
    pub exp: i64,
}

impl TokenInfo {
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.scope.iter().any(|s| s == r))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationRequest {
    pub email: String,
}

impl InvitationRequest {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.email.is_empty() {
            return Err(ModelError::Invalid("email: zero value".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationResponse {
    pub state: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.current_password.is_empty() {
            return Err(ModelError::Invalid("current_password: zero value".to_owned()));
        }
        if self.new_password.is_empty() {
            return Err(ModelError::Invalid("new_password: zero value".to_owned()));
        }
        Ok(())
    }
}

/// Password change as understood by user-management.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub old_password: String,
    pub password: String,
}

impl From<ChangePasswordRequest> for PasswordChange {
    fn from(req: ChangePasswordRequest) -> Self {
        Self {
            old_password: req.current_password,
            password: req.new_password,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UaaUser {
    pub guid: String,
    pub username: String,
    pub roles: Vec<String>,
}

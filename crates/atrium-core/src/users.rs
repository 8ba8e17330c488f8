//! Caller identity and user management.
//!
//! Tokens are checked against UAA; invitations and organization users are
//! managed by user-management, always acting with the caller's own token.

use crate::{ApiError, Gateway, RequestContext};
use atrium_backends::BackendError;
use atrium_models::identity::{
    ChangePasswordRequest, InvitationRequest, InvitationResponse, LoginResponse, PasswordChange,
    UaaUser,
};
use tracing::{debug, info};

const BEARER_PREFIX: &str = "bearer ";

/// Tag a user-management failure with the operation, keeping its status.
fn labelled(operation: &'static str) -> impl FnOnce(BackendError) -> ApiError {
    move |e| ApiError::new(e.status(), format!("{operation} failed: {e}"))
}

impl Gateway {
    pub fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let response = self.backends.uaa.login(username, password)?;
        info!("user {username} logged in");
        Ok(response)
    }

    /// Resolve a bearer `Authorization` header to the acting user, who must
    /// hold at least one of `roles`.
    pub fn authorize(&self, header: &str, roles: &[&str]) -> Result<RequestContext, ApiError> {
        let token = match header.get(..BEARER_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
                &header[BEARER_PREFIX.len()..]
            }
            _ => return Err(ApiError::new(401, "Invalid Authorization header")),
        };
        let token_info = self.backends.uaa.validate_token(token).map_err(|e| {
            debug!("token rejected: {e}");
            ApiError::new(401, format!("Invalid access token: {e}"))
        })?;
        if !token_info.has_any_role(roles) {
            return Err(ApiError::forbidden(format!(
                "user {} has none of the required roles: {}",
                token_info.user_name,
                roles.join(", ")
            )));
        }
        Ok(RequestContext::new(&token_info.user_name, header))
    }

    pub fn invite_user(
        &self,
        ctx: &RequestContext,
        request: &InvitationRequest,
    ) -> Result<InvitationResponse, ApiError> {
        request.validate()?;
        let response = self
            .backends
            .user_management
            .invite_user(&ctx.authorization, &request.email)
            .map_err(labelled("Invite User"))?;
        info!("{} invited {}", ctx.username, request.email);
        Ok(response)
    }

    pub fn resend_invitation(
        &self,
        ctx: &RequestContext,
        request: &InvitationRequest,
    ) -> Result<(), ApiError> {
        request.validate()?;
        self.backends
            .user_management
            .resend_invitation(&ctx.authorization, &request.email)
            .map_err(labelled("Resend User Invitation"))
    }

    pub fn list_invitations(&self, ctx: &RequestContext) -> Result<Vec<String>, ApiError> {
        self.backends
            .user_management
            .list_invitations(&ctx.authorization)
            .map_err(labelled("Get Invitations"))
    }

    pub fn delete_invitation(
        &self,
        ctx: &RequestContext,
        request: &InvitationRequest,
    ) -> Result<(), ApiError> {
        let invitations = self
            .backends
            .user_management
            .list_invitations(&ctx.authorization)
            .map_err(labelled("Delete User Invitation"))?;
        if !invitations.contains(&request.email) {
            return Err(ApiError::not_found(format!(
                "Delete User Invitation failed: no invitation for {}",
                request.email
            )));
        }
        self.backends
            .user_management
            .delete_invitation(&ctx.authorization, &request.email)
            .map_err(labelled("Delete User Invitation"))?;
        info!("{} deleted invitation of {}", ctx.username, request.email);
        Ok(())
    }

    pub fn list_users(&self, ctx: &RequestContext) -> Result<Vec<UaaUser>, ApiError> {
        self.backends
            .user_management
            .list_users(&ctx.authorization, &self.settings.default_org)
            .map_err(labelled("Get Users"))
    }

    /// Remove the organization user whose username is `request.email`.
    pub fn delete_user(
        &self,
        ctx: &RequestContext,
        request: &InvitationRequest,
    ) -> Result<(), ApiError> {
        let org = &self.settings.default_org;
        let users = self
            .backends
            .user_management
            .list_users(&ctx.authorization, org)
            .map_err(labelled("Delete User"))?;
        let user = users
            .iter()
            .find(|u| u.username == request.email)
            .ok_or_else(|| {
                ApiError::not_found(format!("Delete User failed: no user {}", request.email))
            })?;
        self.backends
            .user_management
            .delete_user(&ctx.authorization, org, &user.guid)
            .map_err(labelled("Delete User"))?;
        info!("{} deleted user {}", ctx.username, request.email);
        Ok(())
    }

    pub fn change_password(
        &self,
        ctx: &RequestContext,
        request: ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        request.validate()?;
        self.backends
            .user_management
            .change_password(&ctx.authorization, &PasswordChange::from(request))
            .map_err(labelled("Change Current User Password"))
    }
}

use crate::http::{decode, JsonClient, Method};
use crate::{BackendError, EndpointConfig};
use atrium_models::identity::{InvitationRequest, InvitationResponse, PasswordChange, UaaUser};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// User and invitation management. Every call acts with the caller's
/// own `Authorization` header.
pub trait UserManagementApi: Send + Sync {
    fn invite_user(&self, authorization: &str, email: &str)
        -> Result<InvitationResponse, BackendError>;
    fn resend_invitation(&self, authorization: &str, email: &str) -> Result<(), BackendError>;
    fn list_invitations(&self, authorization: &str) -> Result<Vec<String>, BackendError>;
    fn delete_invitation(&self, authorization: &str, email: &str) -> Result<(), BackendError>;
    fn list_users(&self, authorization: &str, org_id: &str) -> Result<Vec<UaaUser>, BackendError>;
    fn delete_user(&self, authorization: &str, org_id: &str, user_guid: &str)
        -> Result<(), BackendError>;
    fn change_password(
        &self,
        authorization: &str,
        change: &PasswordChange,
    ) -> Result<(), BackendError>;
}

pub struct HttpUserManagement {
    client: JsonClient,
}

impl HttpUserManagement {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: JsonClient::new(&config),
        }
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        authorization: &str,
        body: Option<&impl Serialize>,
        expected: u16,
    ) -> Result<T, BackendError> {
        let payload = body.map(serde_json::to_vec).transpose()?;
        let data = self.client.execute(
            method,
            &self.client.url(path),
            Some(authorization),
            "application/json",
            payload.as_deref(),
            expected,
        )?;
        decode(&data)
    }
}

const NO_BODY: Option<&()> = None;

impl UserManagementApi for HttpUserManagement {
    fn invite_user(
        &self,
        authorization: &str,
        email: &str,
    ) -> Result<InvitationResponse, BackendError> {
        let request = InvitationRequest {
            email: email.to_owned(),
        };
        self.call(
            Method::Post,
            "/rest/invitations",
            authorization,
            Some(&request),
            201,
        )
    }

    fn resend_invitation(&self, authorization: &str, email: &str) -> Result<(), BackendError> {
        self.call::<serde_json::Value>(
            Method::Post,
            &format!("/rest/invitations/{email}/resend"),
            authorization,
            NO_BODY,
            200,
        )
        .map(|_| ())
    }

    fn list_invitations(&self, authorization: &str) -> Result<Vec<String>, BackendError> {
        self.call(Method::Get, "/rest/invitations", authorization, NO_BODY, 200)
    }

    fn delete_invitation(&self, authorization: &str, email: &str) -> Result<(), BackendError> {
        self.call::<serde_json::Value>(
            Method::Delete,
            &format!("/rest/invitations/{email}"),
            authorization,
            NO_BODY,
            204,
        )
        .map(|_| ())
    }

    fn list_users(&self, authorization: &str, org_id: &str) -> Result<Vec<UaaUser>, BackendError> {
        self.call(
            Method::Get,
            &format!("/rest/orgs/{org_id}/users"),
            authorization,
            NO_BODY,
            200,
        )
    }

    fn delete_user(
        &self,
        authorization: &str,
        org_id: &str,
        user_guid: &str,
    ) -> Result<(), BackendError> {
        self.call::<serde_json::Value>(
            Method::Delete,
            &format!("/rest/orgs/{org_id}/users/{user_guid}"),
            authorization,
            NO_BODY,
            204,
        )
        .map(|_| ())
    }

    fn change_password(
        &self,
        authorization: &str,
        change: &PasswordChange,
    ) -> Result<(), BackendError> {
        self.call::<serde_json::Value>(
            Method::Put,
            "/rest/users/current/password",
            authorization,
            Some(change),
            200,
        )
        .map(|_| ())
    }
}

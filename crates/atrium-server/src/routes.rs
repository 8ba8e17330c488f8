//! Route table for the versioned API.
//!
//! Every route is served under each of [`API_PREFIXES`]. A path that parses
//! into an [`Endpoint`] but is called with a method the endpoint does not
//! accept is a 405, anything else is a 404.

use atrium_core::bindings::BindingEnd;
use tiny_http::Method;

pub const API_PREFIXES: &[&str] = &["/api/v1.0", "/api/v3.0", "/api/v1", "/api/v3"];

/// Strip a version prefix, returning the remaining route path.
pub fn strip_version_prefix(path: &str) -> Option<&str> {
    API_PREFIXES.iter().find_map(|prefix| {
        let rest = path.strip_prefix(prefix)?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    })
}

/// Who may call an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Stop,
    Start,
    Restart,
}

impl InstanceAction {
    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "stop" => Some(Self::Stop),
            "start" => Some(Self::Start),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Login,
    PlatformInfo,
    PlatformComponents,
    Offerings,
    OfferingsBinary,
    OfferingFromApplication,
    Offering(&'a str),
    Applications,
    Application(&'a str),
    ApplicationLogs(&'a str),
    ApplicationScale(&'a str),
    ApplicationAction(&'a str, InstanceAction),
    Services,
    Service(&'a str),
    ServiceLogs(&'a str),
    ServiceCredentials(&'a str),
    ServiceExpose(&'a str),
    ServiceAction(&'a str, InstanceAction),
    Bindings(BindingEnd),
    Unbind { dst: BindingEnd, src: BindingEnd },
    Users,
    Invitations,
    ResendInvitation,
    CurrentUserPassword,
    CliResource(&'a str),
}

fn binding_end(kind: &str, id: &str) -> Option<BindingEnd> {
    match kind {
        "applications" => Some(BindingEnd::Application(id.to_owned())),
        "services" => Some(BindingEnd::Service(id.to_owned())),
        _ => None,
    }
}

impl<'a> Endpoint<'a> {
    /// Parse a path with its version prefix already removed.
    pub fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&'a str> = path.trim_matches('/').split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        let endpoint = match *segments.as_slice() {
            ["login"] => Self::Login,
            ["platform_info"] => Self::PlatformInfo,
            ["platform_components"] => Self::PlatformComponents,
            ["offerings"] => Self::Offerings,
            ["offerings", "binary"] => Self::OfferingsBinary,
            ["offerings", "application"] => Self::OfferingFromApplication,
            ["offerings", id] => Self::Offering(id),
            ["applications"] => Self::Applications,
            ["applications", id] => Self::Application(id),
            ["applications", id, "logs"] => Self::ApplicationLogs(id),
            ["applications", id, "scale"] => Self::ApplicationScale(id),
            ["services"] => Self::Services,
            ["services", id] => Self::Service(id),
            ["services", id, "logs"] => Self::ServiceLogs(id),
            ["services", id, "credentials"] => Self::ServiceCredentials(id),
            ["services", id, "expose"] => Self::ServiceExpose(id),
            [kind, id, "bindings"] => Self::Bindings(binding_end(kind, id)?),
            ["applications", id, action] => {
                Self::ApplicationAction(id, InstanceAction::parse(action)?)
            }
            ["services", id, action] => Self::ServiceAction(id, InstanceAction::parse(action)?),
            [dst_kind, dst, "bindings", src_kind, src] => Self::Unbind {
                dst: binding_end(dst_kind, dst)?,
                src: binding_end(src_kind, src)?,
            },
            ["users"] => Self::Users,
            ["users", "invitations"] => Self::Invitations,
            ["users", "invitations", "resend"] => Self::ResendInvitation,
            ["users", "current", "password"] => Self::CurrentUserPassword,
            ["resources", "cli", id] => Self::CliResource(id),
            _ => return None,
        };
        Some(endpoint)
    }

    /// `binary` and `application` are reserved for POST only. Any other
    /// method addresses an offering with that id.
    #[must_use]
    pub fn for_method(self, method: &Method) -> Self {
        match self {
            Self::OfferingsBinary if *method != Method::Post => Self::Offering("binary"),
            Self::OfferingFromApplication if *method != Method::Post => {
                Self::Offering("application")
            }
            endpoint => endpoint,
        }
    }

    /// Required access for `method`, or `None` when the method is not allowed.
    pub fn access(&self, method: &Method) -> Option<Access> {
        use Method::{Delete, Get, Post, Put};
        let access = match (self, method) {
            (Self::Login, Get) => Access::Public,
            (Self::Offerings, Post)
            | (Self::OfferingsBinary, Post)
            | (Self::Offering(_), Delete)
            | (Self::Invitations, Post) => Access::Admin,
            (Self::PlatformInfo | Self::PlatformComponents, Get)
            | (Self::Offerings | Self::Offering(_), Get)
            | (Self::OfferingFromApplication, Post)
            | (Self::Applications | Self::Services, Get | Post)
            | (Self::Application(_) | Self::Service(_), Get | Delete)
            | (Self::ApplicationLogs(_) | Self::ServiceLogs(_) | Self::ServiceCredentials(_), Get)
            | (
                Self::ApplicationScale(_)
                | Self::ApplicationAction(..)
                | Self::ServiceAction(..)
                | Self::ServiceExpose(_),
                Put,
            )
            | (Self::Bindings(_), Get | Post)
            | (Self::Unbind { .. }, Delete)
            | (Self::Users | Self::Invitations, Get | Delete)
            | (Self::ResendInvitation, Post)
            | (Self::CurrentUserPassword, Put)
            | (Self::CliResource(_), Get) => Access::User,
            _ => return None,
        };
        Some(access)
    }
}

/// File served for a CLI resource id.
pub fn cli_resource_file(resource_id: &str) -> Option<&'static str> {
    match resource_id {
        "linux32" => Some("tap-linux32"),
        "linux64" => Some("tap-linux64"),
        "windows32" => Some("tap-windows32.exe"),
        "macosx64" => Some("tap-macosx64.osx"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_version_prefix_is_accepted() {
        for prefix in API_PREFIXES {
            assert_eq!(
                strip_version_prefix(&format!("{prefix}/offerings")),
                Some("/offerings")
            );
        }
        assert_eq!(strip_version_prefix("/api/v1.0/offerings"), Some("/offerings"));
        assert_eq!(strip_version_prefix("/api/v2/offerings"), None);
        assert_eq!(strip_version_prefix("/api/v10/offerings"), None);
    }

    #[test]
    fn reserved_offering_names_are_ids_for_other_methods() {
        let binary = Endpoint::parse("/offerings/binary").unwrap();
        assert_eq!(binary.clone().for_method(&Method::Post), Endpoint::OfferingsBinary);
        assert_eq!(binary.for_method(&Method::Get), Endpoint::Offering("binary"));
        let application = Endpoint::parse("/offerings/application").unwrap();
        assert_eq!(
            application.for_method(&Method::Delete),
            Endpoint::Offering("application")
        );
        assert_eq!(
            Endpoint::Offering("binary").access(&Method::Put),
            None
        );
    }

    #[test]
    fn static_offering_routes_win_over_ids() {
        assert_eq!(
            Endpoint::parse("/offerings/binary"),
            Some(Endpoint::OfferingsBinary)
        );
        assert_eq!(
            Endpoint::parse("/offerings/application"),
            Some(Endpoint::OfferingFromApplication)
        );
        assert_eq!(
            Endpoint::parse("/offerings/abc"),
            Some(Endpoint::Offering("abc"))
        );
    }

    #[test]
    fn binding_routes_carry_both_ends() {
        assert_eq!(
            Endpoint::parse("/applications/app-1/bindings/services/svc-1"),
            Some(Endpoint::Unbind {
                dst: BindingEnd::Application("app-1".to_owned()),
                src: BindingEnd::Service("svc-1".to_owned()),
            })
        );
        assert_eq!(
            Endpoint::parse("/services/svc-1/bindings"),
            Some(Endpoint::Bindings(BindingEnd::Service("svc-1".to_owned())))
        );
        assert_eq!(Endpoint::parse("/offerings/x/bindings"), None);
    }

    #[test]
    fn instance_actions() {
        assert_eq!(
            Endpoint::parse("/applications/a/restart"),
            Some(Endpoint::ApplicationAction("a", InstanceAction::Restart))
        );
        assert_eq!(
            Endpoint::parse("/services/s/stop"),
            Some(Endpoint::ServiceAction("s", InstanceAction::Stop))
        );
        assert_eq!(Endpoint::parse("/services/s/explode"), None);
    }

    #[test]
    fn unknown_or_empty_paths_do_not_parse() {
        assert_eq!(Endpoint::parse(""), None);
        assert_eq!(Endpoint::parse("/applications//logs"), None);
        assert_eq!(Endpoint::parse("/nothing"), None);
    }

    #[test]
    fn access_by_method() {
        assert_eq!(Endpoint::Offerings.access(&Method::Get), Some(Access::User));
        assert_eq!(Endpoint::Offerings.access(&Method::Post), Some(Access::Admin));
        assert_eq!(Endpoint::Offering("x").access(&Method::Delete), Some(Access::Admin));
        assert_eq!(Endpoint::Invitations.access(&Method::Post), Some(Access::Admin));
        assert_eq!(Endpoint::Invitations.access(&Method::Get), Some(Access::User));
        assert_eq!(Endpoint::Login.access(&Method::Get), Some(Access::Public));
        assert_eq!(Endpoint::Login.access(&Method::Post), None);
        assert_eq!(Endpoint::Application("a").access(&Method::Put), None);
    }

    #[test]
    fn cli_resources_map_to_files() {
        assert_eq!(cli_resource_file("windows32"), Some("tap-windows32.exe"));
        assert_eq!(cli_resource_file("macosx64"), Some("tap-macosx64.osx"));
        assert_eq!(cli_resource_file("solaris"), None);
    }
}

use std::fmt;

/// Remote error code reported when a route is already mapped to another application.
pub const INVALID_RELATION: &str = "1002";

/// Remote error code reported when the application is already bound to the service instance.
pub const SERVICE_BINDING_APP_SERVICE_TAKEN: &str = "90003";

pub type PushResult<T> = Result<T, PushError>;

/// Tagged outcome shared by every push component.
///
/// `NotFound` is frequently control flow (existence checks before writes) and
/// only becomes fatal when the caller decides so.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    RemoteConflict { message: String, hint: String },

    #[error("Server error, status code: {status}, error code: {code}, message: {message}")]
    RemoteFailure {
        status: u16,
        code: String,
        message: String,
    },

    #[error("{message}")]
    TransportFailure {
        message: String,
        hint: Option<String>,
    },

    #[error("Error processing app files in '{path}': {message}")]
    Files { path: String, message: String },
}

impl PushError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn remote(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteFailure {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn files(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Files {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// A bind rejected because the application already holds this service binding.
    pub fn is_already_bound(&self) -> bool {
        matches!(self, Self::RemoteFailure { code, .. } if code == SERVICE_BINDING_APP_SERVICE_TAKEN)
    }

    /// A route bind rejected because the URL belongs to someone else.
    pub fn is_route_taken(&self) -> bool {
        matches!(self, Self::RemoteFailure { status: 400, code, .. } if code == INVALID_RELATION)
    }

    /// Optional remediation line rendered under the failure.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::RemoteConflict { hint, .. } => Some(hint.as_str()),
            Self::TransportFailure { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    App,
    Domain,
    Route,
    ServiceInstance,
    Stack,
    Manifest,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::App => "App",
            ResourceKind::Domain => "Domain",
            ResourceKind::Route => "Route",
            ResourceKind::ServiceInstance => "Service instance",
            ResourceKind::Stack => "Stack",
            ResourceKind::Manifest => "Manifest",
        };
        f.write_str(label)
    }
}

use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::PushError;

/// A field that distinguishes "not mentioned" from "mentioned as empty".
///
/// `Cleared` is what the `default`/`null` sentinels resolve to: the remote
/// value is explicitly reset instead of inherited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Setting<T> {
    #[default]
    Unset,
    Cleared,
    Value(T),
}

impl<T> Setting<T> {
    pub fn is_set(&self) -> bool {
        !matches!(self, Setting::Unset)
    }

    /// Keeps `self` when it was mentioned, otherwise falls back to `other`.
    pub fn or(self, other: Setting<T>) -> Setting<T> {
        if self.is_set() {
            self
        } else {
            other
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Setting::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl Setting<String> {
    /// Interprets a raw string, mapping the `default`/`null` sentinels to `Cleared`.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "default" | "null" => Setting::Cleared,
            other => Setting::Value(other.to_string()),
        }
    }

    /// Payload form: `None` when unset, `Some("")` when cleared.
    pub fn to_param(&self) -> Option<String> {
        match self {
            Setting::Unset => None,
            Setting::Cleared => Some(String::new()),
            Setting::Value(value) => Some(value.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    Port,
    None,
    Http,
    Process,
}

impl HealthCheckType {
    pub fn allows_endpoint(&self) -> bool {
        !matches!(self, HealthCheckType::Port | HealthCheckType::None)
    }
}

impl FromStr for HealthCheckType {
    type Err = PushError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "port" => Ok(HealthCheckType::Port),
            "none" => Ok(HealthCheckType::None),
            "http" => Ok(HealthCheckType::Http),
            "process" => Ok(HealthCheckType::Process),
            other => Err(PushError::validation(format!(
                "Invalid health-check-type param: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for HealthCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = match self {
            HealthCheckType::Port => "port",
            HealthCheckType::None => "none",
            HealthCheckType::Http => "http",
            HealthCheckType::Process => "process",
        };
        f.write_str(raw)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppFlags {
    pub no_route: bool,
    pub no_hostname: bool,
    pub no_start: bool,
    pub random_route: bool,
    pub no_manifest: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteSpec {
    /// Empty means "default to the application name".
    pub hosts: Vec<String>,
    /// Empty means "resolve the organization's default domain at plan time".
    pub domains: Vec<String>,
    pub path: Option<String>,
    /// Request a random port on TCP-routed domains.
    pub random_port: bool,
}

impl RouteSpec {
    pub fn is_explicit(&self) -> bool {
        !self.hosts.is_empty() || !self.domains.is_empty() || self.path.is_some()
    }
}

/// Normalized per-application desired state produced by the manifest resolver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesiredAppState {
    pub name: String,
    /// Megabytes.
    pub memory: Option<u64>,
    /// Megabytes.
    pub disk_quota: Option<u64>,
    pub instances: Option<u32>,
    pub command: Setting<String>,
    pub buildpack: Setting<String>,
    pub docker_image: Option<String>,
    pub stack: Option<String>,
    pub health_check_type: Option<HealthCheckType>,
    pub health_check_http_endpoint: Option<String>,
    /// Seconds; drives both the health check timeout and the start timeout.
    pub timeout: Option<u32>,
    pub app_ports: Option<Vec<u16>>,
    pub env: Option<HashMap<String, String>>,
    pub services: Vec<String>,
    pub routes: RouteSpec,
    pub path: Option<PathBuf>,
    pub flags: AppFlags,
}

impl DesiredAppState {
    pub fn validate(&self) -> Result<(), PushError> {
        if self.buildpack.value().is_some() && self.docker_image.is_some() {
            return Err(PushError::validation(format!(
                "Application {} cannot use both a buildpack and a docker image",
                self.name
            )));
        }
        if let (Some(check), Some(_)) = (self.health_check_type, &self.health_check_http_endpoint)
        {
            if !check.allows_endpoint() {
                return Err(PushError::validation(format!(
                    "Health check type {} cannot be used with an http endpoint",
                    check
                )));
            }
        }
        Ok(())
    }

    /// Whether an application that already has routes must be re-planned.
    ///
    /// A random route only ever replaces a missing default route, so an
    /// application that already holds routes keeps them.
    pub fn route_changes_requested(&self) -> bool {
        !self.flags.random_route && (self.routes.is_explicit() || self.flags.no_hostname)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutingType {
    #[default]
    Http,
    Tcp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub guid: String,
    pub name: String,
    pub shared: bool,
    pub routing: RoutingType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub guid: String,
    pub host: String,
    pub domain: Domain,
    pub path: String,
    pub port: Option<u16>,
}

impl Route {
    pub fn url(&self) -> String {
        route_url(&self.host, &self.domain.name, &self.path, self.port)
    }
}

/// A planned route, identified remotely once it has been found or created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub host: String,
    pub domain: Domain,
    pub path: String,
    pub port: Option<u16>,
    pub random_port: bool,
    pub guid: Option<String>,
}

impl ResolvedRoute {
    pub fn url(&self) -> String {
        route_url(&self.host, &self.domain.name, &self.path, self.port)
    }
}

fn route_url(host: &str, domain: &str, path: &str, port: Option<u16>) -> String {
    let mut url = if host.is_empty() {
        domain.to_string()
    } else {
        format!("{}.{}", host, domain)
    };
    if let Some(port) = port {
        url.push_str(&format!(":{}", port));
    }
    if !path.is_empty() {
        url.push('/');
        url.push_str(path.trim_start_matches('/'));
    }
    url
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub guid: String,
    pub host: String,
    pub domain: Domain,
    pub path: String,
    pub port: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Stopped,
    Started,
}

/// Mirror of the remote application record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteApplication {
    pub guid: String,
    pub name: String,
    pub state: AppState,
    pub instances: u32,
    pub routes: Vec<RouteSummary>,
    pub env: HashMap<String, String>,
}

/// Create/update payload. `None` fields are left out so the remote keeps its value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_quota: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buildpack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_type: Option<HealthCheckType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_http_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_ports: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub guid: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub guid: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: String,
    pub digest: String,
    pub mode: u32,
    pub size: u64,
}

/// Bits to transfer for one push attempt. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPlan {
    entries: Vec<FileDescriptor>,
}

impl UploadPlan {
    pub fn new(mut entries: Vec<FileDescriptor>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Self { entries }
    }

    pub fn entries(&self) -> &[FileDescriptor] {
        &self.entries
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|entry| entry.size).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Archive {
    pub bytes: bytes::Bytes,
    pub file_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
    pub files: usize,
}

/// One `applications` entry, or the global defaults, as read from a manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestApp {
    pub name: Option<String>,
    pub memory: Option<String>,
    pub disk_quota: Option<String>,
    pub instances: Option<u32>,
    pub command: Setting<String>,
    pub buildpack: Setting<String>,
    pub docker_image: Option<String>,
    pub stack: Option<String>,
    pub health_check_type: Option<String>,
    pub health_check_http_endpoint: Option<String>,
    pub timeout: Option<u32>,
    pub env: Option<HashMap<String, String>>,
    pub services: Vec<String>,
    pub hosts: Vec<String>,
    pub domains: Vec<String>,
    pub route_path: Option<String>,
    pub path: Option<PathBuf>,
    pub no_route: Option<bool>,
    pub no_hostname: Option<bool>,
    pub random_route: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Location the manifest was read from, used to anchor relative app paths.
    pub path: Option<PathBuf>,
    pub defaults: ManifestApp,
    pub applications: Vec<ManifestApp>,
}

/// Raw CLI overrides. Values stay textual so they are validated with the manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushFlags {
    pub app_name: Option<String>,
    pub buildpack: Option<String>,
    pub command: Option<String>,
    pub docker_image: Option<String>,
    pub domain: Option<String>,
    pub manifest_path: Option<PathBuf>,
    pub health_check_type: Option<String>,
    pub hostname: Option<String>,
    pub instances: Option<String>,
    pub disk_quota: Option<String>,
    pub memory: Option<String>,
    pub path: Option<PathBuf>,
    pub route_path: Option<String>,
    pub stack: Option<String>,
    pub timeout: Option<String>,
    pub app_ports: Option<String>,
    pub no_hostname: bool,
    pub no_manifest: bool,
    pub no_route: bool,
    pub no_start: bool,
    pub random_route: bool,
}

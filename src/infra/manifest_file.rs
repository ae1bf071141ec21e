use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Deserializer};

use crate::{
    domain::{
        model::{Manifest, ManifestApp, Setting},
        port::ManifestReader,
    },
    error::{PushError, PushResult, ResourceKind},
};

/// File names looked up, in order, when the manifest location is a directory.
pub const MANIFEST_FILE_NAMES: [&str; 2] = ["manifest.yml", "manifest.yaml"];

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlManifestReader;

impl ManifestReader for YamlManifestReader {
    fn read(&self, path: &Path) -> PushResult<Manifest> {
        let file = locate(path)?;
        debug!("Reading manifest {}", file.display());
        let content = fs::read_to_string(&file).map_err(manifest_error)?;
        parse(&content, file)
    }
}

fn locate(path: &Path) -> PushResult<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        if let Some(found) = MANIFEST_FILE_NAMES
            .iter()
            .map(|name| path.join(name))
            .find(|candidate| candidate.is_file())
        {
            return Ok(found);
        }
    }
    Err(PushError::not_found(
        ResourceKind::Manifest,
        path.display().to_string(),
    ))
}

fn manifest_error(error: impl std::fmt::Display) -> PushError {
    PushError::validation(format!("Error reading manifest file: {}", error))
}

pub fn parse(content: &str, location: PathBuf) -> PushResult<Manifest> {
    if content.trim().is_empty() {
        return Ok(Manifest {
            path: Some(location),
            ..Default::default()
        });
    }
    let document: serde_yaml_ng::Value = serde_yaml_ng::from_str(content).map_err(manifest_error)?;
    if !document.is_mapping() {
        return Err(manifest_error("expected a mapping at the top level"));
    }
    let applications: RawApplications =
        serde_yaml_ng::from_value(document.clone()).map_err(manifest_error)?;
    // Top-level keys other than `applications` are defaults for every entry.
    let defaults: RawApp = serde_yaml_ng::from_value(document).map_err(manifest_error)?;

    Ok(Manifest {
        path: Some(location),
        defaults: defaults.into(),
        applications: applications
            .applications
            .into_iter()
            .map(ManifestApp::from)
            .collect(),
    })
}

#[derive(Deserialize, Default)]
struct RawApplications {
    #[serde(default)]
    applications: Vec<RawApp>,
}

#[derive(Deserialize, Default)]
struct RawApp {
    name: Option<String>,
    memory: Option<Scalar>,
    disk_quota: Option<Scalar>,
    instances: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    command: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    buildpack: Option<Option<String>>,
    docker: Option<RawDocker>,
    stack: Option<String>,
    #[serde(rename = "health-check-type")]
    health_check_type: Option<String>,
    #[serde(rename = "health-check-http-endpoint")]
    health_check_http_endpoint: Option<String>,
    timeout: Option<u32>,
    env: Option<HashMap<String, Scalar>>,
    #[serde(default)]
    services: Vec<String>,
    host: Option<String>,
    #[serde(default)]
    hosts: Vec<String>,
    domain: Option<String>,
    #[serde(default)]
    domains: Vec<String>,
    #[serde(rename = "route-path")]
    route_path: Option<String>,
    path: Option<PathBuf>,
    #[serde(rename = "no-route")]
    no_route: Option<bool>,
    #[serde(rename = "no-hostname")]
    no_hostname: Option<bool>,
    #[serde(rename = "random-route")]
    random_route: Option<bool>,
}

#[derive(Deserialize)]
struct RawDocker {
    image: Option<String>,
}

/// Present-but-null becomes `Some(None)`, absent stays `None` through `default`.
fn deserialize_some<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(text) => text,
            Scalar::Integer(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Flag(value) => value.to_string(),
        }
    }
}

fn setting(raw: Option<Option<String>>) -> Setting<String> {
    match raw {
        None => Setting::Unset,
        Some(None) => Setting::Cleared,
        Some(Some(value)) => Setting::from_raw(&value),
    }
}

fn single_and_many(single: Option<String>, many: Vec<String>) -> Vec<String> {
    single.into_iter().chain(many).collect()
}

impl From<RawApp> for ManifestApp {
    fn from(raw: RawApp) -> Self {
        ManifestApp {
            name: raw.name,
            memory: raw.memory.map(String::from),
            disk_quota: raw.disk_quota.map(String::from),
            instances: raw.instances,
            command: setting(raw.command),
            buildpack: setting(raw.buildpack),
            docker_image: raw.docker.and_then(|docker| docker.image),
            stack: raw.stack,
            health_check_type: raw.health_check_type,
            health_check_http_endpoint: raw.health_check_http_endpoint,
            timeout: raw.timeout,
            env: raw.env.map(|env| {
                env.into_iter()
                    .map(|(key, value)| (key, String::from(value)))
                    .collect()
            }),
            services: raw.services,
            hosts: single_and_many(raw.host, raw.hosts),
            domains: single_and_many(raw.domain, raw.domains),
            route_path: raw.route_path,
            path: raw.path,
            no_route: raw.no_route,
            no_hostname: raw.no_hostname,
            random_route: raw.random_route,
        }
    }
}

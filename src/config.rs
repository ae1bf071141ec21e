use anyhow::{Context, Error};
use config::{builder::DefaultState, Config, ConfigBuilder};
use semver::Version;

use crate::domain::{model::RoutingType, reconciler::Target};

#[derive(Debug, Default, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub target: TargetConfig,
    pub platform: PlatformConfig,
}

/// Where pushes land and who performs them.
#[derive(Debug, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    pub api_version: String,
    pub org: String,
    pub org_guid: String,
    pub space: String,
    pub space_guid: String,
    pub user: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            api_version: "2.75.0".to_string(),
            org: "my-org".to_string(),
            org_guid: "my-org-guid".to_string(),
            space: "development".to_string(),
            space_guid: "development-guid".to_string(),
            user: "developer".to_string(),
        }
    }
}

/// Resources the sandbox platform starts with.
#[derive(Debug, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformConfig {
    pub domains: Vec<DomainConfig>,
    pub services: Vec<String>,
    pub stacks: Vec<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            domains: vec![DomainConfig {
                name: "apps.cleverpush.local".to_string(),
                shared: true,
                routing: RoutingType::Http,
            }],
            services: vec![],
            stacks: vec!["cflinuxfs4".to_string()],
        }
    }
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
pub struct DomainConfig {
    pub name: String,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub routing: RoutingType,
}

impl AppConfig {
    pub fn target(&self) -> Target {
        Target {
            org_guid: self.target.org_guid.clone(),
            org_name: self.target.org.clone(),
            space_guid: self.target.space_guid.clone(),
            space_name: self.target.space.clone(),
            user: self.target.user.clone(),
        }
    }

    pub fn api_version(&self) -> Result<Version, Error> {
        Version::parse(&self.target.api_version)
            .with_context(|| format!("Invalid target api_version {}", self.target.api_version))
    }
}

/// Optional `cleverpush.{toml,yaml,json}` in the working directory, then
/// `CLEVERPUSH_*` variables, `__` separating nested keys.
pub fn load_config() -> Result<AppConfig, Error> {
    from_builder(
        Config::builder()
            .add_source(config::File::with_name("cleverpush").required(false))
            .add_source(config::Environment::with_prefix("cleverpush").separator("__")),
    )
}

fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig, Error> {
    let config = builder.build().context("Can't load configuration")?;

    config
        .try_deserialize()
        .context("Can't deserialize AppConfig from loaded configuration")
}

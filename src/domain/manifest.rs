//! Merges manifest entries, manifest globals and CLI flags into desired states.
//!
//! Precedence is evaluated per field: a flag beats the manifest entry, which
//! beats the manifest's top-level defaults. Nothing is filled with zero values,
//! unmentioned fields stay `None`/`Unset` so updates leave remote values alone.

use std::{collections::HashMap, path::PathBuf};

use itertools::Itertools;
use log::debug;

use super::model::{
    AppFlags, DesiredAppState, HealthCheckType, Manifest, ManifestApp, PushFlags, RouteSpec,
    Setting,
};
use crate::error::{PushError, PushResult, ResourceKind};

const MISSING_NAME: &str =
    "Manifest file is not found in the current directory, please provide either an app name or manifest";

/// Produces the ordered list of applications this push has to converge.
pub fn resolve(manifest: Option<&Manifest>, flags: &PushFlags) -> PushResult<Vec<DesiredAppState>> {
    let defaults = manifest.map(|m| m.defaults.clone()).unwrap_or_default();
    let entries = select_entries(manifest, flags)?;
    let base_dir = manifest
        .and_then(|m| m.path.as_ref())
        .and_then(|path| path.parent())
        .map(|dir| dir.to_path_buf());

    entries
        .iter()
        .map(|entry| {
            let state = merge(entry, &defaults, flags, base_dir.as_ref(), manifest.is_some())?;
            state.validate()?;
            debug!("Resolved desired state for {}", state.name);
            Ok(state)
        })
        .collect()
}

fn select_entries(manifest: Option<&Manifest>, flags: &PushFlags) -> PushResult<Vec<ManifestApp>> {
    let applications = match manifest {
        Some(manifest) if !manifest.applications.is_empty() => &manifest.applications,
        _ => return Ok(vec![ManifestApp::default()]),
    };
    match flags.app_name {
        None => Ok(applications.clone()),
        Some(ref name) => {
            if let Some(entry) = applications
                .iter()
                .find(|entry| entry.name.as_deref() == Some(name.as_str()))
            {
                Ok(vec![entry.clone()])
            } else if applications.len() == 1 {
                // Single-entry manifest: the CLI name is just another field override.
                Ok(applications.clone())
            } else {
                Err(PushError::not_found(ResourceKind::App, name.clone()))
            }
        }
    }
}

fn merge(
    entry: &ManifestApp,
    defaults: &ManifestApp,
    flags: &PushFlags,
    base_dir: Option<&PathBuf>,
    has_manifest: bool,
) -> PushResult<DesiredAppState> {
    let name = flags
        .app_name
        .clone()
        .or_else(|| entry.name.clone())
        .or_else(|| defaults.name.clone())
        .ok_or_else(|| {
            if has_manifest {
                PushError::validation("Error: App name is a required field")
            } else {
                PushError::validation(MISSING_NAME)
            }
        })?;

    let memory = pick(&flags.memory, &entry.memory, &defaults.memory)
        .map(|raw| {
            parse_megabytes(&raw)
                .ok_or_else(|| PushError::validation(format!("Invalid memory limit: {}", raw)))
        })
        .transpose()?;
    let disk_quota = pick(&flags.disk_quota, &entry.disk_quota, &defaults.disk_quota)
        .map(|raw| {
            parse_megabytes(&raw)
                .ok_or_else(|| PushError::validation(format!("Invalid disk quota: {}", raw)))
        })
        .transpose()?;

    let instances = match flags.instances {
        Some(ref raw) => Some(raw.trim().parse::<u32>().map_err(|_| {
            PushError::validation(format!("Invalid instance count: {}", raw))
        })?),
        None => entry.instances.or(defaults.instances),
    };

    let timeout = match flags.timeout {
        Some(ref raw) => Some(raw.trim().parse::<u32>().map_err(|_| {
            PushError::validation(format!("Invalid timeout param: {}", raw))
        })?),
        None => entry.timeout.or(defaults.timeout),
    };

    let health_check_type = pick(
        &flags.health_check_type,
        &entry.health_check_type,
        &defaults.health_check_type,
    )
    .map(|raw| raw.parse::<HealthCheckType>())
    .transpose()?;

    let command = flag_setting(&flags.command)
        .or(entry.command.clone())
        .or(defaults.command.clone());
    let buildpack = flag_setting(&flags.buildpack)
        .or(entry.buildpack.clone())
        .or(defaults.buildpack.clone());

    let app_ports = flags.app_ports.as_deref().map(parse_app_ports).transpose()?;

    let hosts = match flags.hostname {
        Some(ref host) => vec![host.clone()],
        None => first_non_empty(&entry.hosts, &defaults.hosts),
    };
    let domains = match flags.domain {
        Some(ref domain) => vec![domain.clone()],
        None => first_non_empty(&entry.domains, &defaults.domains),
    };

    let random_route = flags.random_route || entry.random_route.or(defaults.random_route).unwrap_or(false);
    let app_flags = AppFlags {
        no_route: flags.no_route || entry.no_route.or(defaults.no_route).unwrap_or(false),
        no_hostname: flags.no_hostname
            || entry.no_hostname.or(defaults.no_hostname).unwrap_or(false),
        no_start: flags.no_start,
        random_route,
        no_manifest: flags.no_manifest,
    };

    let path = flags.path.clone().or_else(|| {
        entry
            .path
            .clone()
            .or_else(|| defaults.path.clone())
            .map(|path| match base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            })
    });

    Ok(DesiredAppState {
        name,
        memory,
        disk_quota,
        instances,
        command,
        buildpack,
        docker_image: pick(&flags.docker_image, &entry.docker_image, &defaults.docker_image),
        stack: pick(&flags.stack, &entry.stack, &defaults.stack),
        health_check_type,
        health_check_http_endpoint: entry
            .health_check_http_endpoint
            .clone()
            .or_else(|| defaults.health_check_http_endpoint.clone()),
        timeout,
        app_ports,
        env: merge_manifest_env(&defaults.env, &entry.env),
        services: entry
            .services
            .iter()
            .chain(defaults.services.iter())
            .unique()
            .cloned()
            .collect(),
        routes: RouteSpec {
            hosts,
            domains,
            path: pick(&flags.route_path, &entry.route_path, &defaults.route_path),
            random_port: random_route,
        },
        path,
        flags: app_flags,
    })
}

fn pick<T: Clone>(flag: &Option<T>, entry: &Option<T>, global: &Option<T>) -> Option<T> {
    flag.clone().or_else(|| entry.clone()).or_else(|| global.clone())
}

fn flag_setting(flag: &Option<String>) -> Setting<String> {
    flag.as_deref().map(Setting::from_raw).unwrap_or_default()
}

fn first_non_empty(entry: &[String], global: &[String]) -> Vec<String> {
    if entry.is_empty() {
        global.to_vec()
    } else {
        entry.to_vec()
    }
}

fn merge_manifest_env(
    global: &Option<HashMap<String, String>>,
    entry: &Option<HashMap<String, String>>,
) -> Option<HashMap<String, String>> {
    match (global, entry) {
        (None, None) => None,
        _ => {
            let mut env = global.clone().unwrap_or_default();
            env.extend(entry.clone().unwrap_or_default());
            Some(env)
        }
    }
}

/// Adds desired keys on top of the remote environment; desired values win on collision.
pub fn merge_environment(
    remote: &HashMap<String, String>,
    desired: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env = remote.clone();
    env.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Parses `512`, `512M`, `512MB`, `1G` or `1GB` into megabytes.
pub fn parse_megabytes(raw: &str) -> Option<u64> {
    let upper = raw.trim().to_ascii_uppercase();
    let (digits, factor) = if let Some(value) = upper.strip_suffix("GB").or_else(|| upper.strip_suffix('G')) {
        (value, 1024)
    } else if let Some(value) = upper.strip_suffix("MB").or_else(|| upper.strip_suffix('M')) {
        (value, 1)
    } else {
        (upper.as_str(), 1)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().and_then(|value| value.checked_mul(factor))
}

fn parse_app_ports(raw: &str) -> PushResult<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .map(|port| {
            port.parse::<u16>().map_err(|_| {
                PushError::validation(format!(
                    "Invalid app port: {}\nApp port must be a number",
                    port
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use map_macro::hash_map;

    use super::*;

    fn entry(name: &str) -> ManifestApp {
        ManifestApp {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn manifest(applications: Vec<ManifestApp>) -> Manifest {
        Manifest {
            path: Some(PathBuf::from("/work/manifest.yml")),
            defaults: ManifestApp::default(),
            applications,
        }
    }

    fn named(name: &str) -> PushFlags {
        PushFlags {
            app_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn fields_merge_independently() {
        let mut app = entry("manifest-app");
        app.memory = Some("128MB".to_string());
        app.instances = Some(1);
        let manifest = manifest(vec![app]);
        let flags = PushFlags {
            instances: Some("3".to_string()),
            ..Default::default()
        };

        let states = resolve(Some(&manifest), &flags).unwrap();

        assert_eq!(states.len(), 1);
        assert_eq!(states[0].memory, Some(128));
        assert_eq!(states[0].instances, Some(3));
        assert_eq!(states[0].disk_quota, None);
    }

    #[test]
    fn globals_fill_gaps_only() {
        let mut m = manifest(vec![entry("app1"), {
            let mut app2 = entry("app2");
            app2.stack = Some("own-stack".to_string());
            app2
        }]);
        m.defaults.stack = Some("global-stack".to_string());
        m.defaults.services = vec!["global-service".to_string()];

        let states = resolve(Some(&m), &PushFlags::default()).unwrap();

        assert_eq!(states[0].stack.as_deref(), Some("global-stack"));
        assert_eq!(states[1].stack.as_deref(), Some("own-stack"));
        assert_eq!(states[1].services, vec!["global-service".to_string()]);
    }

    #[test]
    fn services_keep_entry_order_then_globals_without_duplicates() {
        let mut app = entry("app1");
        app.services = vec!["app1-service".to_string(), "global-service".to_string()];
        let mut m = manifest(vec![app]);
        m.defaults.services = vec!["global-service".to_string(), "other".to_string()];

        let states = resolve(Some(&m), &PushFlags::default()).unwrap();

        assert_eq!(states[0].services, vec!["app1-service", "global-service", "other"]);
    }

    #[test]
    fn target_name_selects_single_entry() {
        let m = manifest(vec![entry("app1"), entry("app2")]);

        let states = resolve(Some(&m), &named("app2")).unwrap();

        assert_eq!(states.len(), 1);
        assert_eq!(states[0].name, "app2");
    }

    #[test]
    fn unknown_target_in_multi_app_manifest_is_not_found() {
        let m = manifest(vec![entry("app1"), entry("app2")]);

        let error = resolve(Some(&m), &named("non-existant-app")).unwrap_err();

        assert!(error.is_not_found());
    }

    #[test]
    fn cli_name_overrides_single_entry() {
        let mut app = entry("manifest-app-name");
        app.env = Some(hash_map! { "FOO".to_string() => "baz".to_string() });
        let m = manifest(vec![app]);

        let states = resolve(Some(&m), &named("existing-app")).unwrap();

        assert_eq!(states[0].name, "existing-app");
        assert_eq!(states[0].env.as_ref().unwrap()["FOO"], "baz");
    }

    #[test]
    fn missing_manifest_and_name_fails() {
        let error = resolve(None, &PushFlags::default()).unwrap_err();
        assert_eq!(error, PushError::validation(MISSING_NAME));
    }

    #[test]
    fn no_manifest_mode_uses_cli_name() {
        let states = resolve(None, &named("app-name")).unwrap();
        assert_eq!(states[0].name, "app-name");
        assert_eq!(states[0].command, Setting::Unset);
    }

    #[test]
    fn sentinel_flags_clear_manifest_values() {
        let mut app = entry("app");
        app.buildpack = Setting::Value("some-buildpack".to_string());
        let m = manifest(vec![app]);
        let flags = PushFlags {
            buildpack: Some("default".to_string()),
            command: Some("null".to_string()),
            ..Default::default()
        };

        let states = resolve(Some(&m), &flags).unwrap();

        assert_eq!(states[0].buildpack, Setting::Cleared);
        assert_eq!(states[0].command, Setting::Cleared);
    }

    #[test]
    fn domain_flag_replaces_manifest_domains() {
        let mut app = entry("app");
        app.domains = vec!["example1.com".to_string(), "example2.com".to_string()];
        app.hosts = vec!["manifest-host".to_string()];
        let m = manifest(vec![app]);
        let flags = PushFlags {
            domain: Some("example1.com".to_string()),
            ..Default::default()
        };

        let states = resolve(Some(&m), &flags).unwrap();

        assert_eq!(states[0].routes.domains, vec!["example1.com"]);
        assert_eq!(states[0].routes.hosts, vec!["manifest-host"]);
    }

    #[test]
    fn bad_quantities_are_validation_errors() {
        let flags = PushFlags {
            memory: Some("abcM".to_string()),
            ..named("app")
        };
        assert_eq!(
            resolve(None, &flags).unwrap_err(),
            PushError::validation("Invalid memory limit: abcM")
        );

        let flags = PushFlags {
            timeout: Some("FooeyTimeout".to_string()),
            ..named("app")
        };
        assert_eq!(
            resolve(None, &flags).unwrap_err(),
            PushError::validation("Invalid timeout param: FooeyTimeout")
        );

        let flags = PushFlags {
            health_check_type: Some("bad-value".to_string()),
            ..named("app")
        };
        assert_eq!(
            resolve(None, &flags).unwrap_err(),
            PushError::validation("Invalid health-check-type param: bad-value")
        );
    }

    #[test]
    fn app_ports_must_be_numbers() {
        let flags = PushFlags {
            app_ports: Some("8080,abc".to_string()),
            ..named("app")
        };
        let error = resolve(None, &flags).unwrap_err();
        assert!(error.to_string().contains("Invalid app port: abc"));

        let flags = PushFlags {
            app_ports: Some("8080,9000".to_string()),
            ..named("app")
        };
        assert_eq!(resolve(None, &flags).unwrap()[0].app_ports, Some(vec![8080, 9000]));
    }

    #[test]
    fn megabyte_parsing() {
        assert_eq!(parse_megabytes("128MB"), Some(128));
        assert_eq!(parse_megabytes("2G"), Some(2048));
        assert_eq!(parse_megabytes("4gb"), Some(4096));
        assert_eq!(parse_megabytes("512"), Some(512));
        assert_eq!(parse_megabytes("abcM"), None);
        assert_eq!(parse_megabytes("M"), None);
    }

    #[test]
    fn manifest_path_is_relative_to_manifest_file() {
        let mut app = entry("app");
        app.path = Some(PathBuf::from("some/path"));
        let m = manifest(vec![app]);

        let states = resolve(Some(&m), &PushFlags::default()).unwrap();

        assert_eq!(states[0].path.as_deref(), Some(Path::new("/work/some/path")));
    }

    #[test]
    fn remote_env_is_kept_and_manifest_wins_on_collision() {
        let remote = hash_map! {
            "crazy".to_string() => "pants".to_string(),
            "FOO".to_string() => "NotYoBaz".to_string(),
        };
        let desired = hash_map! {
            "FOO".to_string() => "baz".to_string(),
            "PATH".to_string() => "/u/apps/my-app/bin".to_string(),
        };

        let env = merge_environment(&remote, &desired);

        assert_eq!(env["crazy"], "pants");
        assert_eq!(env["FOO"], "baz");
        assert_eq!(env["PATH"], "/u/apps/my-app/bin");
    }
}

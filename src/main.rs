use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::Parser;
use cleverpush::{
    config::load_config,
    domain::{self, model::PushFlags, PushRequest, PushService},
    infra::{
        files::{FsAppFiles, TarGzPackager},
        manifest_file::YamlManifestReader,
        memory::InMemoryPlatform,
        terminal::TerminalUi,
        words::RandomWords,
    },
};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "cleverpush")]
#[command(author, version, about = "Push applications to a platform from a manifest and flags", long_about = None)]
struct Cli {
    /// Application to push; required without a manifest
    app_name: Option<String>,

    #[arg(short = 'b', long)]
    buildpack: Option<String>,

    /// Startup command, `null` or `default` resets it
    #[arg(short = 'c', long)]
    command: Option<String>,

    #[arg(short = 'd', long)]
    domain: Option<String>,

    #[arg(short = 'f', long = "manifest", value_name = "PATH")]
    manifest_path: Option<PathBuf>,

    #[arg(short = 'u', long = "health-check-type")]
    health_check_type: Option<String>,

    #[arg(short = 'n', long)]
    hostname: Option<String>,

    #[arg(short = 'i', long)]
    instances: Option<String>,

    #[arg(short = 'k', long = "disk")]
    disk_quota: Option<String>,

    #[arg(short = 'm', long)]
    memory: Option<String>,

    #[arg(short = 'o', long = "docker-image")]
    docker_image: Option<String>,

    #[arg(short = 'p', long)]
    path: Option<PathBuf>,

    #[arg(long)]
    route_path: Option<String>,

    #[arg(short = 's', long)]
    stack: Option<String>,

    /// Seconds to wait for the first instance to start
    #[arg(short = 't', long)]
    timeout: Option<String>,

    /// Comma separated list of ports the application listens on
    #[arg(long)]
    app_ports: Option<String>,

    #[arg(long)]
    no_hostname: bool,

    #[arg(long)]
    no_manifest: bool,

    #[arg(long)]
    no_route: bool,

    #[arg(long)]
    no_start: bool,

    #[arg(long)]
    random_route: bool,
}

impl From<Cli> for PushFlags {
    fn from(cli: Cli) -> Self {
        PushFlags {
            app_name: cli.app_name,
            buildpack: cli.buildpack,
            command: cli.command,
            docker_image: cli.docker_image,
            domain: cli.domain,
            manifest_path: cli.manifest_path,
            health_check_type: cli.health_check_type,
            hostname: cli.hostname,
            instances: cli.instances,
            disk_quota: cli.disk_quota,
            memory: cli.memory,
            path: cli.path,
            route_path: cli.route_path,
            stack: cli.stack,
            timeout: cli.timeout,
            app_ports: cli.app_ports,
            no_hostname: cli.no_hostname,
            no_manifest: cli.no_manifest,
            no_route: cli.no_route,
            no_start: cli.no_start,
            random_route: cli.random_route,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    let config = load_config()?;
    info!("Loaded config {:?}", config);
    let platform = Arc::new(InMemoryPlatform::from_config(&config.platform));

    let service = PushService {
        applications: platform.clone(),
        domains: platform.clone(),
        routes: platform.clone(),
        service_instances: platform.clone(),
        service_binder: platform.clone(),
        stacks: platform.clone(),
        lifecycle: platform.clone(),
        uploader: platform,
        app_files: Arc::new(FsAppFiles),
        packager: Arc::new(TarGzPackager),
        manifests: Arc::new(YamlManifestReader),
        words: Arc::new(RandomWords),
        ui: Arc::new(TerminalUi),
        target: config.target(),
        api_version: config.api_version()?,
    };

    let request = PushRequest {
        flags: cli.into(),
        working_dir: std::env::current_dir().context("Can't resolve working directory")?,
    };

    match domain::push(&service, request).await {
        Ok(report) if report.is_success() => Ok(ExitCode::SUCCESS),
        Ok(report) => {
            info!("{} application(s) failed to push", report.failures().count());
            Ok(ExitCode::FAILURE)
        }
        Err(error) => {
            service.ui.failed(&error.to_string());
            if let Some(hint) = error.hint() {
                service.ui.say(hint);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, error, info};
use semver::Version;

use crate::error::{PushError, PushResult};
use bits::{BitsTransferManager, TransferOutcome};
use lifecycle::LifecycleController;
use model::{DesiredAppState, Manifest, PushFlags};
use port::{
    AppFiles, ApplicationLifecycle, ApplicationRepository, BitsUploader, DomainRepository,
    ManifestReader, Packager, RouteRepository, ServiceBinder, ServiceRepository, StackRepository,
    Ui, WordGenerator,
};
use reconciler::{ApplicationReconciler, Target};
use route_binder::RouteBinder;
use route_planner::{DomainCache, RoutePlanner};
use services::ServiceBindingManager;

pub mod bits;
pub mod lifecycle;
pub mod manifest;
pub mod model;
pub mod port;
pub mod reconciler;
pub mod route_binder;
pub mod route_planner;
pub mod services;

/// Lowest remote API versions accepting route paths and app ports.
pub const ROUTE_PATH_MIN_API_VERSION: Version = Version::new(2, 36, 0);
pub const APP_PORTS_MIN_API_VERSION: Version = Version::new(2, 51, 0);

/// Every collaborator a push needs, passed in explicitly.
pub struct PushService {
    pub applications: Arc<dyn ApplicationRepository>,
    pub domains: Arc<dyn DomainRepository>,
    pub routes: Arc<dyn RouteRepository>,
    pub service_instances: Arc<dyn ServiceRepository>,
    pub service_binder: Arc<dyn ServiceBinder>,
    pub stacks: Arc<dyn StackRepository>,
    pub lifecycle: Arc<dyn ApplicationLifecycle>,
    pub uploader: Arc<dyn BitsUploader>,
    pub app_files: Arc<dyn AppFiles>,
    pub packager: Arc<dyn Packager>,
    pub manifests: Arc<dyn ManifestReader>,
    pub words: Arc<dyn WordGenerator>,
    pub ui: Arc<dyn Ui>,
    pub target: Target,
    pub api_version: Version,
}

pub struct PushRequest {
    pub flags: PushFlags,
    /// Default location for both the manifest and the application bits.
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSummary {
    pub guid: String,
    pub routes: Vec<String>,
    pub transfer: TransferOutcome,
    pub stopped: bool,
    pub started: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOutcome {
    pub name: String,
    pub result: PushResult<AppSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub outcomes: Vec<AppOutcome>,
}

impl PushReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &AppOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }
}

/// Pushes every resolved application in manifest order.
///
/// Errors returned directly happen before any application is touched (manifest,
/// flag validation, API version). Per-application failures are recorded in the
/// report and never stop the following applications.
pub async fn push(service: &PushService, request: PushRequest) -> PushResult<PushReport> {
    let manifest = load_manifest(service, &request)?;
    let desired = manifest::resolve(manifest.as_ref(), &request.flags)?;
    check_api_version(&service.api_version, &desired)?;

    let cache = DomainCache::new(service.target.org_guid.clone());
    let mut report = PushReport::default();
    for app in desired {
        let result = push_app(service, &cache, &app, &request.working_dir).await;
        match result {
            Ok(ref summary) => info!("Pushed {} ({})", app.name, summary.guid),
            Err(ref push_error) => {
                error!("Push of {} failed: {:?}", app.name, push_error);
                service.ui.failed(&format!("{}: {}", app.name, push_error));
                if let Some(hint) = push_error.hint() {
                    service.ui.say(hint);
                }
            }
        }
        report.outcomes.push(AppOutcome {
            name: app.name.clone(),
            result,
        });
    }
    Ok(report)
}

async fn push_app(
    service: &PushService,
    cache: &DomainCache,
    app: &DesiredAppState,
    working_dir: &Path,
) -> PushResult<AppSummary> {
    let ui = service.ui.as_ref();
    let reconciler = ApplicationReconciler::new(
        service.applications.as_ref(),
        service.stacks.as_ref(),
        ui,
        &service.target,
    );
    let lifecycle = LifecycleController::new(service.lifecycle.as_ref(), ui, &service.target);
    let binder = RouteBinder::new(service.routes.as_ref(), ui);

    let existing = reconciler.find_existing(&app.name).await?;
    let stopped = lifecycle.stop_if_started(existing.as_ref()).await?;
    let application = reconciler.reconcile(app, existing.as_ref()).await?;

    let routes = if app.flags.no_route {
        ui.say(&format!("App {} is a worker, skipping route creation", app.name));
        if existing.is_some() {
            binder.unbind_all(&application).await?;
        }
        vec![]
    } else if existing.is_none() || application.routes.is_empty() || app.route_changes_requested() {
        let planner = RoutePlanner::new(service.domains.as_ref(), service.words.as_ref(), cache);
        let planned = planner.plan(app).await?;
        binder
            .bind_all(planned, &application)
            .await?
            .iter()
            .map(|route| route.url())
            .collect()
    } else {
        debug!("{} keeps its {} existing routes", app.name, application.routes.len());
        vec![]
    };

    let dir = app.path.clone().unwrap_or_else(|| working_dir.to_path_buf());
    let transfer = BitsTransferManager::new(
        service.app_files.as_ref(),
        service.packager.as_ref(),
        service.uploader.as_ref(),
        ui,
    )
    .transfer(app, &application, &dir)
    .await?;

    ServiceBindingManager::new(
        service.service_instances.as_ref(),
        service.service_binder.as_ref(),
        ui,
        &service.target,
    )
    .bind_all(&app.services, &application)
    .await?;

    let started = lifecycle.start_unless_suppressed(app, &application).await?;

    Ok(AppSummary {
        guid: application.guid,
        routes,
        transfer,
        stopped,
        started,
    })
}

fn load_manifest(service: &PushService, request: &PushRequest) -> PushResult<Option<Manifest>> {
    if request.flags.no_manifest {
        return Ok(None);
    }
    let path = request
        .flags
        .manifest_path
        .clone()
        .unwrap_or_else(|| request.working_dir.clone());
    match service.manifests.read(&path) {
        Ok(manifest) => {
            let location = manifest.path.clone().unwrap_or(path);
            service
                .ui
                .say(&format!("Using manifest file {}", location.display()));
            Ok(Some(manifest))
        }
        Err(error) if error.is_not_found() && request.flags.manifest_path.is_none() => {
            debug!("No manifest in {}", path.display());
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

fn check_api_version(version: &Version, desired: &[DesiredAppState]) -> PushResult<()> {
    if *version < ROUTE_PATH_MIN_API_VERSION && desired.iter().any(|app| app.routes.path.is_some()) {
        return Err(PushError::validation(format!(
            "Option '--route-path' requires API version {} or higher. Your target is {}.",
            ROUTE_PATH_MIN_API_VERSION, version
        )));
    }
    if *version < APP_PORTS_MIN_API_VERSION && desired.iter().any(|app| app.app_ports.is_some()) {
        return Err(PushError::validation(format!(
            "Option '--app-ports' requires API version {} or higher. Your target is {}.",
            APP_PORTS_MIN_API_VERSION, version
        )));
    }
    Ok(())
}

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use log::{debug, info};
use uuid::Uuid;

use crate::{
    config::PlatformConfig,
    domain::{
        model::{
            AppParams, AppState, Archive, Domain, RemoteApplication, Route, RouteSummary,
            ServiceInstance, Stack, UploadProgress,
        },
        port::{
            ApplicationLifecycle, ApplicationRepository, BitsUploader, DomainRepository,
            RouteRepository, ServiceBinder, ServiceRepository, StackRepository,
        },
    },
    error::{
        PushError, PushResult, ResourceKind, INVALID_RELATION, SERVICE_BINDING_APP_SERVICE_TAKEN,
    },
};

const UPLOAD_CHUNK: usize = 64 * 1024;
const FIRST_TCP_PORT: u16 = 61001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadApp,
    CreateApp,
    UpdateApp,
    ListDomains,
    FindDomain,
    FindRoute,
    CreateRoute,
    BindRoute,
    UnbindRoute,
    FindServiceInstance,
    BindService,
    FindStack,
    Upload,
    Stop,
    Start,
}

/// One remote call as seen by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub detail: String,
}

struct StoredApp {
    guid: String,
    name: String,
    state: AppState,
    instances: u32,
    env: HashMap<String, String>,
    params: Vec<AppParams>,
}

struct StoredRoute {
    route: Route,
    apps: Vec<String>,
}

struct PlatformState {
    applications: Vec<StoredApp>,
    domains: Vec<Domain>,
    routes: Vec<StoredRoute>,
    service_instances: Vec<ServiceInstance>,
    bindings: Vec<(String, String)>,
    stacks: Vec<Stack>,
    uploads: HashMap<String, u64>,
    journal: Vec<Call>,
    failures: HashMap<Operation, PushError>,
    next_port: u16,
}

/// Platform kept entirely in process memory.
///
/// Implements every remote port, journals each call in order and lets callers
/// inject the failure of the next call to a given operation.
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlatformState {
                applications: vec![],
                domains: vec![],
                routes: vec![],
                service_instances: vec![],
                bindings: vec![],
                stacks: vec![],
                uploads: HashMap::new(),
                journal: vec![],
                failures: HashMap::new(),
                next_port: FIRST_TCP_PORT,
            }),
        }
    }

    /// Platform seeded with the configured domains, service instances and stacks.
    pub fn from_config(config: &PlatformConfig) -> Self {
        let platform = Self::new();
        for domain in &config.domains {
            platform.add_domain(Domain {
                guid: new_guid(),
                name: domain.name.clone(),
                shared: domain.shared,
                routing: domain.routing,
            });
        }
        for service in &config.services {
            platform.add_service_instance(service);
        }
        for stack in &config.stacks {
            platform.add_stack(stack);
        }
        info!(
            "Sandbox platform ready with {} domains, {} service instances, {} stacks",
            config.domains.len(),
            config.services.len(),
            config.stacks.len()
        );
        platform
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_domain(&self, domain: Domain) {
        self.lock().domains.push(domain);
    }

    pub fn add_service_instance(&self, name: &str) -> ServiceInstance {
        let instance = ServiceInstance {
            guid: new_guid(),
            name: name.to_string(),
        };
        self.lock().service_instances.push(instance.clone());
        instance
    }

    pub fn add_stack(&self, name: &str) -> Stack {
        let stack = Stack {
            guid: new_guid(),
            name: name.to_string(),
        };
        self.lock().stacks.push(stack.clone());
        stack
    }

    /// Registers an application as if a previous push created it.
    pub fn add_application(
        &self,
        name: &str,
        state: AppState,
        env: HashMap<String, String>,
    ) -> RemoteApplication {
        let mut platform = self.lock();
        let guid = new_guid();
        platform.applications.push(StoredApp {
            guid: guid.clone(),
            name: name.to_string(),
            state,
            instances: 1,
            env,
            params: vec![],
        });
        platform.snapshot(&guid)
    }

    /// Creates a route and maps it to the application, outside of any journaled call.
    pub fn add_bound_route(&self, app_guid: &str, host: &str, domain: &Domain) -> Route {
        let mut platform = self.lock();
        let route = Route {
            guid: new_guid(),
            host: host.to_string(),
            domain: domain.clone(),
            path: String::new(),
            port: None,
        };
        platform.routes.push(StoredRoute {
            route: route.clone(),
            apps: vec![app_guid.to_string()],
        });
        route
    }

    pub fn add_binding(&self, app_guid: &str, instance_guid: &str) {
        self.lock()
            .bindings
            .push((app_guid.to_string(), instance_guid.to_string()));
    }

    /// The next call to `operation` fails with `error`.
    pub fn fail_next(&self, operation: Operation, error: PushError) {
        self.lock().failures.insert(operation, error);
    }

    pub fn journal(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    pub fn calls(&self, operation: Operation) -> Vec<String> {
        self.lock()
            .journal
            .iter()
            .filter(|call| call.operation == operation)
            .map(|call| call.detail.clone())
            .collect()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls(operation).len()
    }

    pub fn application(&self, name: &str) -> Option<RemoteApplication> {
        let platform = self.lock();
        let guid = platform.find_app_by_name(name)?.guid.clone();
        Some(platform.snapshot(&guid))
    }

    /// Every create/update payload the application received, oldest first.
    pub fn params_history(&self, name: &str) -> Vec<AppParams> {
        self.lock()
            .find_app_by_name(name)
            .map(|app| app.params.clone())
            .unwrap_or_default()
    }

    pub fn route_urls(&self, app_guid: &str) -> Vec<String> {
        self.lock()
            .routes
            .iter()
            .filter(|stored| stored.apps.iter().any(|guid| guid == app_guid))
            .map(|stored| stored.route.url())
            .collect()
    }

    pub fn bound_services(&self, app_guid: &str) -> Vec<String> {
        let platform = self.lock();
        platform
            .bindings
            .iter()
            .filter(|(app, _)| app == app_guid)
            .filter_map(|(_, instance)| {
                platform
                    .service_instances
                    .iter()
                    .find(|candidate| &candidate.guid == instance)
                    .map(|candidate| candidate.name.clone())
            })
            .collect()
    }

    pub fn uploaded_bytes(&self, app_guid: &str) -> Option<u64> {
        self.lock().uploads.get(app_guid).copied()
    }
}

impl PlatformState {
    fn record(&mut self, operation: Operation, detail: String) -> PushResult<()> {
        debug!("{:?} {}", operation, detail);
        self.journal.push(Call { operation, detail });
        match self.failures.remove(&operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn find_app_by_name(&self, name: &str) -> Option<&StoredApp> {
        self.applications.iter().find(|app| app.name == name)
    }

    fn find_app_mut(&mut self, guid: &str) -> PushResult<&mut StoredApp> {
        self.applications
            .iter_mut()
            .find(|app| app.guid == guid)
            .ok_or_else(|| PushError::not_found(ResourceKind::App, guid))
    }

    fn snapshot(&self, guid: &str) -> RemoteApplication {
        let routes = self
            .routes
            .iter()
            .filter(|stored| stored.apps.iter().any(|app| app == guid))
            .map(|stored| RouteSummary {
                guid: stored.route.guid.clone(),
                host: stored.route.host.clone(),
                domain: stored.route.domain.clone(),
                path: stored.route.path.clone(),
                port: stored.route.port,
            })
            .collect();
        let app = self.applications.iter().find(|app| app.guid == guid);
        RemoteApplication {
            guid: guid.to_string(),
            name: app.map(|app| app.name.clone()).unwrap_or_default(),
            state: app.map(|app| app.state).unwrap_or(AppState::Stopped),
            instances: app.map(|app| app.instances).unwrap_or_default(),
            routes,
            env: app.map(|app| app.env.clone()).unwrap_or_default(),
        }
    }
}

fn new_guid() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl ApplicationRepository for InMemoryPlatform {
    async fn read(&self, name: &str) -> PushResult<RemoteApplication> {
        let mut platform = self.lock();
        platform.record(Operation::ReadApp, name.to_string())?;
        let guid = platform
            .find_app_by_name(name)
            .map(|app| app.guid.clone())
            .ok_or_else(|| PushError::not_found(ResourceKind::App, name))?;
        Ok(platform.snapshot(&guid))
    }

    async fn create(&self, params: &AppParams) -> PushResult<RemoteApplication> {
        let mut platform = self.lock();
        let name = params.name.clone().unwrap_or_default();
        platform.record(Operation::CreateApp, name.clone())?;
        if platform.find_app_by_name(&name).is_some() {
            return Err(PushError::remote(
                400,
                "100002",
                format!("The app name is taken: {}", name),
            ));
        }
        let guid = new_guid();
        platform.applications.push(StoredApp {
            guid: guid.clone(),
            name: name.clone(),
            state: AppState::Stopped,
            instances: params.instances.unwrap_or(1),
            env: params.env.clone().unwrap_or_default(),
            params: vec![params.clone()],
        });
        info!("Created application {} ({})", name, guid);
        Ok(platform.snapshot(&guid))
    }

    async fn update(&self, app_guid: &str, params: &AppParams) -> PushResult<RemoteApplication> {
        let mut platform = self.lock();
        platform.record(Operation::UpdateApp, app_guid.to_string())?;
        let app = platform.find_app_mut(app_guid)?;
        if let Some(instances) = params.instances {
            app.instances = instances;
        }
        if let Some(ref env) = params.env {
            app.env = env.clone();
        }
        app.params.push(params.clone());
        Ok(platform.snapshot(app_guid))
    }
}

#[async_trait]
impl DomainRepository for InMemoryPlatform {
    async fn list_domains_for_org(
        &self,
        org_guid: &str,
        visit: &mut (dyn for<'d> FnMut(&'d Domain) -> bool + Send),
    ) -> PushResult<()> {
        let domains = {
            let mut platform = self.lock();
            platform.record(Operation::ListDomains, org_guid.to_string())?;
            platform.domains.clone()
        };
        for domain in &domains {
            if !visit(domain) {
                break;
            }
        }
        Ok(())
    }

    async fn find_by_name_in_org(&self, name: &str, org_guid: &str) -> PushResult<Domain> {
        let mut platform = self.lock();
        platform.record(Operation::FindDomain, format!("{} in {}", name, org_guid))?;
        platform
            .domains
            .iter()
            .find(|domain| domain.name == name)
            .cloned()
            .ok_or_else(|| PushError::not_found(ResourceKind::Domain, name))
    }
}

#[async_trait]
impl RouteRepository for InMemoryPlatform {
    async fn find(
        &self,
        host: &str,
        domain: &Domain,
        path: &str,
        port: Option<u16>,
    ) -> PushResult<Route> {
        let mut platform = self.lock();
        let url = Route {
            guid: String::new(),
            host: host.to_string(),
            domain: domain.clone(),
            path: path.to_string(),
            port,
        }
        .url();
        platform.record(Operation::FindRoute, url.clone())?;
        platform
            .routes
            .iter()
            .map(|stored| &stored.route)
            .find(|route| {
                route.host == host
                    && route.domain.guid == domain.guid
                    && route.path == path
                    && route.port == port
            })
            .cloned()
            .ok_or_else(|| PushError::not_found(ResourceKind::Route, url))
    }

    async fn create(
        &self,
        host: &str,
        domain: &Domain,
        path: &str,
        random_port: bool,
    ) -> PushResult<Route> {
        let mut platform = self.lock();
        let port = if random_port {
            let port = platform.next_port;
            platform.next_port = port.checked_add(1).ok_or_else(|| {
                PushError::remote(
                    400,
                    "210002",
                    format!("No ports available for random routes on {}", domain.name),
                )
            })?;
            Some(port)
        } else {
            None
        };
        let route = Route {
            guid: new_guid(),
            host: host.to_string(),
            domain: domain.clone(),
            path: path.to_string(),
            port,
        };
        platform.record(Operation::CreateRoute, route.url())?;
        platform.routes.push(StoredRoute {
            route: route.clone(),
            apps: vec![],
        });
        Ok(route)
    }

    async fn bind(&self, route_guid: &str, app_guid: &str) -> PushResult<()> {
        let mut platform = self.lock();
        platform.record(Operation::BindRoute, format!("{} -> {}", route_guid, app_guid))?;
        let stored = platform
            .routes
            .iter_mut()
            .find(|stored| stored.route.guid == route_guid)
            .ok_or_else(|| PushError::not_found(ResourceKind::Route, route_guid))?;
        if stored.apps.iter().any(|guid| guid != app_guid) {
            return Err(PushError::remote(400, INVALID_RELATION, "The URL not available"));
        }
        if !stored.apps.iter().any(|guid| guid == app_guid) {
            stored.apps.push(app_guid.to_string());
        }
        Ok(())
    }

    async fn unbind(&self, route_guid: &str, app_guid: &str) -> PushResult<()> {
        let mut platform = self.lock();
        platform.record(Operation::UnbindRoute, format!("{} -> {}", route_guid, app_guid))?;
        if let Some(stored) = platform
            .routes
            .iter_mut()
            .find(|stored| stored.route.guid == route_guid)
        {
            stored.apps.retain(|guid| guid != app_guid);
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRepository for InMemoryPlatform {
    async fn find_instance_by_name(&self, name: &str) -> PushResult<ServiceInstance> {
        let mut platform = self.lock();
        platform.record(Operation::FindServiceInstance, name.to_string())?;
        platform
            .service_instances
            .iter()
            .find(|instance| instance.name == name)
            .cloned()
            .ok_or_else(|| PushError::not_found(ResourceKind::ServiceInstance, name))
    }
}

#[async_trait]
impl ServiceBinder for InMemoryPlatform {
    async fn bind_application(
        &self,
        application: &RemoteApplication,
        instance: &ServiceInstance,
    ) -> PushResult<()> {
        let mut platform = self.lock();
        platform.record(
            Operation::BindService,
            format!("{} -> {}", instance.name, application.name),
        )?;
        let binding = (application.guid.clone(), instance.guid.clone());
        if platform.bindings.contains(&binding) {
            return Err(PushError::remote(
                400,
                SERVICE_BINDING_APP_SERVICE_TAKEN,
                "The app space binding to service is taken",
            ));
        }
        platform.bindings.push(binding);
        Ok(())
    }
}

#[async_trait]
impl StackRepository for InMemoryPlatform {
    async fn find_by_name(&self, name: &str) -> PushResult<Stack> {
        let mut platform = self.lock();
        platform.record(Operation::FindStack, name.to_string())?;
        platform
            .stacks
            .iter()
            .find(|stack| stack.name == name)
            .cloned()
            .ok_or_else(|| PushError::not_found(ResourceKind::Stack, name))
    }
}

#[async_trait]
impl BitsUploader for InMemoryPlatform {
    async fn upload(
        &self,
        app_guid: &str,
        archive: Archive,
        progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> PushResult<()> {
        self.lock()
            .record(Operation::Upload, app_guid.to_string())?;
        let total_bytes = archive.bytes.len() as u64;
        let mut bytes_sent = 0u64;
        for chunk in archive.bytes.chunks(UPLOAD_CHUNK) {
            bytes_sent += chunk.len() as u64;
            progress(UploadProgress {
                bytes_sent,
                total_bytes,
                files: archive.file_count,
            });
            tokio::task::yield_now().await;
        }
        self.lock().uploads.insert(app_guid.to_string(), total_bytes);
        Ok(())
    }
}

#[async_trait]
impl ApplicationLifecycle for InMemoryPlatform {
    async fn stop(&self, application: &RemoteApplication, org: &str, space: &str) -> PushResult<()> {
        let mut platform = self.lock();
        platform.record(
            Operation::Stop,
            format!("{} in {}/{}", application.name, org, space),
        )?;
        platform.find_app_mut(&application.guid)?.state = AppState::Stopped;
        Ok(())
    }

    async fn start(
        &self,
        application: &RemoteApplication,
        org: &str,
        space: &str,
        timeout_seconds: Option<u32>,
    ) -> PushResult<()> {
        let mut platform = self.lock();
        let timeout = timeout_seconds
            .map(|seconds| format!(" timeout {}s", seconds))
            .unwrap_or_default();
        platform.record(
            Operation::Start,
            format!("{} in {}/{}{}", application.name, org, space, timeout),
        )?;
        platform.find_app_mut(&application.guid)?.state = AppState::Started;
        Ok(())
    }
}

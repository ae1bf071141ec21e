use std::path::Path;

use async_trait::async_trait;

use super::model::{
    AppParams, Archive, Domain, FileDescriptor, Manifest, RemoteApplication, Route,
    ServiceInstance, Stack, UploadPlan, UploadProgress,
};
use crate::error::PushResult;

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// `NotFound` means the application does not exist yet.
    async fn read(&self, name: &str) -> PushResult<RemoteApplication>;

    async fn create(&self, params: &AppParams) -> PushResult<RemoteApplication>;

    async fn update(&self, app_guid: &str, params: &AppParams) -> PushResult<RemoteApplication>;
}

#[async_trait]
pub trait DomainRepository: Send + Sync {
    /// Visits the org's domains in listing order until `visit` returns `false`.
    async fn list_domains_for_org(
        &self,
        org_guid: &str,
        visit: &mut (dyn for<'d> FnMut(&'d Domain) -> bool + Send),
    ) -> PushResult<()>;

    async fn find_by_name_in_org(&self, name: &str, org_guid: &str) -> PushResult<Domain>;
}

#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn find(
        &self,
        host: &str,
        domain: &Domain,
        path: &str,
        port: Option<u16>,
    ) -> PushResult<Route>;

    async fn create(
        &self,
        host: &str,
        domain: &Domain,
        path: &str,
        random_port: bool,
    ) -> PushResult<Route>;

    async fn bind(&self, route_guid: &str, app_guid: &str) -> PushResult<()>;

    async fn unbind(&self, route_guid: &str, app_guid: &str) -> PushResult<()>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn find_instance_by_name(&self, name: &str) -> PushResult<ServiceInstance>;
}

#[async_trait]
pub trait ServiceBinder: Send + Sync {
    async fn bind_application(
        &self,
        application: &RemoteApplication,
        instance: &ServiceInstance,
    ) -> PushResult<()>;
}

#[async_trait]
pub trait StackRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> PushResult<Stack>;
}

#[async_trait]
pub trait BitsUploader: Send + Sync {
    /// Transfers the archive and waits for remote processing to finish.
    async fn upload(
        &self,
        app_guid: &str,
        archive: Archive,
        progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> PushResult<()>;
}

#[async_trait]
pub trait ApplicationLifecycle: Send + Sync {
    async fn stop(&self, application: &RemoteApplication, org: &str, space: &str) -> PushResult<()>;

    async fn start(
        &self,
        application: &RemoteApplication,
        org: &str,
        space: &str,
        timeout_seconds: Option<u32>,
    ) -> PushResult<()>;
}

/// Local file enumeration, honouring ignore rules.
pub trait AppFiles: Send + Sync {
    fn enumerate(&self, dir: &Path) -> PushResult<Vec<FileDescriptor>>;
}

pub trait Packager: Send + Sync {
    fn package(&self, dir: &Path, plan: &UploadPlan) -> PushResult<Archive>;
}

pub trait ManifestReader: Send + Sync {
    /// Missing files surface as `NotFound` so callers can decide whether it matters.
    fn read(&self, path: &Path) -> PushResult<Manifest>;
}

pub trait WordGenerator: Send + Sync {
    fn babble(&self) -> String;
}

/// Status-line reporting surface.
pub trait Ui: Send + Sync {
    fn say(&self, message: &str);

    fn ok(&self);

    fn warn(&self, message: &str);

    fn failed(&self, message: &str);

    /// Upload progress, called once per transferred chunk.
    fn progress(&self, progress: UploadProgress);
}

use log::{debug, info};

use super::{
    manifest::merge_environment,
    model::{AppParams, DesiredAppState, RemoteApplication},
    port::{ApplicationRepository, StackRepository, Ui},
};
use crate::error::PushResult;

/// Space and org the push is aimed at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub org_guid: String,
    pub org_name: String,
    pub space_guid: String,
    pub space_name: String,
    pub user: String,
}

pub struct ApplicationReconciler<'a> {
    applications: &'a dyn ApplicationRepository,
    stacks: &'a dyn StackRepository,
    ui: &'a dyn Ui,
    target: &'a Target,
}

impl<'a> ApplicationReconciler<'a> {
    pub fn new(
        applications: &'a dyn ApplicationRepository,
        stacks: &'a dyn StackRepository,
        ui: &'a dyn Ui,
        target: &'a Target,
    ) -> Self {
        Self {
            applications,
            stacks,
            ui,
            target,
        }
    }

    /// Reads the remote application; absence is reported as `None`, not as an error.
    pub async fn find_existing(&self, name: &str) -> PushResult<Option<RemoteApplication>> {
        match self.applications.read(name).await {
            Ok(application) => Ok(Some(application)),
            Err(error) if error.is_not_found() => {
                debug!("Application {} does not exist yet", name);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Creates the application or sends the explicitly specified fields as an update.
    pub async fn reconcile(
        &self,
        desired: &DesiredAppState,
        existing: Option<&RemoteApplication>,
    ) -> PushResult<RemoteApplication> {
        let stack_guid = self.resolve_stack(desired).await?;
        match existing {
            None => {
                self.ui.say(&format!(
                    "Creating app {} in org {} / space {} as {}...",
                    desired.name, self.target.org_name, self.target.space_name, self.target.user
                ));
                let mut params = update_params(desired, stack_guid);
                params.name = Some(desired.name.clone());
                params.space_guid = Some(self.target.space_guid.clone());
                debug!("Create payload {}", serde_json::to_string(&params).unwrap_or_default());
                let created = self.applications.create(&params).await?;
                self.ui.ok();
                info!("Created application {} ({})", created.name, created.guid);
                Ok(created)
            }
            Some(existing) => {
                self.ui.say(&format!(
                    "Updating app {} in org {} / space {} as {}...",
                    existing.name, self.target.org_name, self.target.space_name, self.target.user
                ));
                let mut params = update_params(desired, stack_guid);
                params.env = params
                    .env
                    .map(|desired_env| merge_environment(&existing.env, &desired_env));
                debug!("Update payload {}", serde_json::to_string(&params).unwrap_or_default());
                let updated = self.applications.update(&existing.guid, &params).await?;
                self.ui.ok();
                info!("Updated application {} ({})", updated.name, updated.guid);
                Ok(updated)
            }
        }
    }

    async fn resolve_stack(&self, desired: &DesiredAppState) -> PushResult<Option<String>> {
        let Some(ref name) = desired.stack else {
            return Ok(None);
        };
        self.ui.say(&format!("Using stack {}...", name));
        let stack = self.stacks.find_by_name(name).await?;
        self.ui.ok();
        Ok(Some(stack.guid))
    }
}

/// Only fields mentioned by the flags or the manifest make it into the payload.
fn update_params(desired: &DesiredAppState, stack_guid: Option<String>) -> AppParams {
    AppParams {
        name: None,
        space_guid: None,
        memory: desired.memory,
        disk_quota: desired.disk_quota,
        instances: desired.instances,
        command: desired.command.to_param(),
        buildpack: desired.buildpack.to_param(),
        docker_image: desired.docker_image.clone(),
        stack_guid,
        health_check_type: desired.health_check_type,
        health_check_http_endpoint: desired.health_check_http_endpoint.clone(),
        health_check_timeout: desired.timeout,
        app_ports: desired.app_ports.clone(),
        env: desired.env.clone(),
    }
}

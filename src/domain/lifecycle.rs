use log::{debug, info};

use super::{
    model::{AppState, DesiredAppState, RemoteApplication},
    port::{ApplicationLifecycle, Ui},
    reconciler::Target,
};
use crate::error::PushResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotYetExisting,
    Stopped,
    Started,
}

impl LifecycleState {
    pub fn of(existing: Option<&RemoteApplication>) -> Self {
        match existing.map(|application| application.state) {
            None => LifecycleState::NotYetExisting,
            Some(AppState::Stopped) => LifecycleState::Stopped,
            Some(AppState::Started) => LifecycleState::Started,
        }
    }
}

/// Full-downtime redeploy: stop before the update, start once bits are in place.
pub struct LifecycleController<'a> {
    lifecycle: &'a dyn ApplicationLifecycle,
    ui: &'a dyn Ui,
    target: &'a Target,
}

impl<'a> LifecycleController<'a> {
    pub fn new(lifecycle: &'a dyn ApplicationLifecycle, ui: &'a dyn Ui, target: &'a Target) -> Self {
        Self {
            lifecycle,
            ui,
            target,
        }
    }

    /// Returns whether a stop call was issued.
    pub async fn stop_if_started(&self, existing: Option<&RemoteApplication>) -> PushResult<bool> {
        match (LifecycleState::of(existing), existing) {
            (LifecycleState::Started, Some(application)) => {
                self.ui.say(&format!(
                    "Stopping app {} in org {} / space {} as {}...",
                    application.name, self.target.org_name, self.target.space_name, self.target.user
                ));
                self.lifecycle
                    .stop(application, &self.target.org_name, &self.target.space_name)
                    .await?;
                self.ui.ok();
                info!("Stopped {} before redeploy", application.guid);
                Ok(true)
            }
            (state, _) => {
                debug!("No stop needed, application is {:?}", state);
                Ok(false)
            }
        }
    }

    /// Returns whether a start call was issued.
    pub async fn start_unless_suppressed(
        &self,
        desired: &DesiredAppState,
        application: &RemoteApplication,
    ) -> PushResult<bool> {
        if desired.flags.no_start {
            debug!("Not starting {}, start suppressed", application.name);
            return Ok(false);
        }
        self.ui.say(&format!(
            "Starting app {} in org {} / space {} as {}...",
            application.name, self.target.org_name, self.target.space_name, self.target.user
        ));
        self.lifecycle
            .start(
                application,
                &self.target.org_name,
                &self.target.space_name,
                desired.timeout,
            )
            .await?;
        self.ui.ok();
        Ok(true)
    }
}

use log::{info, warn};

use super::{
    model::RemoteApplication,
    port::{ServiceBinder, ServiceRepository, Ui},
};
use crate::{domain::reconciler::Target, error::PushResult};

pub struct ServiceBindingManager<'a> {
    instances: &'a dyn ServiceRepository,
    binder: &'a dyn ServiceBinder,
    ui: &'a dyn Ui,
    target: &'a Target,
}

impl<'a> ServiceBindingManager<'a> {
    pub fn new(
        instances: &'a dyn ServiceRepository,
        binder: &'a dyn ServiceBinder,
        ui: &'a dyn Ui,
        target: &'a Target,
    ) -> Self {
        Self {
            instances,
            binder,
            ui,
            target,
        }
    }

    /// Binds each named instance. A missing instance or any bind failure other
    /// than "already bound" aborts the remaining bindings.
    pub async fn bind_all(&self, names: &[String], application: &RemoteApplication) -> PushResult<()> {
        for name in names {
            let instance = self.instances.find_instance_by_name(name).await?;

            self.ui.say(&format!(
                "Binding service {} to app {} in org {} / space {} as {}...",
                instance.name,
                application.name,
                self.target.org_name,
                self.target.space_name,
                self.target.user
            ));
            match self.binder.bind_application(application, &instance).await {
                Ok(()) => info!("Bound service {} to {}", instance.name, application.name),
                Err(error) if error.is_already_bound() => {
                    warn!("App {} is already bound to {}", application.name, instance.name)
                }
                Err(error) => return Err(error),
            }
            self.ui.ok();
        }
        Ok(())
    }
}

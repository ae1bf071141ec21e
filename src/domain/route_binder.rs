use log::{debug, info};
use split_iter::Splittable;

use super::{
    model::{RemoteApplication, ResolvedRoute, Route},
    port::{RouteRepository, Ui},
};
use crate::error::{PushError, PushResult};

const RANDOM_ROUTE_TIP: &str =
    "TIP: Change the hostname with -n HOSTNAME or use --random-route to generate a hostname.";

pub struct RouteBinder<'a> {
    routes: &'a dyn RouteRepository,
    ui: &'a dyn Ui,
}

impl<'a> RouteBinder<'a> {
    pub fn new(routes: &'a dyn RouteRepository, ui: &'a dyn Ui) -> Self {
        Self { routes, ui }
    }

    /// Finds or creates every planned route and maps it to the application.
    ///
    /// Routes the application already holds are reused without any remote call.
    /// The result keeps the planned order.
    pub async fn bind_all(
        &self,
        planned: Vec<ResolvedRoute>,
        application: &RemoteApplication,
    ) -> PushResult<Vec<ResolvedRoute>> {
        let (pending, already_bound) = planned
            .into_iter()
            .enumerate()
            .split(|(_, route)| bound_guid(application, route).is_some());

        let mut resolved = Vec::new();
        for (position, mut route) in already_bound {
            route.guid = bound_guid(application, &route);
            self.ui.say(&format!("Using route {}", route.url()));
            resolved.push((position, route));
        }
        for (position, route) in pending {
            resolved.push((position, self.bind_one(route, application).await?));
        }
        resolved.sort_by_key(|(position, _)| *position);
        Ok(resolved.into_iter().map(|(_, route)| route).collect())
    }

    async fn bind_one(
        &self,
        mut planned: ResolvedRoute,
        application: &RemoteApplication,
    ) -> PushResult<ResolvedRoute> {
        let route = match self
            .routes
            .find(&planned.host, &planned.domain, &planned.path, planned.port)
            .await
        {
            Ok(route) => {
                self.ui.say(&format!("Using route {}", route.url()));
                route
            }
            Err(error) if error.is_not_found() => self.create(&planned).await?,
            Err(error) => return Err(error),
        };
        planned.guid = Some(route.guid.clone());
        planned.port = route.port;

        if application.routes.iter().any(|summary| summary.guid == route.guid) {
            debug!("Route {} already bound to {}", route.url(), application.name);
            return Ok(planned);
        }

        self.ui.say(&format!("Binding {} to {}...", route.url(), application.name));
        self.routes
            .bind(&route.guid, &application.guid)
            .await
            .map_err(|error| {
                if error.is_route_taken() {
                    PushError::RemoteConflict {
                        message: format!("The route {} is already in use.", route.url()),
                        hint: RANDOM_ROUTE_TIP.to_string(),
                    }
                } else {
                    error
                }
            })?;
        self.ui.ok();
        info!("Bound route {} to {}", route.url(), application.guid);
        Ok(planned)
    }

    async fn create(&self, planned: &ResolvedRoute) -> PushResult<Route> {
        if planned.random_port {
            self.ui.say(&format!(
                "Creating random route for {}...",
                planned.domain.name
            ));
        } else {
            self.ui.say(&format!("Creating route {}...", planned.url()));
        }
        let route = self
            .routes
            .create(&planned.host, &planned.domain, &planned.path, planned.random_port)
            .await?;
        self.ui.ok();
        Ok(route)
    }

    /// Removes every route mapping the application currently has.
    pub async fn unbind_all(&self, application: &RemoteApplication) -> PushResult<()> {
        for summary in &application.routes {
            debug!("Unbinding route {} from {}", summary.guid, application.name);
            self.routes.unbind(&summary.guid, &application.guid).await?;
        }
        Ok(())
    }
}

fn bound_guid(application: &RemoteApplication, route: &ResolvedRoute) -> Option<String> {
    if route.random_port {
        return None;
    }
    application
        .routes
        .iter()
        .find(|summary| {
            summary.host == route.host
                && summary.domain.guid == route.domain.guid
                && summary.path == route.path
                && summary.port == route.port
        })
        .map(|summary| summary.guid.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{AppState, Domain, RouteSummary, RoutingType};

    fn domain() -> Domain {
        Domain {
            guid: "domain-guid".to_string(),
            name: "example.com".to_string(),
            shared: true,
            routing: RoutingType::Http,
        }
    }

    fn application(routes: Vec<RouteSummary>) -> RemoteApplication {
        RemoteApplication {
            guid: "app-guid".to_string(),
            name: "app".to_string(),
            state: AppState::Started,
            instances: 1,
            routes,
            env: Default::default(),
        }
    }

    fn planned(host: &str) -> ResolvedRoute {
        ResolvedRoute {
            host: host.to_string(),
            domain: domain(),
            path: String::new(),
            port: None,
            random_port: false,
            guid: None,
        }
    }

    #[test]
    fn matches_existing_summary_by_host_domain_path_and_port() {
        let app = application(vec![RouteSummary {
            guid: "existing-route-guid".to_string(),
            host: "app".to_string(),
            domain: domain(),
            path: String::new(),
            port: None,
        }]);

        assert_eq!(bound_guid(&app, &planned("app")).as_deref(), Some("existing-route-guid"));
        assert_eq!(bound_guid(&app, &planned("other")), None);
    }

    #[derive(Default)]
    struct RecordingRoutes {
        binds: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl RouteRepository for RecordingRoutes {
        async fn find(
            &self,
            host: &str,
            domain: &Domain,
            path: &str,
            port: Option<u16>,
        ) -> PushResult<Route> {
            Ok(Route {
                guid: format!("{}-route", host),
                host: host.to_string(),
                domain: domain.clone(),
                path: path.to_string(),
                port,
            })
        }

        async fn create(
            &self,
            host: &str,
            domain: &Domain,
            path: &str,
            _random_port: bool,
        ) -> PushResult<Route> {
            self.find(host, domain, path, None).await
        }

        async fn bind(&self, route_guid: &str, _app_guid: &str) -> PushResult<()> {
            self.binds.lock().unwrap().push(route_guid.to_string());
            Ok(())
        }

        async fn unbind(&self, _route_guid: &str, _app_guid: &str) -> PushResult<()> {
            Ok(())
        }
    }

    struct SilentUi;

    impl Ui for SilentUi {
        fn say(&self, _message: &str) {}
        fn ok(&self) {}
        fn warn(&self, _message: &str) {}
        fn failed(&self, _message: &str) {}
        fn progress(&self, _progress: crate::domain::model::UploadProgress) {}
    }

    #[tokio::test]
    async fn bound_routes_keep_planned_order() {
        let app = application(vec![RouteSummary {
            guid: "second-route".to_string(),
            host: "second".to_string(),
            domain: domain(),
            path: String::new(),
            port: None,
        }]);
        let routes = RecordingRoutes::default();

        let resolved = RouteBinder::new(&routes, &SilentUi)
            .bind_all(vec![planned("first"), planned("second"), planned("third")], &app)
            .await
            .unwrap();

        let hosts: Vec<&str> = resolved.iter().map(|route| route.host.as_str()).collect();
        assert_eq!(hosts, vec!["first", "second", "third"]);
        assert_eq!(resolved[1].guid.as_deref(), Some("second-route"));
        assert_eq!(
            *routes.binds.lock().unwrap(),
            vec!["first-route", "third-route"]
        );
    }

    #[test]
    fn random_port_routes_are_never_considered_bound() {
        let app = application(vec![RouteSummary {
            guid: "tcp-route".to_string(),
            host: String::new(),
            domain: domain(),
            path: String::new(),
            port: None,
        }]);
        let mut route = planned("");
        route.random_port = true;

        assert_eq!(bound_guid(&app, &route), None);
    }
}

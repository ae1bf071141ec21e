use itertools::Itertools;
use log::{debug, info};
use tokio::sync::OnceCell;

use super::{
    model::{DesiredAppState, Domain, ResolvedRoute, RoutingType},
    port::{DomainRepository, WordGenerator},
};
use crate::error::{PushError, PushResult, ResourceKind};

/// Organization domain listing, fetched at most once per push and read-only afterwards.
pub struct DomainCache {
    org_guid: String,
    domains: OnceCell<Vec<Domain>>,
}

impl DomainCache {
    pub fn new(org_guid: impl Into<String>) -> Self {
        Self {
            org_guid: org_guid.into(),
            domains: OnceCell::new(),
        }
    }

    pub async fn domains(&self, repository: &dyn DomainRepository) -> PushResult<&[Domain]> {
        let org_guid = self.org_guid.as_str();
        let domains = self
            .domains
            .get_or_try_init(|| async move {
                let mut listed = Vec::new();
                repository
                    .list_domains_for_org(org_guid, &mut |domain: &Domain| {
                        listed.push(domain.clone());
                        true
                    })
                    .await?;
                debug!("Cached {} domains for org {}", listed.len(), org_guid);
                Ok::<_, PushError>(listed)
            })
            .await?;
        Ok(domains.as_slice())
    }

    /// First private domain in listing order, else the first shared one.
    pub async fn default_domain(&self, repository: &dyn DomainRepository) -> PushResult<Domain> {
        let domains = self.domains(repository).await?;
        domains
            .iter()
            .find(|domain| !domain.shared)
            .or_else(|| domains.first())
            .cloned()
            .ok_or_else(|| {
                PushError::not_found(
                    ResourceKind::Domain,
                    format!("default for org {}", self.org_guid),
                )
            })
    }
}

pub struct RoutePlanner<'a> {
    domains: &'a dyn DomainRepository,
    words: &'a dyn WordGenerator,
    cache: &'a DomainCache,
}

impl<'a> RoutePlanner<'a> {
    pub fn new(
        domains: &'a dyn DomainRepository,
        words: &'a dyn WordGenerator,
        cache: &'a DomainCache,
    ) -> Self {
        Self {
            domains,
            words,
            cache,
        }
    }

    /// Computes every route the application should expose, domains outermost.
    ///
    /// Any domain lookup failure aborts the whole plan.
    pub async fn plan(&self, app: &DesiredAppState) -> PushResult<Vec<ResolvedRoute>> {
        if app.flags.no_route {
            return Ok(vec![]);
        }

        let domains = self.resolve_domains(app).await?;
        let random_word = app.flags.random_route.then(|| self.words.babble());
        let path = app.routes.path.clone().unwrap_or_default();

        let mut planned = Vec::new();
        for domain in domains {
            let tcp_random = app.flags.random_route && domain.routing == RoutingType::Tcp;
            for host in self.hosts_for(app, &domain, random_word.as_deref()) {
                planned.push(ResolvedRoute {
                    host,
                    domain: domain.clone(),
                    path: if domain.routing == RoutingType::Tcp {
                        String::new()
                    } else {
                        path.clone()
                    },
                    port: None,
                    random_port: tcp_random && app.routes.random_port,
                    guid: None,
                });
            }
        }
        info!(
            "Planned routes for {}: {}",
            app.name,
            planned.iter().map(ResolvedRoute::url).join(", ")
        );
        Ok(planned)
    }

    async fn resolve_domains(&self, app: &DesiredAppState) -> PushResult<Vec<Domain>> {
        if app.routes.domains.is_empty() {
            return Ok(vec![self.cache.default_domain(self.domains).await?]);
        }
        let mut resolved = Vec::with_capacity(app.routes.domains.len());
        for name in app.routes.domains.iter().unique() {
            let domain = self
                .domains
                .find_by_name_in_org(name, &self.cache.org_guid)
                .await
                .map_err(|error| match error {
                    PushError::NotFound { .. } => {
                        PushError::not_found(ResourceKind::Domain, name.clone())
                    }
                    other => other,
                })?;
            resolved.push(domain);
        }
        Ok(resolved)
    }

    fn hosts_for(&self, app: &DesiredAppState, domain: &Domain, random_word: Option<&str>) -> Vec<String> {
        if app.flags.no_hostname {
            return vec![String::new()];
        }
        if let Some(word) = random_word {
            return match domain.routing {
                RoutingType::Tcp => vec![String::new()],
                RoutingType::Http => vec![format!("{}-{}", sanitize_host(&app.name), word)],
            };
        }
        if app.routes.hosts.is_empty() {
            vec![sanitize_host(&app.name)]
        } else {
            app.routes
                .hosts
                .iter()
                .map(|host| sanitize_host(host))
                .unique()
                .collect()
        }
    }
}

/// Drops every character outside `[A-Za-z0-9-]`.
pub fn sanitize_host(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

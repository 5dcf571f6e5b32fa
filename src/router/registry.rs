use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::RoutingError;
use crate::middleware::Middleware;
use crate::pattern::{RoutePattern, DEFAULT_DOMAIN};

use super::core::{location, Route, RouteTable};
use super::entry::{HandlerEntry, HandlerFn};

/// A registration captured during setup and materialized when the registry
/// is sealed.
pub struct PendingRegistration {
    /// Host aliases of the domain object it was registered through. Empty
    /// means the pattern's `@domain` or the default domain.
    pub domains: Vec<String>,
    pub source: &'static Location<'static>,
    pub target: PendingTarget,
}

pub enum PendingTarget {
    Route {
        pattern: String,
        entry: HandlerEntry,
        middleware: Vec<Arc<dyn Middleware>>,
    },
    StatusHandler {
        status: u16,
        handler: HandlerFn,
    },
}

#[derive(Default)]
struct RegistryState {
    pending: Vec<PendingRegistration>,
    sealed: bool,
}

/// Per-server queue of pending registrations.
///
/// Cloning yields another handle to the same queue, so every group and domain
/// derived from one server feeds the same registry. [`Registry::seal`] drains
/// the queue exactly once; later registrations are logged and dropped.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, registration: PendingRegistration) {
        let mut state = self.state.lock();
        if state.sealed {
            error!(
                source = %location(registration.source),
                "Registration after the route table was sealed, ignored"
            );
            return;
        }
        if let PendingTarget::Route { pattern, entry, .. } = &registration.target {
            debug!(
                pattern = %pattern,
                kind = entry.kind(),
                source = %location(registration.source),
                "Route registration queued"
            );
        }
        state.pending.push(registration);
    }

    /// Number of registrations waiting for [`Registry::seal`].
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Compile every pending registration into a [`RouteTable`].
    ///
    /// Registration order becomes the tie-break sequence between equally
    /// specific routes.
    ///
    /// # Errors
    ///
    /// The first malformed pattern, invalid domain or rejected duplicate
    /// aborts sealing; no partial table is returned.
    pub fn seal(&self, overwrite: bool) -> Result<RouteTable, RoutingError> {
        let pending = {
            let mut state = self.state.lock();
            state.sealed = true;
            std::mem::take(&mut state.pending)
        };

        let mut table = RouteTable::default();
        for (seq, registration) in pending.into_iter().enumerate() {
            let source = registration.source;
            let result = match registration.target {
                PendingTarget::Route {
                    pattern,
                    entry,
                    middleware,
                } => RoutePattern::compile(&pattern).and_then(|compiled| {
                    let domains = resolve_domains(compiled.domain(), &registration.domains)?;
                    for domain in domains {
                        table.insert(
                            Route {
                                pattern: compiled.clone(),
                                entry: entry.clone(),
                                middleware: middleware.clone(),
                                source,
                                seq: seq as u64,
                                domain,
                            },
                            overwrite,
                        )?;
                    }
                    Ok(())
                }),
                PendingTarget::StatusHandler { status, handler } => {
                    resolve_domains(None, &registration.domains).map(|domains| {
                        for domain in domains {
                            table.insert_status_handler(domain, status, Arc::clone(&handler));
                        }
                    })
                }
            };
            if let Err(err) = result {
                error!(source = %location(source), error = %err, "Invalid route registration");
                return Err(err);
            }
        }
        table.finish();

        info!(routes_count = table.len(), "Route table sealed");
        Ok(table)
    }
}

fn resolve_domains(
    pattern_domain: Option<&str>,
    aliases: &[String],
) -> Result<Vec<Arc<str>>, RoutingError> {
    if let Some(domain) = pattern_domain {
        return Ok(vec![Arc::from(domain)]);
    }
    if aliases.is_empty() {
        return Ok(vec![Arc::from(DEFAULT_DOMAIN)]);
    }
    aliases
        .iter()
        .map(|alias| {
            let alias = alias.trim();
            if alias.is_empty() || alias.contains('/') || alias.contains(' ') {
                Err(RoutingError::InvalidDomain(alias.to_string()))
            } else {
                Ok(Arc::from(alias.to_ascii_lowercase()))
            }
        })
        .collect()
}

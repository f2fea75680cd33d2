//! Lifecycle state machine shared by every client
//!
//! `Unconfigured → Configured → Connected → Closed`, with `Failed` reached when
//! a connection attempt fails. Connect and close are serialized per handle by
//! an async lock; the state itself sits behind a short-lived sync lock so that
//! `state()` and `configure()` never wait on network I/O.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use log::{debug, info, warn};

use super::{Driver, HealthStatus, LifecycleState, Session};
use crate::clients::ServiceKind;
use crate::config::ServiceSettings;
use crate::error::{mapping, Result, SdkError};
use crate::util::sanitize_for_logging;

enum Slot<S: ?Sized> {
    Unconfigured,
    Configured(ServiceSettings),
    Connected {
        settings: ServiceSettings,
        session: Arc<S>,
    },
    Failed {
        settings: ServiceSettings,
        reason: String,
    },
    Closed,
}

impl<S: ?Sized> Slot<S> {
    fn state(&self) -> LifecycleState {
        match self {
            Slot::Unconfigured => LifecycleState::Unconfigured,
            Slot::Configured(_) => LifecycleState::Configured,
            Slot::Connected { .. } => LifecycleState::Connected,
            Slot::Failed { .. } => LifecycleState::Failed,
            Slot::Closed => LifecycleState::Closed,
        }
    }
}

/// A client handle bound to one backend service through a driver
pub struct Handle<S: ?Sized + Session + 'static> {
    service: ServiceKind,
    driver: Arc<dyn Driver<S>>,
    slot: Mutex<Slot<S>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl<S: ?Sized + Session + 'static> Handle<S> {
    /// Create an unconfigured handle
    pub fn new(service: ServiceKind, driver: Arc<dyn Driver<S>>) -> Self {
        Self {
            service,
            driver,
            slot: Mutex::new(Slot::Unconfigured),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Name of the driver behind this handle
    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    pub fn state(&self) -> LifecycleState {
        self.slot().state()
    }

    /// Settings currently bound to the handle
    pub fn settings(&self) -> Option<ServiceSettings> {
        match &*self.slot() {
            Slot::Configured(settings)
            | Slot::Connected { settings, .. }
            | Slot::Failed { settings, .. } => Some(settings.clone()),
            Slot::Unconfigured | Slot::Closed => None,
        }
    }

    /// Bind settings.
    ///
    /// Valid from every state except `Connected`; a failed or closed handle
    /// returns to `Configured`. Settings that break their field invariants are
    /// rejected and the current binding is kept.
    pub fn configure(&self, settings: ServiceSettings) -> Result<()> {
        if settings.service != self.service {
            return Err(SdkError::configuration(format!(
                "settings for {} cannot configure the {} handle",
                settings.service, self.service
            )));
        }
        settings.check()?;

        let _op = self.op_lock.try_lock().map_err(|_| {
            SdkError::configuration(format!(
                "{} handle cannot be reconfigured while connect or close is in progress",
                self.service
            ))
        })?;

        let mut slot = self.slot();
        if let Slot::Connected { .. } = &*slot {
            return Err(SdkError::configuration(format!(
                "{} handle is connected; close it before reconfiguring",
                self.service
            )));
        }

        debug!("Configuring {} handle for {}", self.service, sanitize_for_logging(&settings.endpoint));
        *slot = Slot::Configured(settings);
        Ok(())
    }

    /// Open the backend session. Idempotent while connected.
    pub async fn connect(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;

        let settings = match &*self.slot() {
            Slot::Connected { .. } => {
                debug!("{} handle already connected", self.service);
                return Ok(());
            }
            Slot::Configured(settings) => settings.clone(),
            other => return Err(self.unavailable(other)),
        };

        let timeout = settings.timeout();
        let outcome = tokio::time::timeout(timeout, self.driver.open(&settings)).await;

        let mut slot = self.slot();
        match outcome {
            Ok(Ok(session)) => {
                info!(
                    "{} connected to {} via {} driver",
                    self.service,
                    sanitize_for_logging(&settings.endpoint),
                    self.driver.name()
                );
                *slot = Slot::Connected { settings, session };
                Ok(())
            }
            Ok(Err(err)) => {
                let error = mapping::connect_failure(self.service, &settings.endpoint, err);
                warn!("{}", error);
                *slot = Slot::Failed {
                    reason: error.message().to_string(),
                    settings,
                };
                Err(error)
            }
            Err(_) => {
                let error = mapping::connect_timeout(self.service, &settings.endpoint, timeout);
                warn!("{}", error);
                *slot = Slot::Failed {
                    reason: error.message().to_string(),
                    settings,
                };
                Err(error)
            }
        }
    }

    /// Probe the backend. Never fails: probe errors, timeouts and panics are
    /// reported as `Unhealthy`.
    pub async fn healthcheck(&self) -> HealthStatus {
        let (session, timeout) = match &*self.slot() {
            Slot::Connected { settings, session } => (Arc::clone(session), settings.timeout()),
            Slot::Failed { reason, .. } => return HealthStatus::unhealthy(format!("handle failed: {}", reason)),
            Slot::Unconfigured => return HealthStatus::unhealthy("not configured"),
            Slot::Configured(_) => return HealthStatus::unhealthy("not connected"),
            Slot::Closed => return HealthStatus::unhealthy("closed"),
        };

        let probe = AssertUnwindSafe(session.ping()).catch_unwind();
        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(Ok(()))) => HealthStatus::Healthy,
            Ok(Ok(Err(err))) => {
                HealthStatus::unhealthy(format!("probe failed: {}", mapping::describe(err.as_ref())))
            }
            Ok(Err(_panic)) => HealthStatus::unhealthy("probe panicked"),
            Err(_) => HealthStatus::unhealthy(format!("probe timed out after {:.1}s", timeout.as_secs_f64())),
        }
    }

    /// Release the session. Idempotent; a failed handle stays failed.
    pub async fn close(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;

        let session = {
            let mut slot = self.slot();
            match std::mem::replace(&mut *slot, Slot::Closed) {
                Slot::Connected { session, .. } => session,
                failed @ Slot::Failed { .. } => {
                    *slot = failed;
                    return Ok(());
                }
                Slot::Unconfigured | Slot::Configured(_) | Slot::Closed => return Ok(()),
            }
        };

        match session.close().await {
            Ok(()) => {
                info!("{} handle closed", self.service);
                Ok(())
            }
            Err(err) => {
                let error = mapping::translate(self.service, "close", err);
                warn!("{}", error);
                Err(error)
            }
        }
    }

    /// The live session, for service operations.
    ///
    /// Fails with a `Connection` error unless the handle is connected.
    pub fn session(&self) -> Result<Arc<S>> {
        match &*self.slot() {
            Slot::Connected { session, .. } => Ok(Arc::clone(session)),
            other => Err(self.unavailable(other)),
        }
    }

    fn unavailable(&self, slot: &Slot<S>) -> SdkError {
        let message = match slot {
            Slot::Failed { reason, .. } => format!("{} handle is in a failed state: {}", self.service, reason),
            Slot::Unconfigured => format!("{} handle is not configured", self.service),
            Slot::Configured(_) => format!("{} handle is not connected", self.service),
            Slot::Closed => format!("{} handle is closed", self.service),
            Slot::Connected { .. } => format!("{} handle is connected", self.service),
        };
        SdkError::connection(message)
    }

    fn slot(&self) -> MutexGuard<'_, Slot<S>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

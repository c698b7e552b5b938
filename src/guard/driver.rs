//! Event-driven guard loop
//!
//! Re-evaluates the guard whenever the session, the location or the declared
//! requirements change, or a retry is requested. Only the most recent
//! evaluation can publish: starting a new one drops the one in flight.
//!
//! ```text
//!  session watch ─┐
//!                 ├─► select! ─► restart ─► publish Loading
//!  GuardEvent   ──┘      │
//!                        └─► evaluation resolves ─► publish view ─► audit
//! ```

use crate::access_control::{PermissionRequirement, Role};
use crate::guard::route_guard::RouteGuard;
use crate::guard::state::{GuardState, GuardView, Location};
use crate::session::SessionSnapshot;
use futures::FutureExt;
use futures::future::{BoxFuture, OptionFuture};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

const EVENT_BUFFER: usize = 32;

/// Inputs that trigger a re-evaluation, besides session changes
#[derive(Debug, Clone)]
pub enum GuardEvent {
    Navigate(Location),
    Requirements {
        role: Option<Role>,
        permission: Option<PermissionRequirement>,
    },
    /// Re-run after an error
    Retry,
}

/// Caller side of a running driver
#[derive(Clone)]
pub struct GuardHandle {
    events: mpsc::Sender<GuardEvent>,
    views: watch::Receiver<GuardView>,
}

impl GuardHandle {
    pub async fn send(
        &self,
        event: GuardEvent,
    ) -> Result<(), mpsc::error::SendError<GuardEvent>> {
        self.events.send(event).await
    }

    pub async fn navigate(
        &self,
        location: Location,
    ) -> Result<(), mpsc::error::SendError<GuardEvent>> {
        self.send(GuardEvent::Navigate(location)).await
    }

    pub async fn retry(&self) -> Result<(), mpsc::error::SendError<GuardEvent>> {
        self.send(GuardEvent::Retry).await
    }

    /// Latest published view
    pub fn view(&self) -> GuardView {
        self.views.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GuardView> {
        self.views.clone()
    }
}

type Evaluation = BoxFuture<'static, (GuardState, Location)>;

pub struct GuardDriver {
    guard: RouteGuard,
    location: Location,
    sessions: watch::Receiver<SessionSnapshot>,
    events: mpsc::Receiver<GuardEvent>,
    views: watch::Sender<GuardView>,
}

impl GuardDriver {
    pub fn new(
        guard: RouteGuard,
        sessions: watch::Receiver<SessionSnapshot>,
        location: Location,
    ) -> (Self, GuardHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let initial = guard.view(&GuardState::Idle, &location);
        let (view_tx, view_rx) = watch::channel(initial);

        let driver = Self {
            guard,
            location,
            sessions,
            events: event_rx,
            views: view_tx,
        };
        let handle = GuardHandle {
            events: event_tx,
            views: view_rx,
        };
        (driver, handle)
    }

    /// Spawn the loop on the current runtime
    pub fn spawn(
        guard: RouteGuard,
        sessions: watch::Receiver<SessionSnapshot>,
        location: Location,
    ) -> GuardHandle {
        let (driver, handle) = Self::new(guard, sessions, location);
        tokio::spawn(driver.run());
        handle
    }

    /// Drop any in-flight evaluation, publish the loading view and start over
    fn restart(&mut self, pending: &mut Option<Evaluation>) {
        let checking = if self.sessions.borrow().session.is_some() {
            GuardState::CheckingAccess
        } else {
            GuardState::CheckingAuth
        };
        self.views
            .send_replace(self.guard.view(&checking, &self.location));

        let guard = self.guard.clone();
        let location = self.location.clone();
        *pending = Some(
            async move {
                let state = guard.check(&location).await;
                (state, location)
            }
            .boxed(),
        );
    }

    /// Runs until the event sender or the session source goes away
    pub async fn run(mut self) {
        info!(path = %self.location.pathname, "Route guard started");
        self.sessions.mark_unchanged();

        let mut pending = None;
        self.restart(&mut pending);

        loop {
            tokio::select! {
                biased;

                changed = self.sessions.changed() => {
                    if changed.is_err() {
                        debug!("Session source closed");
                        break;
                    }
                    self.restart(&mut pending);
                }

                event = self.events.recv() => {
                    match event {
                        Some(GuardEvent::Navigate(location)) => self.location = location,
                        Some(GuardEvent::Requirements { role, permission }) => {
                            self.guard.set_requirements(role, permission);
                        }
                        Some(GuardEvent::Retry) => {}
                        None => {
                            debug!("Guard handle dropped");
                            break;
                        }
                    }
                    self.restart(&mut pending);
                }

                Some((state, location)) = OptionFuture::from(pending.as_mut()), if pending.is_some() => {
                    pending = None;
                    // Still loading: wait for the next session change
                    if !state.is_terminal() {
                        continue;
                    }
                    self.views.send_replace(self.guard.view(&state, &location));
                    self.guard.record(&state, &location);
                }
            }
        }

        info!(path = %self.location.pathname, "Route guard stopped");
    }
}

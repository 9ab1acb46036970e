//! Toggle coordinator: the refresh rate tile state machine.
//!
//! All state decisions happen on one thread (the lane). Platform calls run on
//! a second thread so the lane can keep answering, and rejecting, requests
//! while an apply is in flight. Callers talk to the lane through
//! [`ToggleCoordinator`].
//!
//! The worker runs one platform call at a time. An apply that outlives its
//! timeout is reported as failed but still occupies the worker, so new applies
//! are rejected until it returns. Reads answer "unknown" once their deadline
//! passes.

use crate::controller::RateController;
use crate::error::{RateError, ToggleError};
use crate::rate::RefreshRate;
use crate::store::ConfigStore;

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Label shown on the quick-access tile.
pub const TILE_LABEL: &str = "HyperFPS";

// =============================================================================
// Public Types
// =============================================================================

/// What the quick-access surface renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSnapshot {
    /// Tile title.
    pub label: String,
    /// Whether the on preset is the last one applied through the tile.
    pub is_active: bool,
    /// The preset matching `is_active`.
    pub subtitle_rate: RefreshRate,
}

/// Toggle state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Off preset applied.
    Off,
    /// On preset applied.
    On,
    /// A toggle is in flight.
    Applying {
        /// Rate being applied.
        target: RefreshRate,
        /// Whether success turns the tile on.
        target_on: bool,
    },
}

/// Pushed to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The tile entered a state, or a listener just subscribed.
    Snapshot(TileSnapshot),
    /// A toggle failed; `snapshot` is the unchanged pre-request state.
    ToggleFailed {
        /// State to keep rendering.
        snapshot: TileSnapshot,
        /// Why the apply failed.
        reason: RateError,
    },
    /// The informational applied rate changed. `None` means unknown.
    AppliedRate(Option<RefreshRate>),
}

/// Coordinator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// An apply that has not returned after this long counts as failed. A
    /// requested read of the current rate that takes longer reports unknown.
    pub apply_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            apply_timeout: Duration::from_secs(3),
        }
    }
}

/// A request submitted to the lane whose answer has not been collected yet.
#[must_use = "a pending request does nothing unless waited on"]
pub struct Pending<T> {
    rx: Receiver<Result<T, ToggleError>>,
}

impl<T> Pending<T> {
    /// Block until the lane answers.
    pub fn wait(self) -> Result<T, ToggleError> {
        self.rx.recv().unwrap_or(Err(ToggleError::Stopped))
    }

    /// The answer, if it has arrived.
    pub fn try_wait(&self) -> Option<Result<T, ToggleError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ToggleError::Stopped)),
        }
    }
}

// =============================================================================
// ToggleCoordinator
// =============================================================================

type Reply<T> = Sender<Result<T, ToggleError>>;

enum Command {
    Toggle(Reply<TileSnapshot>),
    SetRate(RefreshRate, Reply<RefreshRate>),
    Snapshot(Reply<TileSnapshot>),
    State(Reply<TileState>),
    AppliedRate(Reply<Option<RefreshRate>>),
    RefreshAppliedRate(Reply<Option<RefreshRate>>),
    Subscribe(Sender<Notification>),
    ApplyFinished {
        id: u64,
        result: Result<(), RateError>,
    },
    ReadFinished {
        id: u64,
        rate: Option<RefreshRate>,
    },
    Shutdown,
}

enum Job {
    Apply { id: u64, rate: RefreshRate },
    Read { id: u64 },
}

/// Handle to the running toggle state machine.
///
/// Dropping the handle stops the lane and waits for it. The apply worker is
/// not waited for; it exits once its current platform call returns.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use hyperfps_core::{
///     ConfigStore, CoordinatorOptions, MemoryConfigStore, MockRateController, ToggleCoordinator,
/// };
///
/// let store = Arc::new(MemoryConfigStore::new());
/// let coordinator = ToggleCoordinator::start(
///     store.clone(),
///     Arc::new(MockRateController::new()),
///     CoordinatorOptions::default(),
/// )?;
///
/// let snapshot = coordinator.toggle_requested().unwrap();
/// assert!(snapshot.is_active);
/// assert_eq!(snapshot.subtitle_rate.get(), 120);
/// assert!(store.toggle_state());
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct ToggleCoordinator {
    commands: Sender<Command>,
    lane: Option<JoinHandle<()>>,
}

impl ToggleCoordinator {
    /// Start the lane and the apply worker.
    ///
    /// The initial state is whatever `store` has persisted. The platform's
    /// current rate is read once in the background to seed the applied rate.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn start(
        store: Arc<dyn ConfigStore>,
        controller: Arc<dyn RateController>,
        options: CoordinatorOptions,
    ) -> std::io::Result<Self> {
        let (commands, command_rx) = mpsc::channel();
        let (jobs, job_rx) = mpsc::channel();

        let completions = commands.clone();
        thread::Builder::new()
            .name("hyperfps-apply".to_string())
            .spawn(move || run_worker(controller, job_rx, completions))?;

        let lane = Lane {
            store,
            jobs,
            options,
            in_flight: None,
            abandoned: None,
            reads: Vec::new(),
            applied_rate: None,
            next_id: 1,
            subscribers: Vec::new(),
        };
        let lane = thread::Builder::new()
            .name("hyperfps-lane".to_string())
            .spawn(move || lane.run(command_rx))?;

        Ok(Self {
            commands,
            lane: Some(lane),
        })
    }

    fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Pending<T> {
        let (tx, rx) = mpsc::channel();
        // If the lane is gone the reply sender is dropped with the command.
        let _ = self.commands.send(command(tx));
        Pending { rx }
    }

    /// Ask for a toggle without waiting for it to finish.
    pub fn request_toggle(&self) -> Pending<TileSnapshot> {
        self.request(Command::Toggle)
    }

    /// Toggle between the two presets.
    ///
    /// Returns the new snapshot on success. On failure the persisted state is
    /// untouched and subscribers receive [`Notification::ToggleFailed`].
    ///
    /// # Errors
    ///
    /// - [`ToggleError::Busy`] if another apply is in flight
    /// - [`ToggleError::Rate`] if the platform rejected the rate or timed out
    /// - [`ToggleError::Store`] if the new state could not be saved
    pub fn toggle_requested(&self) -> Result<TileSnapshot, ToggleError> {
        self.request_toggle().wait()
    }

    /// Ask for a one-shot rate change without waiting for it to finish.
    pub fn request_set_rate(&self, rate: RefreshRate) -> Pending<RefreshRate> {
        self.request(|reply| Command::SetRate(rate, reply))
    }

    /// Apply `rate` outside the toggle.
    ///
    /// Only the informational applied rate changes; the presets and toggle
    /// state are left alone.
    pub fn set_rate_directly(&self, rate: RefreshRate) -> Result<RefreshRate, ToggleError> {
        self.request_set_rate(rate).wait()
    }

    /// Current tile snapshot, built from persisted state.
    pub fn snapshot(&self) -> Result<TileSnapshot, ToggleError> {
        self.request(Command::Snapshot).wait()
    }

    /// Current state machine position.
    pub fn state(&self) -> Result<TileState, ToggleError> {
        self.request(Command::State).wait()
    }

    /// Last known applied rate, without touching the platform.
    pub fn applied_rate(&self) -> Result<Option<RefreshRate>, ToggleError> {
        self.request(Command::AppliedRate).wait()
    }

    /// Read the applied rate from the platform again.
    ///
    /// Answers `None` if the read does not finish within the apply timeout,
    /// including when the worker is still busy with an earlier call. A late
    /// result still updates [`applied_rate`](Self::applied_rate).
    pub fn refresh_applied_rate(&self) -> Result<Option<RefreshRate>, ToggleError> {
        self.request(Command::RefreshAppliedRate).wait()
    }

    /// Start listening for notifications.
    ///
    /// The current snapshot and applied rate are sent first. Call this again
    /// whenever the surface starts listening after having stopped.
    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        let _ = self.commands.send(Command::Subscribe(tx));
        rx
    }
}

impl Drop for ToggleCoordinator {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(lane) = self.lane.take() {
            if lane.join().is_err() {
                error!("toggle lane panicked");
            }
        }
    }
}

// =============================================================================
// Apply Worker
// =============================================================================

fn run_worker(controller: Arc<dyn RateController>, jobs: Receiver<Job>, lane: Sender<Command>) {
    for job in jobs {
        let command = match job {
            Job::Apply { id, rate } => {
                debug!("apply #{}: {} Hz", id, rate);
                Command::ApplyFinished {
                    id,
                    result: controller.apply(rate),
                }
            }
            Job::Read { id } => Command::ReadFinished {
                id,
                rate: controller.current_rate(),
            },
        };
        if lane.send(command).is_err() {
            break;
        }
    }
    debug!("apply worker stopped");
}

// =============================================================================
// Lane
// =============================================================================

struct InFlight {
    id: u64,
    deadline: Instant,
    kind: InFlightKind,
}

/// A timed-out apply the worker has not returned from yet.
struct Abandoned {
    id: u64,
    rate: RefreshRate,
}

struct PendingRead {
    id: u64,
    deadline: Instant,
    reply: Reply<Option<RefreshRate>>,
}

enum InFlightKind {
    Toggle {
        target: RefreshRate,
        target_on: bool,
        reply: Reply<TileSnapshot>,
    },
    Direct {
        rate: RefreshRate,
        reply: Reply<RefreshRate>,
    },
}

impl InFlightKind {
    fn rate(&self) -> RefreshRate {
        match self {
            InFlightKind::Toggle { target, .. } => *target,
            InFlightKind::Direct { rate, .. } => *rate,
        }
    }
}

struct Lane {
    store: Arc<dyn ConfigStore>,
    jobs: Sender<Job>,
    options: CoordinatorOptions,
    in_flight: Option<InFlight>,
    abandoned: Option<Abandoned>,
    reads: Vec<PendingRead>,
    applied_rate: Option<RefreshRate>,
    next_id: u64,
    subscribers: Vec<Sender<Notification>>,
}

impl Lane {
    fn run(mut self, commands: Receiver<Command>) {
        let seed = self.next_id();
        let _ = self.jobs.send(Job::Read { id: seed });

        loop {
            let command = match self.next_deadline() {
                Some(deadline) => {
                    match commands.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => {
                            self.expire(Instant::now());
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            if !self.handle(command) {
                break;
            }
        }
        debug!("toggle lane stopped");
    }

    /// Returns `false` once the lane should stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Toggle(reply) => self.begin_toggle(reply),
            Command::SetRate(rate, reply) => self.begin_direct(rate, reply),
            Command::Snapshot(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::State(reply) => {
                let _ = reply.send(Ok(self.state()));
            }
            Command::AppliedRate(reply) => {
                let _ = reply.send(Ok(self.applied_rate));
            }
            Command::RefreshAppliedRate(reply) => self.begin_read(reply),
            Command::Subscribe(tx) => {
                let greeting = [
                    Notification::Snapshot(self.snapshot()),
                    Notification::AppliedRate(self.applied_rate),
                ];
                if greeting.into_iter().all(|n| tx.send(n).is_ok()) {
                    self.subscribers.push(tx);
                }
            }
            Command::ApplyFinished { id, result } => self.finish(id, result),
            Command::ReadFinished { id, rate } => self.finish_read(id, rate),
            Command::Shutdown => return false,
        }
        true
    }

    fn snapshot(&self) -> TileSnapshot {
        let is_active = self.store.toggle_state();
        TileSnapshot {
            label: TILE_LABEL.to_string(),
            is_active,
            subtitle_rate: if is_active {
                self.store.on_rate()
            } else {
                self.store.off_rate()
            },
        }
    }

    fn state(&self) -> TileState {
        match &self.in_flight {
            Some(InFlight {
                kind: InFlightKind::Toggle {
                    target, target_on, ..
                },
                ..
            }) => TileState::Applying {
                target: *target,
                target_on: *target_on,
            },
            _ if self.store.toggle_state() => TileState::On,
            _ => TileState::Off,
        }
    }

    fn publish(&mut self, notification: Notification) {
        self.subscribers
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.in_flight
            .iter()
            .map(|f| f.deadline)
            .chain(self.reads.iter().map(|r| r.deadline))
            .min()
    }

    /// Why a new apply cannot start right now, if it cannot.
    fn busy_reason(&self) -> Option<String> {
        if let Some(in_flight) = &self.in_flight {
            Some(format!("apply #{} is in progress", in_flight.id))
        } else {
            self.abandoned.as_ref().map(|a| {
                format!("timed-out apply #{} ({} Hz) has not returned", a.id, a.rate)
            })
        }
    }

    fn dispatch(&mut self, rate: RefreshRate, kind: InFlightKind) {
        let id = self.next_id();

        if self.jobs.send(Job::Apply { id, rate }).is_err() {
            error!("apply worker is gone, dropping request for {} Hz", rate);
            match kind {
                InFlightKind::Toggle { reply, .. } => {
                    let _ = reply.send(Err(ToggleError::Stopped));
                }
                InFlightKind::Direct { reply, .. } => {
                    let _ = reply.send(Err(ToggleError::Stopped));
                }
            }
            return;
        }

        self.in_flight = Some(InFlight {
            id,
            deadline: Instant::now() + self.options.apply_timeout,
            kind,
        });
    }

    fn begin_toggle(&mut self, reply: Reply<TileSnapshot>) {
        if let Some(reason) = self.busy_reason() {
            warn!("toggle rejected: {}", reason);
            let _ = reply.send(Err(ToggleError::Busy));
            return;
        }

        let target_on = !self.store.toggle_state();
        let target = if target_on {
            self.store.on_rate()
        } else {
            self.store.off_rate()
        };
        info!(
            "toggling {} -> {} ({} Hz)",
            if target_on { "off" } else { "on" },
            if target_on { "on" } else { "off" },
            target
        );

        self.dispatch(
            target,
            InFlightKind::Toggle {
                target,
                target_on,
                reply,
            },
        );
    }

    fn begin_direct(&mut self, rate: RefreshRate, reply: Reply<RefreshRate>) {
        if let Some(reason) = self.busy_reason() {
            warn!("direct set to {} Hz rejected: {}", rate, reason);
            let _ = reply.send(Err(ToggleError::Busy));
            return;
        }

        info!("setting refresh rate directly to {} Hz", rate);
        self.dispatch(rate, InFlightKind::Direct { rate, reply });
    }

    fn begin_read(&mut self, reply: Reply<Option<RefreshRate>>) {
        let id = self.next_id();
        if self.jobs.send(Job::Read { id }).is_err() {
            let _ = reply.send(Err(ToggleError::Stopped));
            return;
        }
        self.reads.push(PendingRead {
            id,
            deadline: Instant::now() + self.options.apply_timeout,
            reply,
        });
    }

    fn finish_read(&mut self, id: u64, rate: Option<RefreshRate>) {
        self.applied_rate = rate;
        self.publish(Notification::AppliedRate(rate));

        match self.reads.iter().position(|r| r.id == id) {
            Some(index) => {
                let _ = self.reads.swap_remove(index).reply.send(Ok(rate));
            }
            None => debug!("read #{} finished with no one waiting: {:?}", id, rate),
        }
    }

    fn finish(&mut self, id: u64, result: Result<(), RateError>) {
        match self.in_flight.take() {
            Some(in_flight) if in_flight.id == id => {
                self.complete(in_flight.kind, result);
                return;
            }
            other => self.in_flight = other,
        }

        match self.abandoned.take() {
            Some(abandoned) if abandoned.id == id => match result {
                Ok(()) => {
                    // The display did change; only the tile stays as reported.
                    warn!(
                        "timed-out apply #{} finished late, display is at {} Hz",
                        id, abandoned.rate
                    );
                    self.applied_rate = Some(abandoned.rate);
                    self.publish(Notification::AppliedRate(Some(abandoned.rate)));
                }
                Err(e) => warn!("timed-out apply #{} failed late: {}", id, e),
            },
            other => {
                self.abandoned = other;
                warn!("ignoring result for unknown apply #{}: {:?}", id, result);
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        if let Some(in_flight) = self.in_flight.take_if(|f| f.deadline <= now) {
            let reason = RateError::Unknown(format!(
                "timed out after {} ms",
                self.options.apply_timeout.as_millis()
            ));
            warn!("apply #{} {}", in_flight.id, reason);
            self.abandoned = Some(Abandoned {
                id: in_flight.id,
                rate: in_flight.kind.rate(),
            });
            self.complete(in_flight.kind, Err(reason));
        }

        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.reads)
            .into_iter()
            .partition(|r| r.deadline <= now);
        self.reads = waiting;
        for read in expired {
            warn!("read #{} timed out, current rate unknown", read.id);
            let _ = read.reply.send(Ok(None));
        }
    }

    fn complete(&mut self, kind: InFlightKind, result: Result<(), RateError>) {
        match (kind, result) {
            (
                InFlightKind::Toggle {
                    target,
                    target_on,
                    reply,
                },
                Ok(()),
            ) => {
                self.applied_rate = Some(target);
                let saved = self.store.set_toggle_state(target_on);
                let snapshot = self.snapshot();
                self.publish(Notification::Snapshot(snapshot.clone()));
                self.publish(Notification::AppliedRate(Some(target)));

                match saved {
                    Ok(()) => {
                        info!("tile {} at {} Hz", if target_on { "on" } else { "off" }, target);
                        let _ = reply.send(Ok(snapshot));
                    }
                    Err(e) => {
                        error!("applied {} Hz but failed to save toggle state: {}", target, e);
                        let _ = reply.send(Err(ToggleError::Store(e)));
                    }
                }
            }
            (InFlightKind::Toggle { target, reply, .. }, Err(reason)) => {
                error!("toggle to {} Hz failed: {}", target, reason);
                let snapshot = self.snapshot();
                self.publish(Notification::ToggleFailed {
                    snapshot,
                    reason: reason.clone(),
                });
                let _ = reply.send(Err(ToggleError::Rate(reason)));
            }
            (InFlightKind::Direct { rate, reply }, Ok(())) => {
                self.applied_rate = Some(rate);
                self.publish(Notification::AppliedRate(Some(rate)));
                let _ = reply.send(Ok(rate));
            }
            (InFlightKind::Direct { rate, reply }, Err(reason)) => {
                error!("direct set to {} Hz failed: {}", rate, reason);
                let _ = reply.send(Err(ToggleError::Rate(reason)));
            }
        }
    }
}

//! [`Dashboard`] – the mode switcher and the single owner of dashboard state.
//!
//! The dashboard runs as one task.  It owns the [`SampleStore`], the
//! [`ReconnectController`] and the current [`DataSourceMode`]; nothing else
//! mutates them, so no lock is involved.  Everything that waits (polls,
//! negotiation, the WebSocket, retry timers) runs in helper tasks that report
//! back through an internal channel.
//!
//! ```text
//!   DashboardHandle ──commands──▶ ┌──────────────────────────┐
//!                                 │ Dashboard::run (select!) │──▶ DisplaySink
//!   poll tasks      ──internal──▶ │  SampleStore             │
//!   channel task    ──internal──▶ │  ReconnectController     │
//!   retry timer     ──internal──▶ └──────────────────────────┘
//!                                        ▲
//!                                 interval tick (poll cadence)
//! ```
//!
//! # Staleness
//!
//! * Every mode change increments an **epoch**.  A poll result is committed
//!   only if its epoch is still current when it arrives, so a database cycle
//!   started before a switch never lands after it.
//! * Every channel attempt carries the controller's **generation**.  Events
//!   from a torn-down attempt are dropped by the controller.
//!
//! Helper tasks are aborted on teardown; the tags above cover whatever was
//! already queued.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use heatex_kernel::{BackoffPolicy, CloseOutcome, CloseReason, ReconnectController, RetryDecision};
use heatex_middleware::{
    ChannelConnector, ChannelEvent, Negotiator, PushMessage, ReadingSource, parse_push_message,
};
use heatex_types::{
    ChannelState, DashboardError, DataSourceMode, DisplayUpdate, Reading, ReconnectStatus,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::display::DisplaySink;
use crate::sample_store::SampleStore;
use crate::status::{ChannelDetail, StatusInputs, status_label};

/// Default polling cadence for the simulator and database modes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

const COMMAND_QUEUE: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub initial_mode: DataSourceMode,
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            initial_mode: DataSourceMode::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// The collaborators behind each mode.
#[derive(Clone)]
pub struct DataSources {
    pub simulator: Arc<dyn ReadingSource>,
    pub database: Arc<dyn ReadingSource>,
    pub negotiator: Arc<dyn Negotiator>,
    pub connector: Arc<dyn ChannelConnector>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

enum Command {
    SetMode(DataSourceMode, oneshot::Sender<ReconnectStatus>),
    ManualReconnect(oneshot::Sender<Result<ReconnectStatus, DashboardError>>),
    Status(oneshot::Sender<ReconnectStatus>),
    Snapshot(oneshot::Sender<DisplayUpdate>),
    Commit(Reading, oneshot::Sender<DisplayUpdate>),
    Shutdown(oneshot::Sender<()>),
}

enum Internal {
    PollFinished {
        epoch: u64,
        result: Result<Reading, DashboardError>,
    },
    Channel {
        generation: u64,
        signal: ChannelSignal,
    },
    RetryDue {
        generation: u64,
    },
}

enum ChannelSignal {
    Opened,
    Message(String),
    Closed(CloseReason),
    NegotiationFailed(DashboardError),
}

// ─────────────────────────────────────────────────────────────────────────────
// DashboardHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Cheap, cloneable operator handle to a running [`Dashboard`].
///
/// Every method fails with [`DashboardError::Shutdown`] once the dashboard
/// has stopped.
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<Command>,
}

impl DashboardHandle {
    /// Select the active data source.  Selecting the current mode is a no-op.
    pub async fn set_mode(&self, mode: DataSourceMode) -> Result<ReconnectStatus, DashboardError> {
        self.request(|tx| Command::SetMode(mode, tx)).await
    }

    /// Reset the retry budget and reconnect the realtime channel.
    ///
    /// Fails with [`DashboardError::ModeMismatch`] outside realtime mode.
    pub async fn manual_reconnect(&self) -> Result<ReconnectStatus, DashboardError> {
        self.request(Command::ManualReconnect).await?
    }

    pub async fn status(&self) -> Result<ReconnectStatus, DashboardError> {
        self.request(Command::Status).await
    }

    /// The current reading, efficiency, history and status label.
    pub async fn snapshot(&self) -> Result<DisplayUpdate, DashboardError> {
        self.request(Command::Snapshot).await
    }

    /// Commit a reading supplied by the operator, regardless of mode.
    pub async fn commit(&self, reading: Reading) -> Result<DisplayUpdate, DashboardError> {
        self.request(|tx| Command::Commit(reading, tx)).await
    }

    /// Tear down the active data source and stop the dashboard loop.
    pub async fn shutdown(&self) -> Result<(), DashboardError> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DashboardError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| DashboardError::Shutdown)?;
        rx.await.map_err(|_| DashboardError::Shutdown)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────────────────────────

pub struct Dashboard {
    config: DashboardConfig,
    sources: DataSources,
    sink: Arc<dyn DisplaySink>,
    user_id: String,

    mode: DataSourceMode,
    epoch: u64,
    /// Epoch of the poll currently running, if any.
    poll_in_flight: Option<u64>,
    store: SampleStore,
    controller: ReconnectController,
    detail: ChannelDetail,

    channel_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,

    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl Dashboard {
    pub fn new(
        config: DashboardConfig,
        sources: DataSources,
        sink: Arc<dyn DisplaySink>,
    ) -> (Self, DashboardHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let controller = ReconnectController::new(config.backoff);
        let dashboard = Self {
            mode: config.initial_mode,
            config,
            sources,
            sink,
            user_id: format!("dashboard_{}", Uuid::new_v4().simple()),
            epoch: 0,
            poll_in_flight: None,
            store: SampleStore::new(),
            controller,
            detail: ChannelDetail::default(),
            channel_task: None,
            retry_task: None,
            commands,
            internal_tx,
            internal_rx,
        };
        (dashboard, DashboardHandle {
            commands: command_tx,
        })
    }

    /// Drive the dashboard until [`DashboardHandle::shutdown`] is called or
    /// every handle is dropped.
    pub async fn run(mut self) {
        info!(mode = %self.mode, user_id = %self.user_id, "dashboard starting");
        if self.mode == DataSourceMode::RealtimeChannel {
            self.connect_channel();
        }
        self.render();
        self.notify_channel();

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.teardown_channel();
                        break;
                    }
                },
                Some(event) = self.internal_rx.recv() => self.handle_internal(event),
                _ = ticker.tick() => self.on_tick(),
            }
        }
        info!("dashboard stopped");
    }

    // ── operator commands ────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::SetMode(mode, reply) => {
                self.set_mode(mode);
                let _ = reply.send(self.status());
            }
            Command::ManualReconnect(reply) => {
                let _ = reply.send(self.manual_reconnect());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.store.snapshot(self.status_label()));
            }
            Command::Commit(reading, reply) => {
                self.store.commit(reading);
                self.render();
                let _ = reply.send(self.store.snapshot(self.status_label()));
            }
            Command::Shutdown(reply) => {
                self.teardown_channel();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn set_mode(&mut self, mode: DataSourceMode) {
        if mode == self.mode {
            debug!(mode = %mode, "mode unchanged");
            return;
        }
        info!(from = %self.mode, to = %mode, "switching data source");
        if self.mode == DataSourceMode::RealtimeChannel {
            self.teardown_channel();
        }
        self.mode = mode;
        self.epoch += 1;
        if mode == DataSourceMode::RealtimeChannel {
            self.connect_channel();
        }
        self.render();
        self.notify_channel();
    }

    fn manual_reconnect(&mut self) -> Result<ReconnectStatus, DashboardError> {
        if self.mode != DataSourceMode::RealtimeChannel {
            return Err(DashboardError::ModeMismatch {
                expected: DataSourceMode::RealtimeChannel,
                current: self.mode,
            });
        }
        self.abort_tasks();
        self.detail = ChannelDetail::default();
        let generation = self.controller.manual_reconnect();
        self.spawn_channel(generation);
        self.render();
        self.notify_channel();
        Ok(self.status())
    }

    // ── polling ──────────────────────────────────────────────────────────────

    fn on_tick(&mut self) {
        let source = match self.mode {
            DataSourceMode::Simulator => self.sources.simulator.clone(),
            DataSourceMode::DatabaseRoundTrip => self.sources.database.clone(),
            DataSourceMode::RealtimeChannel => return,
        };
        if self.poll_in_flight == Some(self.epoch) {
            debug!(source = source.name(), "previous poll still running, tick skipped");
            return;
        }
        self.poll_in_flight = Some(self.epoch);
        let epoch = self.epoch;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = source.produce_reading().await;
            let _ = tx.send(Internal::PollFinished { epoch, result });
        });
    }

    fn on_poll_finished(&mut self, epoch: u64, result: Result<Reading, DashboardError>) {
        if self.poll_in_flight == Some(epoch) {
            self.poll_in_flight = None;
        }
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding reading from previous mode");
            return;
        }
        match result {
            Ok(reading) => {
                let efficiency = self.store.commit(reading);
                debug!(mode = %self.mode, efficiency, "reading committed");
                self.render();
            }
            Err(e) => warn!(mode = %self.mode, error = %e, "poll failed, keeping last reading"),
        }
    }

    // ── realtime channel ─────────────────────────────────────────────────────

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::PollFinished { epoch, result } => self.on_poll_finished(epoch, result),
            Internal::Channel { generation, signal } => self.on_channel_signal(generation, signal),
            Internal::RetryDue { generation } => self.on_retry_due(generation),
        }
    }

    fn connect_channel(&mut self) {
        self.detail = ChannelDetail::default();
        if let Some(generation) = self.controller.connect() {
            self.spawn_channel(generation);
        }
    }

    fn spawn_channel(&mut self, generation: u64) {
        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
        let negotiator = self.sources.negotiator.clone();
        let connector = self.sources.connector.clone();
        let user_id = self.user_id.clone();
        let tx = self.internal_tx.clone();
        let send = move |signal| {
            let _ = tx.send(Internal::Channel { generation, signal });
        };

        self.channel_task = Some(tokio::spawn(async move {
            let descriptor = match negotiator.negotiate(&user_id).await {
                Ok(descriptor) => descriptor,
                Err(e) => return send(ChannelSignal::NegotiationFailed(e)),
            };
            let mut events = match connector.connect(&descriptor).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(generation, error = %e, "realtime channel connect failed");
                    return send(ChannelSignal::Closed(CloseReason::Abnormal(None)));
                }
            };
            send(ChannelSignal::Opened);
            while let Some(event) = events.next().await {
                match event {
                    ChannelEvent::Message(text) => send(ChannelSignal::Message(text)),
                    ChannelEvent::Closed(reason) => return send(ChannelSignal::Closed(reason)),
                }
            }
            send(ChannelSignal::Closed(CloseReason::Abnormal(None)));
        }));
    }

    fn on_channel_signal(&mut self, generation: u64, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Opened => {
                if self.controller.on_open(generation) {
                    self.detail = ChannelDetail::default();
                    self.render();
                    self.notify_channel();
                }
            }
            ChannelSignal::Message(text) => self.on_push(generation, &text),
            ChannelSignal::Closed(reason) => self.on_closed(generation, reason),
            // No socket was ever opened, so the retry budget is left alone.
            ChannelSignal::NegotiationFailed(e) => {
                if self.controller.on_negotiation_rejected(generation) {
                    warn!(error = %e, configuration = e.is_configuration(), "realtime negotiation failed");
                    self.channel_task = None;
                    self.detail.failure = Some(failure_reason(&e));
                    self.render();
                    self.notify_channel();
                }
            }
        }
    }

    fn on_push(&mut self, generation: u64, text: &str) {
        if self.mode != DataSourceMode::RealtimeChannel
            || !self.controller.is_current(generation)
            || self.controller.state() != ChannelState::Open
        {
            debug!(generation, "push from inactive channel dropped");
            return;
        }
        match parse_push_message(text) {
            Ok(PushMessage::Temperature(reading)) => {
                let efficiency = self.store.commit(reading);
                debug!(efficiency, "realtime reading committed");
                self.render();
            }
            Ok(PushMessage::Other(kind)) => debug!(kind = %kind, "ignoring non-temperature message"),
            Err(e) => warn!(error = %e, "ignoring push message"),
        }
    }

    fn on_closed(&mut self, generation: u64, reason: CloseReason) {
        match self.controller.on_closed(generation, reason) {
            CloseOutcome::Stale => return,
            CloseOutcome::Disconnected => {}
            CloseOutcome::RetryScheduled { delay, attempt } => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "realtime reconnect scheduled");
                let tx = self.internal_tx.clone();
                if let Some(task) = self.retry_task.take() {
                    task.abort();
                }
                self.retry_task = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Internal::RetryDue { generation });
                }));
            }
            CloseOutcome::Exhausted => {}
        }
        self.channel_task = None;
        self.detail.last_close = Some(reason);
        self.render();
        self.notify_channel();
    }

    fn on_retry_due(&mut self, generation: u64) {
        let still_selected = self.mode == DataSourceMode::RealtimeChannel;
        match self.controller.on_retry_due(generation, still_selected) {
            RetryDecision::Stale => return,
            RetryDecision::Abandoned => {}
            RetryDecision::Reconnect(next) => self.spawn_channel(next),
        }
        self.retry_task = None;
        self.render();
        self.notify_channel();
    }

    /// Return the channel to `Idle` and cancel everything it had in flight.
    fn teardown_channel(&mut self) {
        self.controller.teardown();
        self.abort_tasks();
        self.detail = ChannelDetail::default();
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
    }

    // ── output ───────────────────────────────────────────────────────────────

    fn status(&self) -> ReconnectStatus {
        ReconnectStatus {
            mode: self.mode,
            attempt_count: self.controller.attempt_count(),
            max_attempts: self.controller.max_attempts(),
            has_pending_retry: self.controller.has_pending_retry(),
            channel_state: self.controller.state(),
        }
    }

    fn status_label(&self) -> String {
        status_label(StatusInputs {
            mode: self.mode,
            state: self.controller.state(),
            attempt_count: self.controller.attempt_count(),
            max_attempts: self.controller.max_attempts(),
            detail: &self.detail,
        })
    }

    fn render(&self) {
        self.sink.render(&self.store.snapshot(self.status_label()));
    }

    fn notify_channel(&self) {
        self.sink.channel_changed(&self.status());
    }
}

fn failure_reason(err: &DashboardError) -> String {
    match err {
        DashboardError::Config(reason) | DashboardError::Negotiation(reason) => reason.clone(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

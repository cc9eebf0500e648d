//! Node façade and single-threaded event loop.
//!
//! A [`Node`] owns the transport, the pending-Interest and registered-prefix
//! tables, and the registration state. One logical thread drives everything:
//! the event loop multiplexes inbound frames, the 100 ms expiry timer, and
//! the stop signal; application callbacks run to completion on that thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, MissedTickBehavior};

use rust_ndnc_common::ndn::{Data, ForwardingFlags, Interest, Name};
use rust_ndnc_common::tlv::{TLV_DATA, TLV_INTEREST};
use rust_ndnc_common::{Error, Result};

use crate::clock::{Clock, MonotonicClock};
use crate::metrics::NodeMetrics;
use crate::pit::{OnData, OnTimeout, PendingInterest, PendingInterestTable, PitCallbacks};
use crate::registration::{self, OnRegisterFailed, PendingRegistration, RegistrationState};
use crate::rpt::{OnInterest, RegisteredPrefixTable};
use crate::transport::Transport;
use crate::{MAX_PACKET_SIZE, TIMER_INTERVAL};

/// Clonable handle asking the event loop to terminate.
///
/// Safe to use from application callbacks or other tasks; the loop finishes
/// its current iteration and returns.
#[derive(Clone)]
pub struct StopHandle {
    inner: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.inner.notify_one();
    }
}

/// Operations posted onto the event loop.
enum Command {
    ExpressInterest {
        interest: Interest,
        on_data: Option<OnData>,
        on_timeout: Option<OnTimeout>,
    },
    RemovePendingInterest(u64),
    RegisterPrefix {
        prefix: Name,
        on_interest: OnInterest,
        on_register_failed: Option<OnRegisterFailed>,
        flags: ForwardingFlags,
    },
    RemoveRegisteredPrefix(u64),
}

/// Clonable handle that posts operations onto the event loop.
///
/// This is how application callbacks re-enter the node: a Data callback may
/// re-express an Interest, an Interest handler may register another prefix.
/// Posted operations are fire-and-forget; they run on the loop thread after
/// the current dispatch completes, in posting order.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl NodeHandle {
    pub fn express_interest(
        &self,
        interest: Interest,
        on_data: Option<OnData>,
        on_timeout: Option<OnTimeout>,
    ) -> Result<()> {
        self.post(Command::ExpressInterest {
            interest,
            on_data,
            on_timeout,
        })
    }

    pub fn remove_pending_interest(&self, id: u64) -> Result<()> {
        self.post(Command::RemovePendingInterest(id))
    }

    pub fn register_prefix(
        &self,
        prefix: Name,
        on_interest: OnInterest,
        on_register_failed: Option<OnRegisterFailed>,
        flags: ForwardingFlags,
    ) -> Result<()> {
        self.post(Command::RegisterPrefix {
            prefix,
            on_interest,
            on_register_failed,
            flags,
        })
    }

    pub fn remove_registered_prefix(&self, id: u64) -> Result<()> {
        self.post(Command::RemoveRegisteredPrefix(id))
    }

    fn post(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Other("node is gone".into()))
    }
}

/// An NDN client node bound to one forwarder connection.
pub struct Node {
    transport: Box<dyn Transport>,
    clock: MonotonicClock,
    pit: PendingInterestTable,
    rpt: RegisteredPrefixTable,
    ndnd_id: Bytes,
    registration: RegistrationState,
    sink_tx: mpsc::UnboundedSender<Bytes>,
    sink_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Option<mpsc::UnboundedReceiver<Command>>,
    stop: Arc<Notify>,
    running: bool,
    metrics: Arc<NodeMetrics>,
}

impl Node {
    /// Creates a node over the given transport. The connection itself is
    /// established lazily, on the first express or registration.
    pub fn new(transport: impl Transport + 'static) -> Self {
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            transport: Box::new(transport),
            clock: MonotonicClock::new(),
            pit: PendingInterestTable::new(),
            rpt: RegisteredPrefixTable::new(),
            ndnd_id: Bytes::new(),
            registration: RegistrationState::Idle,
            sink_tx,
            sink_rx: Some(sink_rx),
            command_tx,
            command_rx: Some(command_rx),
            stop: Arc::new(Notify::new()),
            running: false,
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    /// Expresses an Interest; `on_data` fires when matching Data arrives,
    /// `on_timeout` when the lifetime elapses first. Returns an id usable
    /// with [`Node::remove_pending_interest`].
    pub async fn express_interest(
        &mut self,
        interest: Interest,
        on_data: Option<OnData>,
        on_timeout: Option<OnTimeout>,
    ) -> Result<u64> {
        self.ensure_connected().await?;
        let wire = interest.to_wire()?;
        debug!("[Node] express Interest {}", interest.name);
        let id = self.pit.insert(
            interest,
            PitCallbacks::App {
                on_data,
                on_timeout,
            },
            self.clock.now_ms(),
        );
        if let Err(e) = self.send_frame(wire) {
            // A failed send leaves no table entry behind.
            self.pit.remove_by_id(id);
            return Err(e);
        }
        self.metrics.interests_expressed.increment();
        self.metrics.pending_interests.set(self.pit.len() as u64);
        Ok(id)
    }

    /// Abandons a pending Interest. Idempotent: a no-op if the entry has
    /// already fired or been removed.
    pub fn remove_pending_interest(&mut self, id: u64) {
        self.pit.remove_by_id(id);
        self.metrics.pending_interests.set(self.pit.len() as u64);
    }

    /// Registers `prefix` with the forwarder and installs `on_interest` for
    /// Interests arriving under it. Returns an id usable with
    /// [`Node::remove_registered_prefix`], allocated before any network
    /// exchange so the caller always holds a cancel handle.
    pub async fn register_prefix(
        &mut self,
        prefix: Name,
        on_interest: OnInterest,
        on_register_failed: Option<OnRegisterFailed>,
        flags: ForwardingFlags,
    ) -> Result<u64> {
        self.ensure_connected().await?;
        let id = self.rpt.allocate_id();
        let reg = PendingRegistration {
            id,
            prefix,
            on_interest,
            on_register_failed,
            flags,
        };

        if !self.ndnd_id.is_empty() {
            self.complete_registration(reg)?;
            return Ok(id);
        }

        if self.registration.is_probing() {
            debug!(
                "[Node] ndnd-ID probe already in flight, queueing registration for {}",
                reg.prefix
            );
            if let RegistrationState::AwaitingNdndId { pending } = &mut self.registration {
                pending.push(reg);
            }
            return Ok(id);
        }

        let probe = registration::make_probe_interest();
        let wire = probe.to_wire()?;
        let probe_id = self
            .pit
            .insert(probe, PitCallbacks::NdndIdProbe, self.clock.now_ms());
        if let Err(e) = self.send_frame(wire) {
            self.pit.remove_by_id(probe_id);
            return Err(e);
        }
        info!("[Node] fetching ndnd-ID before registering {}", reg.prefix);
        self.registration = RegistrationState::AwaitingNdndId { pending: vec![reg] };
        Ok(id)
    }

    /// Unregisters a prefix handler. Idempotent.
    ///
    /// Only the local table is updated; the legacy protocol has no
    /// unregistration exchange.
    pub fn remove_registered_prefix(&mut self, id: u64) {
        self.rpt.remove_by_id(id);
    }

    /// Runs the event loop until stopped or the transport closes its
    /// receive side. Fails with [`Error::AlreadyRunning`] if the loop is
    /// already active.
    pub async fn process_events(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::AlreadyRunning);
        }
        let mut sink_rx = self.sink_rx.take().ok_or(Error::AlreadyRunning)?;
        let mut command_rx = self.command_rx.take().ok_or(Error::AlreadyRunning)?;
        self.running = true;

        let mut ticker = interval(TIMER_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("[Node] event loop started");

        loop {
            let stop = Arc::clone(&self.stop);
            tokio::select! {
                _ = stop.notified() => {
                    debug!("[Node] stop requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.on_timer_tick();
                }
                frame = sink_rx.recv() => match frame {
                    Some(frame) => self.dispatch_frame(frame),
                    None => {
                        warn!("[Node] receive channel closed");
                        break;
                    }
                },
                command = command_rx.recv() => {
                    // The node holds its own sender, so this arm never sees
                    // a closed channel.
                    if let Some(command) = command {
                        self.apply_command(command).await;
                    }
                }
            }
        }

        self.sink_rx = Some(sink_rx);
        self.command_rx = Some(command_rx);
        self.running = false;
        debug!("[Node] event loop stopped");
        Ok(())
    }

    /// Runs one posted operation; failures are logged, not fatal.
    async fn apply_command(&mut self, command: Command) {
        match command {
            Command::ExpressInterest {
                interest,
                on_data,
                on_timeout,
            } => {
                let name = interest.name.clone();
                if let Err(e) = self.express_interest(interest, on_data, on_timeout).await {
                    warn!("[Node] posted Interest {} failed: {}", name, e);
                }
            }
            Command::RemovePendingInterest(id) => self.remove_pending_interest(id),
            Command::RegisterPrefix {
                prefix,
                on_interest,
                on_register_failed,
                flags,
            } => {
                let name = prefix.clone();
                if let Err(e) = self
                    .register_prefix(prefix, on_interest, on_register_failed, flags)
                    .await
                {
                    warn!("[Node] posted registration for {} failed: {}", name, e);
                }
            }
            Command::RemoveRegisteredPrefix(id) => self.remove_registered_prefix(id),
        }
    }

    /// Handle for posting operations onto the event loop from callbacks or
    /// other tasks.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            commands: self.command_tx.clone(),
        }
    }

    /// Handle that can stop the event loop from callbacks or other tasks.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            inner: Arc::clone(&self.stop),
        }
    }

    /// Requests loop termination and closes the transport.
    ///
    /// Outstanding pending Interests are abandoned without callbacks.
    pub async fn shutdown(&mut self) {
        info!("[Node] shutting down");
        self.stop.notify_one();
        self.transport.close().await;
    }

    pub fn metrics(&self) -> Arc<NodeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Forwarder identity learned from the probe; empty until then.
    pub fn ndnd_id(&self) -> &Bytes {
        &self.ndnd_id
    }

    pub fn pending_interest_count(&self) -> usize {
        self.pit.len()
    }

    pub fn registered_prefix_count(&self) -> usize {
        self.rpt.len()
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        debug!("[Node] connecting transport");
        self.transport.connect(self.sink_tx.clone()).await
    }

    fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        self.metrics.bytes_sent.add(frame.len() as u64);
        self.transport.send(frame)
    }

    /* ------------------------------------------------------------ *
     * Receive dispatch
     * ------------------------------------------------------------ */

    /// Classifies one inbound frame by its leading TLV type and routes it.
    /// Undecodable or unknown frames are dropped; the loop continues.
    fn dispatch_frame(&mut self, frame: Bytes) {
        self.metrics.bytes_received.add(frame.len() as u64);
        if frame.is_empty() {
            trace!("[Node] dropping empty frame");
            return;
        }
        if frame.len() > MAX_PACKET_SIZE {
            warn!("[Node] dropping oversized frame ({} bytes)", frame.len());
            return;
        }
        match frame[0] {
            TLV_INTEREST => match Interest::from_wire(&frame) {
                Ok(interest) => self.handle_incoming_interest(interest),
                Err(e) => debug!("[Node] dropping undecodable Interest: {}", e),
            },
            TLV_DATA => match Data::from_wire(&frame) {
                Ok(data) => self.handle_incoming_data(data),
                Err(e) => debug!("[Node] dropping undecodable Data: {}", e),
            },
            other => trace!("[Node] dropping frame with unknown type {:#04x}", other),
        }
    }

    fn handle_incoming_interest(&mut self, interest: Interest) {
        self.metrics.interests_received.increment();
        let entry = match self.rpt.longest_match_mut(&interest.name) {
            Some(entry) => entry,
            None => {
                debug!("[Node] no registered prefix for {}", interest.name);
                return;
            }
        };
        trace!(
            "[Node] dispatching Interest {} to prefix {} (id={})",
            interest.name,
            entry.prefix,
            entry.id
        );
        let transport = self.transport.as_mut();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            (entry.on_interest)(&entry.prefix, &interest, transport, entry.id)
        }));
        if outcome.is_err() {
            error!("[Node] Interest handler for {} panicked", interest.name);
        }
    }

    fn handle_incoming_data(&mut self, data: Data) {
        self.metrics.data_received.increment();
        let entry = match self.pit.match_incoming(&data.name) {
            Some(entry) => entry,
            None => {
                trace!("[Node] no pending Interest for {}", data.name);
                return;
            }
        };
        self.metrics.pending_interests.set(self.pit.len() as u64);

        // The entry is already out of the table: the callback may
        // re-express the same name without racing its own entry.
        match entry.callbacks {
            PitCallbacks::App { on_data, .. } => {
                self.metrics.interests_satisfied.increment();
                trace!("[Node] Data {} satisfies entry id={}", data.name, entry.id);
                if let Some(on_data) = on_data {
                    let interest = entry.interest;
                    if catch_unwind(AssertUnwindSafe(|| on_data(&interest, &data))).is_err() {
                        error!("[Node] Data callback for {} panicked", data.name);
                    }
                }
            }
            PitCallbacks::NdndIdProbe => self.handle_probe_reply(&data),
        }
    }

    /* ------------------------------------------------------------ *
     * Timer
     * ------------------------------------------------------------ */

    fn on_timer_tick(&mut self) {
        // The clock is re-read every round: a slow timeout callback may
        // push later entries past their deadlines within this same tick.
        loop {
            let expired = self.pit.sweep_expired(self.clock.now_ms());
            if expired.is_empty() {
                break;
            }
            for entry in expired {
                self.fire_timeout(entry);
            }
        }
        self.metrics.pending_interests.set(self.pit.len() as u64);
    }

    fn fire_timeout(&mut self, entry: PendingInterest) {
        match entry.callbacks {
            PitCallbacks::App { on_timeout, .. } => {
                self.metrics.interests_timed_out.increment();
                trace!(
                    "[Node] Interest {} timed out (id={})",
                    entry.interest.name,
                    entry.id
                );
                if let Some(on_timeout) = on_timeout {
                    let interest = entry.interest;
                    if catch_unwind(AssertUnwindSafe(|| on_timeout(&interest))).is_err() {
                        error!("[Node] timeout callback for {} panicked", interest.name);
                    }
                }
            }
            PitCallbacks::NdndIdProbe => {
                warn!("[Node] ndnd-ID probe timed out");
                self.fail_pending_registrations();
            }
        }
    }

    /* ------------------------------------------------------------ *
     * Registration
     * ------------------------------------------------------------ */

    /// Builds and sends the self-registration Interest; the handler goes
    /// live before the send so an Interest arriving during the exchange
    /// cannot miss it.
    fn complete_registration(&mut self, reg: PendingRegistration) -> Result<()> {
        let interest = registration::make_selfreg_interest(&reg.prefix, &self.ndnd_id, reg.flags)?;
        let wire = interest.to_wire()?;
        self.rpt.insert_with_id(reg.id, reg.prefix.clone(), reg.on_interest);
        if let Err(e) = self.send_frame(wire) {
            self.rpt.remove_by_id(reg.id);
            return Err(e);
        }
        self.metrics.registrations_completed.increment();
        info!("[Node] registered prefix {} (id={})", reg.prefix, reg.id);
        Ok(())
    }

    fn handle_probe_reply(&mut self, data: &Data) {
        match registration::extract_ndnd_id(data) {
            Some(ndnd_id) => {
                info!("[Node] learned ndnd-ID ({} bytes)", ndnd_id.len());
                self.ndnd_id = ndnd_id;
                for mut reg in self.registration.take_pending() {
                    let on_failed = reg.on_register_failed.take();
                    let prefix = reg.prefix.clone();
                    if let Err(e) = self.complete_registration(reg) {
                        warn!("[Node] self-registration for {} failed: {}", prefix, e);
                        self.metrics.registrations_failed.increment();
                        Self::fire_register_failed(on_failed, &prefix);
                    }
                }
            }
            None => {
                warn!("[Node] probe reply carried no key locator");
                self.fail_pending_registrations();
            }
        }
    }

    fn fail_pending_registrations(&mut self) {
        for mut reg in self.registration.take_pending() {
            self.metrics.registrations_failed.increment();
            let on_failed = reg.on_register_failed.take();
            Self::fire_register_failed(on_failed, &reg.prefix);
        }
    }

    fn fire_register_failed(on_failed: Option<OnRegisterFailed>, prefix: &Name) {
        if let Some(on_failed) = on_failed {
            if catch_unwind(AssertUnwindSafe(|| on_failed(prefix))).is_err() {
                error!(
                    "[Node] registration-failure callback for {} panicked",
                    prefix
                );
            }
        }
    }
}

#[cfg(test)]
mod tests;

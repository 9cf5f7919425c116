//! Lifecycle: wires the table, transport, and four periodic tasks together
//! and exposes the single entry point external collaborators use.
//!
//! [`Engine::start`] binds the socket, seeds the table, spawns the
//! listener/announcer/monitor/printer tasks plus an operator-command task,
//! emits the initial presence round, and returns a [`Handle`] the caller
//! uses to submit operator commands and eventually shut everything down.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::codec::{self, Message};
use crate::config::Timing;
use crate::error::EngineError;
use crate::forwarder::{self, ForwardAction};
use crate::table::{self, RoutingTable, TableDiff};
use crate::transport::{rebind_after_backoff, Transport};

/// Bounded timeout `Handle::shutdown` allows each task to wind down in.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands the operator front-end (a CLI, a test harness, anything) feeds
/// into a running engine. This is the one channel that crosses the
/// core/collaborator boundary in the running direction.
#[derive(Debug, Clone)]
pub enum OperatorCommand {
    /// Submit a text message for delivery to `dest`.
    SendText { dest: IpAddr, payload: String },
    /// Print the current table immediately.
    PrintTable,
}

/// A text message delivered locally because this node was its destination.
/// Per spec.md §4.7, this is reported "to the operator sink"; `router-cli`
/// does that via a `tracing::info!` event, and a caller that wants to
/// observe deliveries directly (a test harness) can subscribe via
/// [`Engine::start_with_delivery_sink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub origin: IpAddr,
    pub payload: String,
}

struct EngineState {
    self_addr: IpAddr,
    port: u16,
    timing: Timing,
    table: Mutex<RoutingTable>,
    transport: RwLock<Transport>,
    broadcast_tx: mpsc::Sender<()>,
    delivery_tx: Option<mpsc::Sender<Delivery>>,
}

/// Namespace for starting an engine; holds no state of its own beyond what
/// `start` builds and hands off through [`Handle`].
pub struct Engine;

/// Everything needed to drive and eventually stop a running engine.
pub struct Handle {
    state: Arc<EngineState>,
    tasks: Vec<JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
    operator_tx: mpsc::Sender<OperatorCommand>,
}

impl Handle {
    /// A sender external collaborators (the CLI's stdin loop) use to submit
    /// [`OperatorCommand`]s.
    pub fn operator_sender(&self) -> mpsc::Sender<OperatorCommand> {
        self.operator_tx.clone()
    }

    /// This node's own address.
    pub fn self_addr(&self) -> IpAddr {
        self.state.self_addr
    }

    /// Snapshot the current route for one destination. Exposed for test
    /// harnesses and any collaborator that wants to inspect engine state
    /// without going through the table-print textual format.
    pub async fn route(&self, dest: IpAddr) -> Option<table::RouteEntry> {
        self.state.table.lock().await.lookup(&dest).cloned()
    }

    /// Snapshot every current route, destination-sorted.
    pub async fn routes(&self) -> Vec<(IpAddr, table::RouteEntry)> {
        self.state
            .table
            .lock()
            .await
            .routes()
            .map(|(d, e)| (*d, e.clone()))
            .collect()
    }

    /// Set the stop flag and join every task with a bounded timeout.
    pub async fn shutdown(mut self) {
        let _ = self.stop_tx.send(true);
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task)
                .await
                .is_err()
            {
                tracing::warn!("task did not exit within shutdown timeout");
            }
        }
    }
}

impl Engine {
    /// Bind the socket, seed the table from `neighbors`, launch the four
    /// periodic tasks plus the operator-command task, announce presence to
    /// every neighbor, and print the initial table. Per spec.md §4.8.
    pub async fn start(
        self_addr: IpAddr,
        port: u16,
        neighbors: Vec<IpAddr>,
        timing: Timing,
    ) -> Result<Handle, EngineError> {
        Self::start_with_delivery_sink(self_addr, port, neighbors, timing, None).await
    }

    /// As [`Engine::start`], but also registers `delivery_tx` to receive a
    /// [`Delivery`] every time this node is the destination of a text
    /// message (spec.md §4.7's "deliver locally"). `router-cli` has no use
    /// for this — its delivery sink is a `tracing::info!` event — but a test
    /// harness that wants to assert a message actually arrived, rather than
    /// just that a route exists, needs a channel to observe it on.
    pub async fn start_with_delivery_sink(
        self_addr: IpAddr,
        port: u16,
        neighbors: Vec<IpAddr>,
        timing: Timing,
        delivery_tx: Option<mpsc::Sender<Delivery>>,
    ) -> Result<Handle, EngineError> {
        let transport = Transport::bind(self_addr, port).await?;
        let table = RoutingTable::new(self_addr, neighbors.iter().copied());
        let (broadcast_tx, broadcast_rx) = mpsc::channel(1);
        let (operator_tx, operator_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = watch::channel(false);

        let state = Arc::new(EngineState {
            self_addr,
            port,
            timing,
            table: Mutex::new(table),
            transport: RwLock::new(transport),
            broadcast_tx,
            delivery_tx,
        });

        let mut tasks = Vec::with_capacity(5);
        tasks.push(tokio::spawn(run_listener(state.clone(), stop_rx.clone())));
        tasks.push(tokio::spawn(run_announcer(
            state.clone(),
            stop_rx.clone(),
            broadcast_rx,
        )));
        tasks.push(tokio::spawn(run_monitor(state.clone(), stop_rx.clone())));
        tasks.push(tokio::spawn(run_printer(state.clone(), stop_rx.clone())));
        tasks.push(tokio::spawn(run_operator(state.clone(), stop_rx, operator_rx)));

        announce_self(&state, &neighbors).await;
        tracing::info!("{}", state.table.lock().await.display());

        Ok(Handle {
            state,
            tasks,
            stop_tx,
            operator_tx,
        })
    }
}

async fn announce_self(state: &EngineState, neighbors: &[IpAddr]) {
    let msg = codec::encode_presence(state.self_addr);
    let transport = state.transport.read().await;
    for n in neighbors {
        transport.send_to(*n, &msg).await;
    }
}

/// Build the route-vector payload broadcast to every neighbor this tick,
/// and send it. Per DESIGN.md's resolution of the split-horizon open
/// question, the same unfiltered payload goes to every neighbor: I1
/// already guarantees `table.routes()` never contains a self entry, so no
/// per-destination filtering is needed here.
async fn broadcast(state: &EngineState) {
    let (payload, neighbors) = {
        let table = state.table.lock().await;
        let payload = codec::encode_route_vector(table.routes().map(|(d, e)| (d, e.metric)));
        let neighbors: Vec<IpAddr> = table.neighbor_set().collect();
        (payload, neighbors)
    };
    let transport = state.transport.read().await;
    for n in neighbors {
        transport.send_to(n, &payload).await;
    }
}

/// Apply a table mutation, then — outside the lock — print and trigger an
/// immediate broadcast if anything changed. The one place every handler
/// below funnels through, so the "print + broadcast on change" rule lives
/// in exactly one spot.
async fn apply_and_react(state: &EngineState, mutate: impl FnOnce(&mut RoutingTable) -> TableDiff) {
    let diff = {
        let mut table = state.table.lock().await;
        mutate(&mut table)
    };
    if diff.is_empty() {
        return;
    }
    let snapshot = state.table.lock().await.display();
    tracing::info!("{}\n{}", snapshot, table::display_diff(&diff));
    // A pending notification already covers this mutation; no need to queue another.
    let _ = state.broadcast_tx.try_send(());
}

async fn run_listener(state: Arc<EngineState>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow() {
            return;
        }
        let recv_result = { state.transport.read().await.recv().await };
        match recv_result {
            Ok(None) => continue,
            Ok(Some((src, payload))) => handle_datagram(&state, src, payload).await,
            Err(err) => {
                tracing::warn!(%err, "transport recv failed; rebinding");
                match rebind_after_backoff(state.self_addr, state.port).await {
                    Ok(fresh) => *state.transport.write().await = fresh,
                    Err(bind_err) => tracing::error!(%bind_err, "rebind failed"),
                }
            }
        }
    }
}

/// Report a text message whose destination is this node: log it, and — if
/// a delivery sink was registered via `Engine::start_with_delivery_sink` —
/// forward it there too.
async fn deliver(state: &EngineState, origin: IpAddr, payload: String) {
    tracing::info!(%origin, %payload, "message delivered");
    if let Some(tx) = &state.delivery_tx {
        let _ = tx.try_send(Delivery { origin, payload });
    }
}

async fn handle_datagram(state: &EngineState, src: IpAddr, raw: String) {
    let message = match codec::decode(&raw) {
        Ok(m) => m,
        Err(err) => {
            tracing::warn!(%src, %err, "dropping malformed message");
            return;
        }
    };
    match message {
        Message::Presence(advertised) => {
            tracing::debug!(%src, %advertised, "received presence");
            apply_and_react(state, |t| t.apply_presence(src, advertised, Instant::now())).await;
        }
        Message::RouteVector(map) => {
            tracing::debug!(%src, count = map.len(), "received route vector");
            apply_and_react(state, |t| t.apply_route_vector(src, map, Instant::now())).await;
        }
        Message::Text {
            origin,
            dest,
            payload,
        } => {
            tracing::debug!(%src, %origin, %dest, "received text message");
            let next_hop = { state.table.lock().await.lookup(&dest).map(|e| e.next_hop) };
            match forwarder::forward(state.self_addr, origin, dest, &payload, &raw, |_| next_hop) {
                ForwardAction::DeliverLocally { origin, payload } => {
                    deliver(state, origin, payload).await;
                }
                ForwardAction::ForwardTo { next_hop, raw } => {
                    state.transport.read().await.send_to(next_hop, &raw).await;
                }
                ForwardAction::NoRoute { dest } => {
                    tracing::warn!(%dest, "no route, message dropped");
                }
            }
        }
    }
}

async fn run_announcer(
    state: Arc<EngineState>,
    mut stop_rx: watch::Receiver<bool>,
    mut broadcast_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(state.timing.route_announce_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            got = broadcast_rx.recv() => {
                if got.is_none() {
                    return;
                }
            }
            _ = stop_rx.changed() => {}
        }
        if *stop_rx.borrow() {
            return;
        }
        broadcast(&state).await;
    }
}

async fn run_monitor(state: Arc<EngineState>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(state.timing.monitor_period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.changed() => {}
        }
        if *stop_rx.borrow() {
            return;
        }
        let now = Instant::now();
        let inactive = {
            let table = state.table.lock().await;
            table.inactive_neighbors(now, state.timing.neighbor_timeout)
        };
        if inactive.is_empty() {
            continue;
        }
        apply_and_react(&state, |t| {
            let mut combined = TableDiff::default();
            for n in &inactive {
                tracing::info!(neighbor = %n, "neighbor considered inactive");
                let d = t.age_neighbor(*n);
                combined.removed.extend(d.removed);
            }
            combined
        })
        .await;
    }
}

async fn run_printer(state: Arc<EngineState>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(state.timing.table_print_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.changed() => {}
        }
        if *stop_rx.borrow() {
            return;
        }
        let snapshot = state.table.lock().await.display();
        tracing::info!("{snapshot}");
    }
}

async fn run_operator(
    state: Arc<EngineState>,
    mut stop_rx: watch::Receiver<bool>,
    mut operator_rx: mpsc::Receiver<OperatorCommand>,
) {
    loop {
        tokio::select! {
            cmd = operator_rx.recv() => {
                match cmd {
                    Some(cmd) => handle_operator_command(&state, cmd).await,
                    None => return,
                }
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    return;
                }
            }
        }
    }
}

async fn handle_operator_command(state: &EngineState, cmd: OperatorCommand) {
    match cmd {
        OperatorCommand::PrintTable => {
            let snapshot = state.table.lock().await.display();
            tracing::info!("{snapshot}");
        }
        OperatorCommand::SendText { dest, payload } => {
            let origin = state.self_addr;
            let raw = codec::encode_text(origin, dest, &payload);
            let next_hop = { state.table.lock().await.lookup(&dest).map(|e| e.next_hop) };
            match forwarder::forward(state.self_addr, origin, dest, &payload, &raw, |_| next_hop) {
                ForwardAction::DeliverLocally { origin, payload } => {
                    deliver(state, origin, payload).await;
                }
                ForwardAction::ForwardTo { next_hop, raw } => {
                    state.transport.read().await.send_to(next_hop, &raw).await;
                }
                ForwardAction::NoRoute { dest } => {
                    tracing::warn!(%dest, "no route, message dropped");
                }
            }
        }
    }
}

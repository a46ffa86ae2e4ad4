// Process wiring for the game server.
//
// Architecture: a handful of long-lived threads joined by three `mpsc`
// channels.
//
//   upstream reader ──┐
//   CHALLENGE timer ──┤
//   CLEAN_OUTPUT timer┼──> inbound: Command ──> dispatcher thread
//   bridge calls ─────┘                              │
//                                                    v
//                                    outbound: Outbound ──> outbound thread
//                                                    │                │
//                                                    v                v
//                   upstream writer <── wire: String            mailbox (bridge)
//
// The outbound channel carries `Outbound` items: envelopes to deliver and
// mailbox clears for departed human proxies.
//
// - **Dispatcher thread**: owns the session and match registries and runs
//   handlers one at a time (see `dispatcher.rs`).
// - **Outbound thread**: routes envelopes to the wire queue or the mailbox.
// - **Upstream thread**: the connection supervisor; it spawns the per-connection
//   writer and heartbeat threads itself (see `upstream.rs`).
// - **Timer threads** (`challenge`, `clean_output`): inject CHALLENGE and
//   CLEAN_OUTPUT ticks.
//
// Shutdown: `ServerHandle::stop` clears the shared `keep_running` flag,
// interrupts any blocked socket read and joins every thread. Each loop polls
// the flag at least every `POLL_INTERVAL`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use gridwars_protocol::CommandType;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::bridge::BridgeHandle;
use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, run_dispatcher};
use crate::error::ServerError;
use crate::mailbox::Mailbox;
use crate::outbound::{OutboundRouter, run_outbound};
use crate::timers::{spawn_named, spawn_ticker};
use crate::upstream::{ConnectionState, Upstream, UpstreamLink};

/// Handle returned by `start_server` to control the running node.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    link: Arc<UpstreamLink>,
    bridge: BridgeHandle,
}

impl ServerHandle {
    /// Entry points for the external web bridge.
    pub fn bridge(&self) -> BridgeHandle {
        self.bridge.clone()
    }

    /// Current state of the switch connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Signal every thread to stop and wait for them to finish.
    pub fn stop(self) {
        info!("stopping game server");
        self.keep_running.store(false, Ordering::SeqCst);
        self.link.interrupt();
        for handle in self.threads {
            let _ = handle.join();
        }
    }
}

/// Start the game server with a fresh entropy-seeded RNG.
pub fn start_server(config: ServerConfig) -> Result<ServerHandle, ServerError> {
    start_server_with_rng(config, StdRng::from_os_rng())
}

/// Start the game server. The RNG drives first-mover choice, pairing order
/// and the scripted validation mover.
pub fn start_server_with_rng(
    config: ServerConfig,
    rng: StdRng,
) -> Result<ServerHandle, ServerError> {
    let keep_running = Arc::new(AtomicBool::new(true));
    let mailbox = Arc::new(Mailbox::new(config.mailbox_ttl()));

    let (inbound_tx, inbound_rx) = mpsc::channel();
    let (outbound_tx, outbound_rx) = mpsc::channel();
    let (wire_tx, wire_rx) = mpsc::channel();

    let mut threads = Vec::new();

    let dispatcher = Dispatcher::new(
        outbound_tx,
        mailbox.clone(),
        rng,
        config.action_timeout_ms,
    );
    threads.push(spawn_named("dispatcher", {
        let keep_running = keep_running.clone();
        move || run_dispatcher(inbound_rx, dispatcher, keep_running)
    })?);

    let router = OutboundRouter::new(wire_tx.clone(), mailbox.clone());
    threads.push(spawn_named("outbound", {
        let keep_running = keep_running.clone();
        move || run_outbound(outbound_rx, router, keep_running)
    })?);

    let upstream = Upstream::new(&config, inbound_tx.clone(), wire_tx, keep_running.clone());
    let link = upstream.link();
    threads.push(spawn_named("upstream", move || upstream.run(wire_rx))?);

    threads.push(spawn_ticker(
        CommandType::Challenge,
        config.challenge_interval(),
        inbound_tx.clone(),
        keep_running.clone(),
    )?);
    threads.push(spawn_ticker(
        CommandType::CleanOutput,
        config.purge_interval(),
        inbound_tx.clone(),
        keep_running.clone(),
    )?);

    info!(
        switch = %config.switch_addr,
        service = %config.service_name,
        "game server started"
    );

    Ok(ServerHandle {
        keep_running,
        threads,
        link,
        bridge: BridgeHandle::new(inbound_tx, mailbox),
    })
}

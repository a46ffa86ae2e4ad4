// gridwars_server - game-server node for the gridwars switch fabric.
//
// The node keeps one persistent connection to the switch relay, receives
// routed commands from bots (and, through the web bridge, from humans),
// runs four-in-a-row matches between them and sends moves and results back
// through the switch. It is not a game client and has no UI.
//
// Module overview:
// - `config.rs`:     `ServerConfig`, loaded from JSON with defaults.
// - `error.rs`:      `HandlerError`, `ServerError`, `BridgeClosed`.
// - `engine.rs`:     `MatchEngine` trait and the `FourInARow` board.
// - `registry.rs`:   Sessions, matches and their registries.
// - `dispatcher.rs`: The single consumer of the inbound queue. Owns the
//                    registries.
// - `handlers.rs`:   One dispatcher method per inbound command type.
// - `outbound.rs`:   Routes envelopes to the wire or the bridge mailbox.
// - `mailbox.rs`:    Per-human-proxy holding area polled by the bridge.
// - `upstream.rs`:   Switch connection: register, read, write, heartbeat,
//                    reconnect.
// - `timers.rs`:     CHALLENGE and CLEAN_OUTPUT tickers.
// - `bridge.rs`:     Calls exposed to the external web bridge.
// - `server.rs`:     Thread and channel wiring, `start_server`.
//
// Dependencies: `gridwars_protocol` for the wire format and shared ids.
//
// The node runs as a standalone binary (`main.rs`) or embedded through the
// library API (`start_server`).

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
mod handlers;
pub mod mailbox;
pub mod outbound;
pub mod registry;
pub mod server;
pub mod timers;
pub mod upstream;

pub use bridge::BridgeHandle;
pub use config::ServerConfig;
pub use server::{ServerHandle, start_server, start_server_with_rng};

// gridwars_protocol - wire protocol between the game server and the switch.
//
// This crate defines the command vocabulary, the routing envelope and the
// line framing used by the game server (`gridwars_server`) to talk to the
// switch relay, plus the id types shared with the server's registries. It has
// no networking of its own and no dependency on the server crate.
//
// Module overview:
// - `types.rs`:    `SessionId` (bots > 0, bridge humans < 0, scripted 0) and
//                  `MatchId`.
// - `command.rs`:  `CommandType` (closed enum with an `Other` catch-all),
//                  `Command`, sender-id and parameter parsing.
// - `envelope.rs`: `Envelope` / `Route` and the `dest:timeout:` routing
//                  prefix injected for bot-bound commands.
// - `framing.rs`:  `TYPE<<metadata` line encoding/decoding over any
//                  `BufRead`/`Write`.
// - `error.rs`:    `FramingError`.
//
// Design decisions:
// - **Text lines, not length prefixes.** The switch speaks newline-delimited
//   UTF-8; every frame is one line and is flushed on write.
// - **No async runtime.** Uses `std::io` traits so blocking `TcpStream`s and
//   in-memory cursors work the same way.

pub mod command;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod types;

pub use command::{Command, CommandType, param_value};
pub use envelope::{Envelope, Route, RoutedMetadata, strip_routing_prefix};
pub use error::FramingError;
pub use framing::{SEPARATOR, decode_line, encode_line, read_command, write_line};
pub use types::{MatchId, SessionId};

// Core ID types for the switch protocol.
//
// These are lightweight newtypes shared by the wire codec (`command.rs`,
// `envelope.rs`) and the game server's registries. Session ids are assigned by
// the switch, not by this node: positive ids are bots reachable over the wire,
// negative ids are bridge-only human proxies (always the negation of the bot
// they challenge), and zero stands for the scripted opponent of a validation
// match, which has no session at all.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Switch-assigned participant id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub i32);

impl SessionId {
    /// Placeholder opponent of a validation match. Never has a session.
    pub const SCRIPTED: SessionId = SessionId(0);

    /// Sender id reported for metadata whose first token is not a number.
    /// No handler ever matches it.
    pub const UNKNOWN: SessionId = SessionId(-1);

    /// The human proxy session that challenges `bot` through the bridge.
    pub fn human_proxy_for(bot: SessionId) -> SessionId {
        SessionId(-bot.0)
    }

    /// True for bots connected through the switch.
    pub fn is_wire(self) -> bool {
        self.0 > 0
    }

    /// True for human proxies that are only reachable through the bridge
    /// mailbox.
    pub fn is_bridge(self) -> bool {
        self.0 < 0
    }

    /// True for the validation match placeholder.
    pub fn is_scripted(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing match id, unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

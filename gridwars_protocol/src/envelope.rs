// Routing envelope for outbound commands.
//
// Everything the game server sends goes to the switch first. Commands meant
// for a bot are wrapped with the bot's session id and a response deadline,
// injected at the head of the metadata:
//
//     ACTION_REQUEST<<42:5000:-1      (wire, as seen by the switch)
//     ACTION_REQUEST<<-1              (as delivered to bot 42)
//
// The switch strips the prefix (`strip_routing_prefix` does the same thing
// here, for tests and tooling), enforces the deadline, and forwards the
// command. A deadline of `0` means no reply is expected.
//
// Commands addressed to a negative session id never reach the wire: those
// participants are human proxies that only exist on the bridge side, so the
// outbound dispatcher files them into the mailbox using `Envelope::rendered`,
// the unprefixed form.

use crate::command::Command;
use crate::types::SessionId;

/// Where an envelope goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Consumed by the switch itself (REGISTER, EXECUTE_PROCEDURE, ...).
    Switch,
    /// Forwarded by the switch to a participant, or filed into the mailbox
    /// when the id is negative.
    Session {
        id: SessionId,
        action_timeout_ms: u64,
    },
}

/// A command plus its routing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub command: Command,
    pub route: Route,
}

impl Envelope {
    /// Switch-directed envelope; metadata is sent unchanged.
    pub fn to_switch(command: Command) -> Self {
        Self {
            command,
            route: Route::Switch,
        }
    }

    /// Envelope for a participant. `action_timeout_ms == 0` means the switch
    /// will not expect or enforce a reply.
    pub fn to_session(command: Command, id: SessionId, action_timeout_ms: u64) -> Self {
        Self {
            command,
            route: Route::Session {
                id,
                action_timeout_ms,
            },
        }
    }

    /// The destination session, if any.
    pub fn destination(&self) -> Option<SessionId> {
        match self.route {
            Route::Switch => None,
            Route::Session { id, .. } => Some(id),
        }
    }

    /// True if this envelope must go to the bridge mailbox instead of the
    /// wire.
    pub fn is_bridge_bound(&self) -> bool {
        self.destination().is_some_and(SessionId::is_bridge)
    }

    /// The metadata as written to the wire, with the routing prefix injected
    /// for non-negative destinations.
    pub fn wire_metadata(&self) -> String {
        match self.route {
            Route::Session {
                id,
                action_timeout_ms,
            } if id.0 >= 0 => format!("{}:{}:{}", id, action_timeout_ms, self.command.metadata),
            _ => self.command.metadata.clone(),
        }
    }

    /// Full wire line (without the trailing newline).
    pub fn wire_line(&self) -> String {
        format!("{}<<{}", self.command.kind, self.wire_metadata())
    }

    /// The command as the final recipient sees it: no routing prefix.
    pub fn rendered(&self) -> String {
        self.command.render()
    }
}

/// Metadata of a routed command after the switch-side prefix has been
/// removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedMetadata<'a> {
    pub destination: SessionId,
    pub action_timeout_ms: u64,
    pub metadata: &'a str,
}

/// Split `dest:timeout:rest` into its parts. Returns `None` if either prefix
/// field is missing or not numeric.
pub fn strip_routing_prefix(metadata: &str) -> Option<RoutedMetadata<'_>> {
    let mut parts = metadata.splitn(3, ':');
    let destination = parts.next()?.parse().ok().map(SessionId)?;
    let action_timeout_ms = parts.next()?.parse().ok()?;
    let metadata = parts.next().unwrap_or("");
    Some(RoutedMetadata {
        destination,
        action_timeout_ms,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandType;

    #[test]
    fn switch_envelope_leaves_metadata_alone() {
        let env = Envelope::to_switch(Command::new(
            CommandType::ExecuteProcedure,
            "insert_gamedata:1,2",
        ));
        assert_eq!(env.wire_line(), "EXECUTE_PROCEDURE<<insert_gamedata:1,2");
        assert!(!env.is_bridge_bound());
        assert_eq!(env.destination(), None);
    }

    #[test]
    fn routing_prefix_roundtrip() {
        let env = Envelope::to_session(
            Command::new(CommandType::ActionRequest, "X"),
            SessionId(5),
            3000,
        );
        assert_eq!(env.wire_line(), "ACTION_REQUEST<<5:3000:X");

        let meta = env.wire_metadata();
        let routed = strip_routing_prefix(&meta).unwrap();
        assert_eq!(routed.destination, SessionId(5));
        assert_eq!(routed.action_timeout_ms, 3000);
        assert_eq!(routed.metadata, "X");
    }

    #[test]
    fn prefix_keeps_colons_in_payload() {
        let env = Envelope::to_session(
            Command::new(CommandType::GameReport, "1:1:2:1:4,4,4,4"),
            SessionId(1),
            0,
        );
        let meta = env.wire_metadata();
        let routed = strip_routing_prefix(&meta).unwrap();
        assert_eq!(routed.action_timeout_ms, 0);
        assert_eq!(routed.metadata, "1:1:2:1:4,4,4,4");
    }

    #[test]
    fn negative_destination_is_bridge_bound_and_unprefixed() {
        let env = Envelope::to_session(
            Command::new(CommandType::ServerMessage, "Bot 7 is Busy!"),
            SessionId(-7),
            0,
        );
        assert!(env.is_bridge_bound());
        assert_eq!(env.wire_metadata(), "Bot 7 is Busy!");
        assert_eq!(env.rendered(), "SERVER_MESSAGE<<Bot 7 is Busy!");
    }

    #[test]
    fn strip_rejects_unrouted_metadata() {
        assert_eq!(strip_routing_prefix("hello"), None);
        assert_eq!(strip_routing_prefix("5:soon:X"), None);
    }
}

// Command vocabulary shared by the switch, bots, the bridge and the game
// server.
//
// A `Command` is a type tag plus a free-form metadata string. The tag is a
// closed enum (`CommandType`) covering every type in the published protocol;
// anything else decodes to `CommandType::Other` so the dispatcher can log it
// instead of failing.
//
// Metadata conventions:
// - Commands forwarded by the switch always start with the sender's session
//   id (`42:...`). `Command::sender_id` extracts it, yielding
//   `SessionId::UNKNOWN` when the first token is not a number.
// - Some commands carry a `key=value,key=value` parameter list in one of the
//   `:`-separated fields (e.g. `mode=1` on LOGIN_INFORM). See `param_value`.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Every command type the game server sends or understands.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    /// Node registration with the switch (core → switch).
    Register,
    /// Keep-alive (core → switch).
    ServerPing,
    /// A bot connected to the switch.
    LoginInform,
    /// Match assignment (core → bot) or ready echo (bot → core).
    GameInitialize,
    /// Move request carrying the previous move.
    ActionRequest,
    /// A move from a bot or a bridge human.
    ActionReply,
    /// Terminal match summary.
    GameReport,
    /// Match terminated early.
    GameAbort,
    /// Free-text notice.
    ServerMessage,
    /// Forced or voluntary disconnect notice.
    DisconnectBotRemote,
    /// Opaque logging directive executed by the switch.
    ExecuteProcedure,
    /// Scheduling tick (internal timer).
    Challenge,
    /// Mailbox sweep tick (internal timer).
    CleanOutput,
    /// Bridge request to start a human-vs-bot match.
    WebStartGame,
    /// Bridge request to toggle a bot's debug/live mode.
    SetMode,
    /// A type outside the protocol table.
    Other(String),
}

impl CommandType {
    /// Map a wire tag onto the enum. Never fails; unknown tags become `Other`.
    pub fn parse(tag: &str) -> CommandType {
        match tag {
            "REGISTER" => CommandType::Register,
            "SERVER_PING" => CommandType::ServerPing,
            "LOGIN_INFORM" => CommandType::LoginInform,
            "GAME_INITIALIZE" => CommandType::GameInitialize,
            "ACTION_REQUEST" => CommandType::ActionRequest,
            "ACTION_REPLY" => CommandType::ActionReply,
            "GAME_REPORT" => CommandType::GameReport,
            "GAME_ABORT" => CommandType::GameAbort,
            "SERVER_MESSAGE" => CommandType::ServerMessage,
            "DISCONNECT_BOT_REMOTE" => CommandType::DisconnectBotRemote,
            "EXECUTE_PROCEDURE" => CommandType::ExecuteProcedure,
            "CHALLENGE" => CommandType::Challenge,
            "CLEAN_OUTPUT" => CommandType::CleanOutput,
            "WEB_START_GAME" => CommandType::WebStartGame,
            "SET_MODE" => CommandType::SetMode,
            other => CommandType::Other(other.to_string()),
        }
    }

    /// The wire tag for this type.
    pub fn as_str(&self) -> &str {
        match self {
            CommandType::Register => "REGISTER",
            CommandType::ServerPing => "SERVER_PING",
            CommandType::LoginInform => "LOGIN_INFORM",
            CommandType::GameInitialize => "GAME_INITIALIZE",
            CommandType::ActionRequest => "ACTION_REQUEST",
            CommandType::ActionReply => "ACTION_REPLY",
            CommandType::GameReport => "GAME_REPORT",
            CommandType::GameAbort => "GAME_ABORT",
            CommandType::ServerMessage => "SERVER_MESSAGE",
            CommandType::DisconnectBotRemote => "DISCONNECT_BOT_REMOTE",
            CommandType::ExecuteProcedure => "EXECUTE_PROCEDURE",
            CommandType::Challenge => "CHALLENGE",
            CommandType::CleanOutput => "CLEAN_OUTPUT",
            CommandType::WebStartGame => "WEB_START_GAME",
            CommandType::SetMode => "SET_MODE",
            CommandType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandType,
    pub metadata: String,
    /// Peer address of the connection the command arrived on. `None` for
    /// commands built locally (timers, bridge, outbound).
    pub source: Option<SocketAddr>,
}

impl Command {
    pub fn new(kind: CommandType, metadata: impl Into<String>) -> Self {
        Self {
            kind,
            metadata: metadata.into(),
            source: None,
        }
    }

    /// Attach the address of the connection this command was read from.
    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    /// Session id of the sender: the first `:`-separated metadata token.
    /// Returns `SessionId::UNKNOWN` if it does not parse.
    pub fn sender_id(&self) -> SessionId {
        self.try_sender_id().unwrap_or(SessionId::UNKNOWN)
    }

    /// Like `sender_id`, but keeps "did not parse" apart from a real `-1`
    /// (the human proxy of bot 1).
    pub fn try_sender_id(&self) -> Option<SessionId> {
        self.fields()
            .next()
            .and_then(|token| token.trim().parse().ok())
            .map(SessionId)
    }

    /// Metadata split on `:`.
    pub fn fields(&self) -> std::str::Split<'_, char> {
        self.metadata.split(':')
    }

    /// The `TYPE<<metadata` rendering of this command, without any routing
    /// prefix.
    pub fn render(&self) -> String {
        format!("{}<<{}", self.kind, self.metadata)
    }
}

/// Look up `name` in a `key=value,key=value` parameter list.
pub fn param_value<'a>(params: &'a str, name: &str) -> Option<&'a str> {
    params.split(',').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_map_back_to_themselves() {
        for tag in [
            "REGISTER",
            "SERVER_PING",
            "LOGIN_INFORM",
            "GAME_INITIALIZE",
            "ACTION_REQUEST",
            "ACTION_REPLY",
            "GAME_REPORT",
            "GAME_ABORT",
            "SERVER_MESSAGE",
            "DISCONNECT_BOT_REMOTE",
            "EXECUTE_PROCEDURE",
            "CHALLENGE",
            "CLEAN_OUTPUT",
            "WEB_START_GAME",
            "SET_MODE",
        ] {
            let kind = CommandType::parse(tag);
            assert!(!matches!(kind, CommandType::Other(_)), "{tag} fell through");
            assert_eq!(kind.as_str(), tag);
        }
    }

    #[test]
    fn unknown_tag_is_kept_verbatim() {
        let kind = CommandType::parse("SELF_DESTRUCT");
        assert_eq!(kind, CommandType::Other("SELF_DESTRUCT".into()));
        assert_eq!(kind.to_string(), "SELF_DESTRUCT");
    }

    #[test]
    fn sender_id_reads_first_field() {
        let cmd = Command::new(CommandType::ActionReply, "17:null:4");
        assert_eq!(cmd.sender_id(), SessionId(17));

        let human = Command::new(CommandType::ActionReply, "-3:null:4");
        assert_eq!(human.sender_id(), SessionId(-3));
    }

    #[test]
    fn sender_id_falls_back_to_unknown() {
        let cmd = Command::new(CommandType::ServerMessage, "hello there");
        assert_eq!(cmd.sender_id(), SessionId::UNKNOWN);

        let empty = Command::new(CommandType::Challenge, "");
        assert_eq!(empty.sender_id(), SessionId::UNKNOWN);
        assert_eq!(empty.try_sender_id(), None);

        let human = Command::new(CommandType::DisconnectBotRemote, "-1");
        assert_eq!(human.try_sender_id(), Some(SessionId(-1)));
    }

    #[test]
    fn param_lookup() {
        assert_eq!(param_value("mode=1", "mode"), Some("1"));
        assert_eq!(param_value("lang=rust, mode=0", "mode"), Some("0"));
        assert_eq!(param_value("lang=rust", "mode"), None);
        assert_eq!(param_value("garbage", "mode"), None);
    }
}

// Surface exposed to the external web bridge.
//
// The bridge gives a browser-side human control of a proxy session whose id
// is the negation of the bot it challenges. It never touches registry state:
// every call either enqueues a command on the dispatcher's inbound queue or
// reads the shared mailbox. Calls that name a human proxy also mark it as
// touched, which keeps it alive across the next scheduling tick.
//
// `BridgeHandle` is cheap to clone; hand one to each bridge worker.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use gridwars_protocol::{Command, CommandType, SessionId};

use crate::error::BridgeClosed;
use crate::mailbox::Mailbox;

#[derive(Clone)]
pub struct BridgeHandle {
    inbound: Sender<Command>,
    mailbox: Arc<Mailbox>,
}

impl BridgeHandle {
    pub fn new(inbound: Sender<Command>, mailbox: Arc<Mailbox>) -> Self {
        Self { inbound, mailbox }
    }

    fn enqueue(&self, kind: CommandType, metadata: String) -> Result<(), BridgeClosed> {
        self.inbound
            .send(Command::new(kind, metadata))
            .map_err(|_| BridgeClosed)
    }

    /// A human asks to play `bot`.
    pub fn enqueue_match_request(&self, bot: SessionId) -> Result<(), BridgeClosed> {
        self.mailbox.touch(SessionId::human_proxy_for(bot));
        self.enqueue(CommandType::WebStartGame, bot.to_string())
    }

    /// The human proxy `human` drops a piece in `column` (1-based).
    pub fn enqueue_move(&self, human: SessionId, column: u8) -> Result<(), BridgeClosed> {
        self.mailbox.touch(human);
        self.enqueue(CommandType::ActionReply, format!("{human}:null:{column}"))
    }

    /// The human leaves the match.
    pub fn enqueue_abort(&self, human: SessionId) -> Result<(), BridgeClosed> {
        self.mailbox.touch(human);
        self.enqueue(CommandType::DisconnectBotRemote, human.to_string())
    }

    /// Switch `bot` between debug (0) and live (1) mode.
    pub fn enqueue_mode_change(&self, bot: SessionId, mode: i64) -> Result<(), BridgeClosed> {
        self.enqueue(CommandType::SetMode, format!("{bot}:null:{mode}"))
    }

    /// Collect and clear everything pending for `human`.
    pub fn poll_mailbox(&self, human: SessionId) -> String {
        self.mailbox.poll(human)
    }
}

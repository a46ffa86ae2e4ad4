// Event dispatcher: the single consumer of the inbound queue.
//
// Every producer (the upstream reader, the two timers, the bridge) pushes
// `Command`s into one `mpsc` channel. `run_dispatcher` drains it on one
// thread and hands each command to exactly one handler, which runs to
// completion before the next command is taken. The session and match
// registries live inside `Dispatcher` and are only ever touched from here,
// so they need no locks.
//
// Handlers (in `handlers.rs`) return `Result<(), HandlerError>`. A failed
// handler never stops the loop: `dispatch` logs the error and, when the
// error names an offending session, force-disconnects it. Disconnection is
// the recovery for any session whose state can no longer be trusted.
//
// Handlers never write to the wire directly. They queue `Envelope`s on the
// outbound channel; the outbound consumer decides between the wire and the
// bridge mailbox. Mailbox clears for departed sessions go through the same
// channel so they stay ordered with the mail.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

use gridwars_protocol::{Command, CommandType, Envelope, SessionId};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::error::HandlerError;
use crate::mailbox::Mailbox;
use crate::outbound::{Outbound, POLL_INTERVAL};
use crate::registry::{MatchRegistry, SessionRegistry};

/// Disconnect reason sent to a mover whose move the engine rejected.
pub const INVALID_MOVE_REASON: &str = "Bot has made an invalid move.";

/// Owner of all match and session state.
pub struct Dispatcher {
    pub(crate) sessions: SessionRegistry,
    pub(crate) matches: MatchRegistry,
    pub(crate) mailbox: Arc<Mailbox>,
    pub(crate) rng: StdRng,
    pub(crate) action_timeout_ms: u64,
    outbound: Sender<Outbound>,
}

impl Dispatcher {
    pub fn new(
        outbound: Sender<Outbound>,
        mailbox: Arc<Mailbox>,
        rng: StdRng,
        action_timeout_ms: u64,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            matches: MatchRegistry::new(),
            mailbox,
            rng,
            action_timeout_ms,
            outbound,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn matches(&self) -> &MatchRegistry {
        &self.matches
    }

    /// Handle one inbound command.
    pub fn dispatch(&mut self, command: Command) {
        debug!(command = %command.kind, metadata = %command.metadata, "dispatching");
        let result = match command.kind {
            CommandType::LoginInform => self.login(&command),
            CommandType::GameInitialize => self.ready_ack(&command),
            CommandType::ActionReply => self.action_reply(&command),
            CommandType::DisconnectBotRemote => self.switch_disconnect(&command),
            CommandType::Challenge => {
                self.challenge();
                Ok(())
            }
            CommandType::ServerMessage => {
                self.switch_message(&command);
                Ok(())
            }
            CommandType::WebStartGame => self.web_start_game(&command),
            CommandType::SetMode => self.set_mode(&command),
            CommandType::CleanOutput => {
                self.clean_output_at(Instant::now());
                Ok(())
            }
            CommandType::Register
            | CommandType::ServerPing
            | CommandType::ActionRequest
            | CommandType::GameReport
            | CommandType::GameAbort
            | CommandType::ExecuteProcedure => {
                warn!(command = %command.kind, "outbound-only command arrived inbound, ignored");
                Ok(())
            }
            CommandType::Other(ref tag) => Err(HandlerError::UnrecognizedCommand(tag.clone())),
        };

        if let Err(err) = result {
            self.recover(err);
        }
    }

    fn recover(&mut self, err: HandlerError) {
        match err.offender() {
            Some(id) => {
                warn!(session = %id, error = %err, "forcing disconnect");
                let reason = match &err {
                    HandlerError::ProtocolViolation { reason, .. } => reason.clone(),
                    HandlerError::InvalidMove { .. } => INVALID_MOVE_REASON.to_string(),
                    HandlerError::UnrecognizedCommand(_) => err.to_string(),
                };
                self.force_disconnect(id, &reason);
            }
            None => warn!(error = %err, "command dropped"),
        }
    }

    /// Queue a command for a session. `action_timeout_ms` of 0 means no
    /// reply is expected.
    pub(crate) fn send_to(&self, id: SessionId, command: Command, action_timeout_ms: u64) {
        self.emit(Envelope::to_session(command, id, action_timeout_ms));
    }

    /// Queue a command that expects a reply within the configured deadline.
    pub(crate) fn request(&self, id: SessionId, command: Command) {
        self.send_to(id, command, self.action_timeout_ms);
    }

    pub(crate) fn send_to_switch(&self, command: Command) {
        self.emit(Envelope::to_switch(command));
    }

    /// Clear a departed session's mailbox once everything already queued
    /// for it has been routed.
    pub(crate) fn discard_mail(&self, id: SessionId) {
        if id.is_bridge() && self.outbound.send(Outbound::Discard(id)).is_err() {
            debug!(session = %id, "outbound queue closed, mailbox clear dropped");
        }
    }

    fn emit(&self, envelope: Envelope) {
        if self.outbound.send(Outbound::Deliver(envelope)).is_err() {
            debug!("outbound queue closed, envelope dropped");
        }
    }
}

/// Dispatcher loop. Runs until `keep_running` is cleared or every producer
/// has hung up.
pub fn run_dispatcher(
    rx: Receiver<Command>,
    mut dispatcher: Dispatcher,
    keep_running: Arc<AtomicBool>,
) {
    info!("dispatcher started");
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(command) => dispatcher.dispatch(command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(
        sessions = dispatcher.sessions().len(),
        matches = dispatcher.matches().len(),
        "dispatcher stopped"
    );
}

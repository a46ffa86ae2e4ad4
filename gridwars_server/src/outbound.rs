// Outbound dispatch.
//
// A single consumer drains the queue the dispatcher's handlers fill, in FIFO
// order. Most items are envelopes, routed by destination:
// - no destination or a non-negative one: encoded to a wire line (routing
//   prefix injected) and handed to the upstream connection's writer queue;
// - negative destination: rendered without prefix and filed into the bridge
//   mailbox.
//
// Clearing a departed session's mail travels through the same queue
// (`Outbound::Discard`), so it lands after every envelope queued for that
// session before it left and before anything queued for a successor with
// the same id.
//
// The wire queue outlives individual connections. Lines queued while the
// switch is unreachable are written once the next connection is up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use gridwars_protocol::{Envelope, SessionId};
use tracing::{debug, warn};

use crate::mailbox::Mailbox;

/// How often a blocked consumer re-checks the keep-running flag.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One item on the outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Deliver(Envelope),
    /// Drop everything still in the mailbox for this session.
    Discard(SessionId),
}

/// Routes envelopes to the wire or to the mailbox.
pub struct OutboundRouter {
    wire: Sender<String>,
    mailbox: Arc<Mailbox>,
}

impl OutboundRouter {
    pub fn new(wire: Sender<String>, mailbox: Arc<Mailbox>) -> Self {
        Self { wire, mailbox }
    }

    pub fn handle(&self, item: Outbound) {
        match item {
            Outbound::Deliver(envelope) => self.route(envelope),
            Outbound::Discard(id) => {
                let dropped = self.mailbox.discard(id);
                if dropped > 0 {
                    debug!(session = %id, dropped, "mailbox cleared");
                }
            }
        }
    }

    /// Route one envelope.
    pub fn route(&self, envelope: Envelope) {
        match envelope.destination() {
            Some(id) if id.is_bridge() => {
                debug!(session = %id, command = %envelope.command.kind, "filed into mailbox");
                self.mailbox.deliver(id, envelope.rendered());
            }
            _ => {
                if self.wire.send(envelope.wire_line()).is_err() {
                    warn!(command = %envelope.command.kind, "wire queue closed, dropping command");
                }
            }
        }
    }
}

/// Outbound consumer loop. Runs until `keep_running` is cleared or every
/// producer has hung up.
pub fn run_outbound(
    rx: Receiver<Outbound>,
    router: OutboundRouter,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(item) => router.handle(item),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use gridwars_protocol::{Command, CommandType};

    use super::*;

    #[test]
    fn routes_by_destination_sign() {
        let (wire_tx, wire_rx) = mpsc::channel();
        let mailbox = Arc::new(Mailbox::new(Duration::from_secs(10)));
        let router = OutboundRouter::new(wire_tx, mailbox.clone());

        router.route(Envelope::to_session(
            Command::new(CommandType::ActionRequest, "-1"),
            SessionId(3),
            5000,
        ));
        router.route(Envelope::to_session(
            Command::new(CommandType::ActionRequest, "4"),
            SessionId(-3),
            5000,
        ));
        router.route(Envelope::to_switch(Command::new(
            CommandType::ExecuteProcedure,
            "insert_gamedata:0",
        )));

        assert_eq!(wire_rx.try_recv().unwrap(), "ACTION_REQUEST<<3:5000:-1");
        assert_eq!(
            wire_rx.try_recv().unwrap(),
            "EXECUTE_PROCEDURE<<insert_gamedata:0"
        );
        assert!(wire_rx.try_recv().is_err());
        assert_eq!(mailbox.poll(SessionId(-3)), "ACTION_REQUEST<<4&&");
    }

    #[test]
    fn consumer_preserves_order() {
        let (env_tx, env_rx) = mpsc::channel();
        let (wire_tx, wire_rx) = mpsc::channel();
        let mailbox = Arc::new(Mailbox::new(Duration::from_secs(10)));
        let keep_running = Arc::new(AtomicBool::new(true));

        for id in [1, 2] {
            env_tx
                .send(Outbound::Deliver(Envelope::to_session(
                    Command::new(CommandType::GameInitialize, "1"),
                    SessionId(id),
                    5000,
                )))
                .unwrap();
        }
        drop(env_tx);

        run_outbound(env_rx, OutboundRouter::new(wire_tx, mailbox), keep_running);

        let lines: Vec<String> = wire_rx.try_iter().collect();
        assert_eq!(
            lines,
            vec![
                "GAME_INITIALIZE<<1:5000:1".to_string(),
                "GAME_INITIALIZE<<2:5000:1".to_string(),
            ]
        );
    }

    #[test]
    fn discard_only_drops_mail_queued_before_it() {
        let (wire_tx, _wire_rx) = mpsc::channel();
        let mailbox = Arc::new(Mailbox::new(Duration::from_secs(10)));
        let router = OutboundRouter::new(wire_tx, mailbox.clone());
        let to_human = |text: &str| {
            Outbound::Deliver(Envelope::to_session(
                Command::new(CommandType::GameInitialize, text),
                SessionId(-5),
                5000,
            ))
        };

        router.handle(to_human("black:5"));
        router.handle(Outbound::Discard(SessionId(-5)));
        router.handle(to_human("red:5"));

        assert_eq!(mailbox.poll(SessionId(-5)), "GAME_INITIALIZE<<red:5&&");
    }
}

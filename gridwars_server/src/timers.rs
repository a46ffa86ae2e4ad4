// Timer sources.
//
// Each ticker is a named thread (`challenge`, `clean_output`) that sleeps for its interval and then injects a
// synthetic command into the same inbound queue the wire reader and the
// bridge feed. The dispatcher handles the tick like any other command, so
// periodic work is serialized with everything else.
//
// Sleeping happens in short slices so `keep_running` is honoured promptly.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gridwars_protocol::{Command, CommandType};
use tracing::info;

use crate::outbound::POLL_INTERVAL;

/// Spawn a ticker that sends `kind<<null` every `interval`. The thread is
/// named after the command, lowercased.
pub fn spawn_ticker(
    kind: CommandType,
    interval: Duration,
    inbound: Sender<Command>,
    keep_running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    let name = kind.as_str().to_lowercase();
    spawn_named(&name, move || {
        info!(tick = %kind, ?interval, "timer started");
        let mut next = Instant::now() + interval;
        while keep_running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now < next {
                thread::sleep((next - now).min(POLL_INTERVAL));
                continue;
            }
            next = now + interval;
            if inbound.send(Command::new(kind.clone(), "null")).is_err() {
                break;
            }
        }
    })
}

pub(crate) fn spawn_named<F>(name: &str, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

/// Sleep for `duration` in slices, returning early (with `false`) as soon as
/// `running` reports false.
pub(crate) fn sleep_while(duration: Duration, running: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + duration;
    while running() {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn ticker_injects_commands_until_stopped() {
        let (tx, rx) = mpsc::channel();
        let keep_running = Arc::new(AtomicBool::new(true));
        let handle = spawn_ticker(
            CommandType::Challenge,
            Duration::from_millis(20),
            tx,
            keep_running.clone(),
        )
        .unwrap();
        assert_eq!(handle.thread().name(), Some("challenge"));

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.kind, CommandType::Challenge);
        assert_eq!(first.metadata, "null");
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second.kind, CommandType::Challenge);

        keep_running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }

    #[test]
    fn sleep_returns_early_when_stopped() {
        let keep_running = AtomicBool::new(false);
        let start = Instant::now();
        let running = || keep_running.load(Ordering::SeqCst);
        assert!(!sleep_while(Duration::from_secs(5), running));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn clean_output_ticker_thread_is_named() {
        let (tx, _rx) = mpsc::channel();
        let keep_running = Arc::new(AtomicBool::new(false));
        let handle = spawn_ticker(
            CommandType::CleanOutput,
            Duration::from_millis(20),
            tx,
            keep_running,
        )
        .unwrap();
        assert_eq!(handle.thread().name(), Some("clean_output"));
        handle.join().unwrap();
    }
}

// Outbound mailbox for bridge-only (human proxy) sessions.
//
// Human proxies have negative session ids and no wire connection. Commands
// addressed to them are filed here by the outbound dispatcher and picked up
// by the external bridge, which polls per session and receives everything
// pending at once, joined with `SEPARATOR`.
//
// This is the one structure shared between threads with real contention: the
// outbound dispatcher inserts, bridge callers poll-and-remove, and the
// dispatcher's CLEAN_OUTPUT handler purges expired entries. Every
// inspect-and-modify sequence runs under a single lock acquisition.
//
// The mailbox also records which human proxies the bridge has touched since
// the last scheduling tick. The CHALLENGE handler drains that set and
// disconnects proxies that were not touched.
//
// Time is passed in explicitly (`*_at` methods) so expiry can be tested
// without sleeping.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use gridwars_protocol::SessionId;
use parking_lot::Mutex;

/// Terminator appended after every rendered command in a poll result.
pub const SEPARATOR: &str = "&&";

/// A command waiting for the bridge to collect it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxEntry {
    pub session: SessionId,
    pub text: String,
    pub created_at: Instant,
}

impl MailboxEntry {
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.created_at + ttl <= now
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<MailboxEntry>,
    touched: BTreeSet<SessionId>,
}

/// Shared per-session holding area for bridge-bound commands.
#[derive(Debug)]
pub struct Mailbox {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl Mailbox {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// File a rendered command for `session`.
    pub fn deliver(&self, session: SessionId, text: String) {
        self.deliver_at(session, text, Instant::now());
    }

    pub fn deliver_at(&self, session: SessionId, text: String, now: Instant) {
        self.inner.lock().entries.push(MailboxEntry {
            session,
            text,
            created_at: now,
        });
    }

    /// Remove and return everything pending for `session`, each entry
    /// followed by `SEPARATOR`. Also marks the session as touched. Returns an
    /// empty string if nothing is pending.
    pub fn poll(&self, session: SessionId) -> String {
        let mut inner = self.inner.lock();
        inner.touched.insert(session);
        let mut out = String::new();
        inner.entries.retain(|entry| {
            if entry.session == session {
                out.push_str(&entry.text);
                out.push_str(SEPARATOR);
                false
            } else {
                true
            }
        });
        out
    }

    /// Record bridge activity for `session` without collecting mail.
    pub fn touch(&self, session: SessionId) {
        self.inner.lock().touched.insert(session);
    }

    /// Take the set of sessions touched since the previous call.
    pub fn take_touched(&self) -> BTreeSet<SessionId> {
        std::mem::take(&mut self.inner.lock().touched)
    }

    /// Drop every entry addressed to `session`. Returns how many were
    /// removed.
    pub fn discard(&self, session: SessionId) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|entry| entry.session != session);
        before - inner.entries.len()
    }

    /// Remove every expired entry and return the distinct sessions that lost
    /// at least one, in id order.
    pub fn purge_expired(&self, now: Instant) -> Vec<SessionId> {
        let ttl = self.ttl;
        let mut inner = self.inner.lock();
        let mut expired = BTreeSet::new();
        inner.entries.retain(|entry| {
            if entry.is_expired(ttl, now) {
                expired.insert(entry.session);
                false
            } else {
                true
            }
        });
        expired.into_iter().collect()
    }

    /// Number of entries pending for `session`.
    pub fn pending(&self, session: SessionId) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.session == session)
            .count()
    }
}

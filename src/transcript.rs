//! Client-side, append-only conversation log.
//!
//! A [`Transcript`] is owned by exactly one client session. Entries are kept
//! in insertion order, which is conversation order, and are never edited or
//! removed. Only one exchange may be in flight at a time: callers open one
//! with [`Transcript::begin_exchange`] and the returned guard releases the
//! slot when dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::message::{Message, Role};

/// Errors raised by the transcript.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranscriptError {
    /// A send is already in progress for this session.
    #[error("an exchange is already in flight for this session")]
    SendInFlight,
}

/// Ordered, append-only log of exchanged messages.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Message>,
    in_flight: Arc<AtomicBool>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message at the end. Never fails and never touches earlier entries.
    pub fn append(&mut self, message: Message) -> &Message {
        self.entries.push(message);
        &self.entries[self.entries.len() - 1]
    }

    /// Ordered view of every entry, for serialization.
    pub fn snapshot(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    /// Most recent user-authored entry.
    pub fn latest_user_message(&self) -> Option<&Message> {
        self.entries.iter().rev().find(|m| m.role == Role::User)
    }

    /// Whether the last entry is a user message that has no answer yet.
    pub fn awaiting_reply(&self) -> bool {
        self.last().is_some_and(|m| m.role == Role::User)
    }

    /// Whether an exchange guard is currently held.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the single in-flight slot for this session.
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::SendInFlight`] while another guard is alive.
    pub fn begin_exchange(&self) -> Result<ExchangeGuard, TranscriptError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TranscriptError::SendInFlight)?;
        Ok(ExchangeGuard {
            flag: Arc::clone(&self.in_flight),
        })
    }
}

/// Holds the in-flight slot of a [`Transcript`]; released on drop.
#[derive(Debug)]
pub struct ExchangeGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

//! Discarding stale responses.
//!
//! Independent requests complete in any order. A view that issues a new list
//! request (next page, new search term) before the previous one returned must
//! not render the older response. [`RequestGeneration`] hands out a
//! [`Ticket`] per request; only the ticket of the most recent request is
//! current.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct RequestGeneration {
    current: Arc<AtomicU64>,
}

/// Proof of which request a response belongs to.
#[derive(Debug, Clone)]
pub struct Ticket {
    id: u64,
    current: Arc<AtomicU64>,
}

impl RequestGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request, superseding every earlier ticket.
    pub fn begin(&self) -> Ticket {
        let id = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        Ticket {
            id,
            current: self.current.clone(),
        }
    }

    /// Supersedes every outstanding ticket without starting a request.
    pub fn cancel_all(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }
}

impl Ticket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.id
    }

    /// Returns `value` only if this ticket is still current.
    pub fn accept<T>(&self, value: T) -> Option<T> {
        self.is_current().then_some(value)
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

/// Generation stamp taken when a fetch cycle is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0
    }
}

/// Orders fetch responses by issuance rather than arrival.
///
/// A response may be applied only when its ticket is newer than every ticket applied
/// before it. Admission and the state write must happen under the same lock, otherwise two
/// admitted responses can still land out of order.
#[derive(Debug, Default)]
pub struct GenerationGate {
    issued: AtomicU64,
    applied: AtomicU64,
}

impl GenerationGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        }
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Record `ticket` as applied if it is the newest seen so far.
    pub fn admit(&self, ticket: Ticket) -> bool {
        self.applied.fetch_max(ticket.0, Ordering::AcqRel) < ticket.0
    }

    /// Whether `ticket` could still be admitted.
    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 > self.applied.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }
}

//! Duplicate detection keyed by transaction identity.
//!
//! A [`Reservation`] is released when dropped unless it was committed, so a
//! request that fails, or whose future is cancelled, never leaves its
//! identity blocked.

use crate::transaction::{Hash, TxIdentity};
use crate::Error;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Accepted by the pipeline, not yet acknowledged by the network.
    Reserved,
    /// Submitted successfully. Kept until its blockhash expires.
    Committed,
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: EntryState,
    blockhash: Hash,
}

#[derive(Debug, Default)]
pub struct DuplicateGuard {
    entries: DashMap<TxIdentity, Tracked>,
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `identity`. Fails if it is already reserved or committed.
    pub fn reserve(&self, identity: TxIdentity, blockhash: Hash) -> Result<Reservation<'_>, Error> {
        match self.entries.entry(identity) {
            Entry::Occupied(_) => Err(Error::DuplicateTransaction),
            Entry::Vacant(slot) => {
                slot.insert(Tracked {
                    state: EntryState::Reserved,
                    blockhash,
                });
                Ok(Reservation {
                    guard: self,
                    identity,
                    committed: false,
                })
            }
        }
    }

    /// Drop a reservation. Committed identities are left alone.
    pub fn release(&self, identity: &TxIdentity) -> bool {
        self.entries
            .remove_if(identity, |_, t| t.state == EntryState::Reserved)
            .is_some()
    }

    fn commit(&self, identity: &TxIdentity) {
        if let Some(mut tracked) = self.entries.get_mut(identity) {
            tracked.state = EntryState::Committed;
        }
    }

    pub fn state(&self, identity: &TxIdentity) -> Option<EntryState> {
        self.entries.get(identity).map(|t| t.state)
    }

    /// Evict every identity whose blockhash is no longer valid. Such a
    /// transaction can never land, so it can never be replayed either.
    pub fn prune(&self, is_valid: impl Fn(&Hash) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, t| is_valid(&t.blockhash));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "Pruned tracked identities");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Claim on an identity held while a transaction is signed and submitted.
#[must_use = "dropping a reservation releases it"]
#[derive(Debug)]
pub struct Reservation<'a> {
    guard: &'a DuplicateGuard,
    identity: TxIdentity,
    committed: bool,
}

impl Reservation<'_> {
    /// Keep the identity until its blockhash expires.
    pub fn commit(mut self) {
        self.guard.commit(&self.identity);
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.guard.release(&self.identity);
        }
    }
}

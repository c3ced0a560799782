//! Exclusive engine resource arbitration and the player registry
//!
//! Only one controller in the process may drive the playback engine at a
//! time. Grants are taken and returned from inside a controller's prefetch
//! and deallocate commands, so they are always made on worker threads.

use crate::player::ControllerId;
use log::{debug, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

static GLOBAL: Lazy<Arc<ResourceArbiter>> = Lazy::new(|| Arc::new(ResourceArbiter::new()));

/// Resources a handler can require to prefetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// The playback engine; exclusive
    Playback,
}

#[derive(Debug, Default)]
struct ArbiterState {
    grants: HashMap<ResourceKind, ControllerId>,
    players: BTreeSet<ControllerId>,
}

/// Grants exclusive resources to at most one controller each
#[derive(Debug, Default)]
pub struct ResourceArbiter {
    state: Mutex<ArbiterState>,
}

impl ResourceArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide arbiter used by controllers that are not given one
    pub fn global() -> Arc<ResourceArbiter> {
        Arc::clone(&GLOBAL)
    }

    /// Grant `kind` to `owner`; `false` if another controller holds it
    ///
    /// Allocating a resource the owner already holds succeeds.
    pub fn allocate(&self, owner: ControllerId, kind: ResourceKind) -> bool {
        let mut state = self.state.lock();
        match state.grants.get(&kind) {
            Some(holder) if *holder != owner => {
                debug!("{:?} denied to {}, held by {}", kind, owner, holder);
                false
            }
            Some(_) => true,
            None => {
                state.grants.insert(kind, owner);
                info!("{:?} granted to {}", kind, owner);
                true
            }
        }
    }

    /// Return every grant held by `owner`; a no-op if it holds none
    pub fn release(&self, owner: ControllerId) {
        let mut state = self.state.lock();
        state.grants.retain(|kind, holder| {
            if *holder == owner {
                info!("{:?} released by {}", kind, owner);
                false
            } else {
                true
            }
        });
    }

    pub fn holder(&self, kind: ResourceKind) -> Option<ControllerId> {
        self.state.lock().grants.get(&kind).copied()
    }

    pub fn holds(&self, owner: ControllerId, kind: ResourceKind) -> bool {
        self.holder(kind) == Some(owner)
    }

    pub fn register(&self, player: ControllerId) {
        self.state.lock().players.insert(player);
    }

    /// Remove from the registry, dropping any grants still held
    pub fn unregister(&self, player: ControllerId) {
        self.release(player);
        self.state.lock().players.remove(&player);
    }

    /// Controllers currently registered, in creation order
    pub fn registered(&self) -> Vec<ControllerId> {
        self.state.lock().players.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_exclusive_grant() {
        let arbiter = ResourceArbiter::new();
        let a = ControllerId::next();
        let b = ControllerId::next();

        assert!(arbiter.allocate(a, ResourceKind::Playback));
        assert!(arbiter.allocate(a, ResourceKind::Playback));
        assert!(!arbiter.allocate(b, ResourceKind::Playback));
        assert_eq!(arbiter.holder(ResourceKind::Playback), Some(a));

        arbiter.release(a);
        arbiter.release(a);
        assert_eq!(arbiter.holder(ResourceKind::Playback), None);
        assert!(arbiter.allocate(b, ResourceKind::Playback));
        assert!(arbiter.holds(b, ResourceKind::Playback));
    }

    #[test]
    fn test_registry() {
        let arbiter = ResourceArbiter::new();
        let a = ControllerId::next();
        let b = ControllerId::next();
        arbiter.register(a);
        arbiter.register(b);
        arbiter.allocate(b, ResourceKind::Playback);

        arbiter.unregister(b);
        assert_eq!(arbiter.registered(), vec![a]);
        assert_eq!(arbiter.holder(ResourceKind::Playback), None);
    }

    #[test]
    fn test_concurrent_allocation_single_winner() {
        let arbiter = Arc::new(ResourceArbiter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let arbiter = Arc::clone(&arbiter);
                thread::spawn(move || arbiter.allocate(ControllerId::next(), ResourceKind::Playback))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(winners, 1);
    }
}

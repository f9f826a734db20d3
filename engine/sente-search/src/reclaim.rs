//! Lazy reclamation of detached subtrees.
//!
//! When the root advances, discarded ancestors are handed to a background
//! task instead of being freed on the controller thread. The task waits
//! until the previous episode's pending counter drains and no in-flight
//! simulation still holds a virtual loss on the detached root, then frees
//! the whole batch. Reclamation runs in parallel with the next episode.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace};

use crate::node::UctNode;

pub(crate) fn spawn(to_delete: Vec<Box<UctNode>>, pending: Arc<AtomicI32>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("sente-reclaimer".into())
        .spawn(move || {
            loop {
                let in_flight = pending.load(Ordering::SeqCst);
                let root_vl = to_delete.first().map_or(0, |n| n.virtual_loss());
                if in_flight <= 0 && root_vl == 0 {
                    break;
                }
                trace!(in_flight, root_vl, "detached tree still referenced");
                std::thread::sleep(Duration::from_millis(25));
            }
            debug!(subtrees = to_delete.len(), "reclaiming detached subtrees");
            drop(to_delete);
        })
        .expect("spawn reclaimer thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::Move;

    #[test]
    fn waits_for_pending_simulations() {
        let pending = Arc::new(AtomicI32::new(1));
        let root = Box::new(UctNode::new(Move::Pass, 0.0));
        let handle = spawn(vec![root], Arc::clone(&pending));

        std::thread::sleep(Duration::from_millis(60));
        assert!(!handle.is_finished());

        pending.fetch_sub(1, Ordering::SeqCst);
        handle.join().unwrap();
    }

    #[test]
    fn waits_for_virtual_losses_to_drain() {
        let pending = Arc::new(AtomicI32::new(0));
        let root = Box::new(UctNode::new(Move::Pass, 0.0));
        root.add_virtual_loss(1);
        // Reclaimer owns the boxes; keep a raw handle for the undo.
        let raw = &*root as *const UctNode;
        let handle = spawn(vec![root], pending);

        std::thread::sleep(Duration::from_millis(60));
        assert!(!handle.is_finished());

        unsafe { (*raw).undo_virtual_loss(1) };
        handle.join().unwrap();
    }
}

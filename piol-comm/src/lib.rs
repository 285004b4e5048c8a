//! Communication between the workers of a PIOL job.
//!
//! Every worker of a job holds one [`Communicator`]. All cross-worker interaction in the
//! library goes through it: point-to-point messages between neighbours and collectives over
//! the whole group. Collectives must be entered by every worker, in the same order; a worker
//! that skips one leaves its peers blocked. That is a caller contract and is not detected.

pub use ext::*;
pub use local::*;

mod ext;
mod local;

use bytes::Bytes;
use piol_error::{PiolResult, piol_bail};

/// A handle to the group of workers cooperating on one job.
///
/// Implementations only need to provide ordered, reliable point-to-point messaging. The
/// collective operations have default implementations in terms of [`send`][Self::send] and
/// [`recv`][Self::recv], which rely on sends being buffered: a send never waits for the
/// matching receive.
pub trait Communicator: Send + Sync {
    /// The index of this worker within the group.
    fn rank(&self) -> usize;

    /// The number of workers in the group.
    fn num_ranks(&self) -> usize;

    /// Send a message to `peer`. Messages between a pair of workers arrive in send order.
    fn send(&self, peer: usize, payload: Bytes) -> PiolResult<()>;

    /// Block until the next message from `peer` arrives.
    fn recv(&self, peer: usize) -> PiolResult<Bytes>;

    /// Gather one payload from every worker, to every worker. Entry `i` is rank `i`'s payload.
    fn all_gather(&self, payload: Bytes) -> PiolResult<Vec<Bytes>> {
        let rank = self.rank();
        let num_ranks = self.num_ranks();
        for peer in (0..num_ranks).filter(|&peer| peer != rank) {
            self.send(peer, payload.clone())?;
        }
        (0..num_ranks)
            .map(|peer| {
                if peer == rank {
                    Ok(payload.clone())
                } else {
                    self.recv(peer)
                }
            })
            .collect()
    }

    /// Distribute the root's payload to every worker. Only the root passes a payload.
    fn broadcast(&self, root: usize, payload: Option<Bytes>) -> PiolResult<Bytes> {
        if root >= self.num_ranks() {
            piol_bail!("broadcast root {root} outside a group of {}", self.num_ranks());
        }
        if self.rank() != root {
            return self.recv(root);
        }
        let Some(payload) = payload else {
            piol_bail!("broadcast root {root} has nothing to send");
        };
        for peer in (0..self.num_ranks()).filter(|&peer| peer != root) {
            self.send(peer, payload.clone())?;
        }
        Ok(payload)
    }

    /// Block until every worker has entered the barrier.
    fn barrier(&self) -> PiolResult<()> {
        self.all_gather(Bytes::new()).map(|_| ())
    }
}

impl<C: Communicator + ?Sized> Communicator for std::sync::Arc<C> {
    fn rank(&self) -> usize {
        C::rank(self)
    }

    fn num_ranks(&self) -> usize {
        C::num_ranks(self)
    }

    fn send(&self, peer: usize, payload: Bytes) -> PiolResult<()> {
        C::send(self, peer, payload)
    }

    fn recv(&self, peer: usize) -> PiolResult<Bytes> {
        C::recv(self, peer)
    }

    fn all_gather(&self, payload: Bytes) -> PiolResult<Vec<Bytes>> {
        C::all_gather(self, payload)
    }

    fn broadcast(&self, root: usize, payload: Option<Bytes>) -> PiolResult<Bytes> {
        C::broadcast(self, root, payload)
    }

    fn barrier(&self) -> PiolResult<()> {
        C::barrier(self)
    }
}

use std::panic::resume_unwind;

use bytes::Bytes;
use log::trace;
use piol_error::{PiolResult, ResultExt, piol_bail, piol_err};

use crate::Communicator;

/// A [communicator][Communicator] for a group of workers living in one process.
///
/// Every ordered pair of ranks is joined by an unbounded channel, so sends never block and
/// messages between two workers arrive in the order they were sent. A group of one is the
/// communicator for a plain single-process job.
#[derive(Debug)]
pub struct LocalCommunicator {
    rank: usize,
    // senders[peer] carries messages from this rank to `peer`.
    senders: Vec<flume::Sender<Bytes>>,
    // receivers[peer] carries messages from `peer` to this rank.
    receivers: Vec<flume::Receiver<Bytes>>,
}

impl LocalCommunicator {
    /// Create the communicators for a group of `num_ranks` workers, indexed by rank.
    pub fn group(num_ranks: usize) -> Vec<Self> {
        // channels[src][dst]
        let mut channels: Vec<Vec<Option<(flume::Sender<Bytes>, flume::Receiver<Bytes>)>>> =
            (0..num_ranks)
                .map(|_| (0..num_ranks).map(|_| Some(flume::unbounded())).collect())
                .collect();

        let senders: Vec<Vec<flume::Sender<Bytes>>> = channels
            .iter()
            .map(|row| row.iter().flatten().map(|(tx, _)| tx.clone()).collect())
            .collect();

        (0..num_ranks)
            .zip(senders)
            .map(|(rank, senders)| {
                let receivers = channels
                    .iter_mut()
                    .filter_map(|row| row[rank].take().map(|(_, rx)| rx))
                    .collect();
                Self {
                    rank,
                    senders,
                    receivers,
                }
            })
            .collect()
    }

    /// The communicator of a job with a single worker.
    pub fn single() -> Self {
        Self::group(1)
            .pop()
            .unwrap_or_else(|| unreachable!("a group of one has one member"))
    }

    fn check_peer(&self, peer: usize) -> PiolResult<()> {
        if peer >= self.senders.len() {
            piol_bail!(CommError: "rank {} addressed peer {peer} outside a group of {}", self.rank, self.senders.len());
        }
        Ok(())
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, peer: usize, payload: Bytes) -> PiolResult<()> {
        self.check_peer(peer)?;
        trace!("rank {} -> {peer}: {} bytes", self.rank, payload.len());
        self.senders[peer]
            .send(payload)
            .map_err(|_| piol_err!(CommError: "rank {peer} hung up before rank {} could send", self.rank))
    }

    fn recv(&self, peer: usize) -> PiolResult<Bytes> {
        self.check_peer(peer)?;
        let payload = self.receivers[peer]
            .recv()
            .map_err(|_| piol_err!(CommError: "rank {peer} hung up before rank {} could receive", self.rank))?;
        trace!("rank {} <- {peer}: {} bytes", self.rank, payload.len());
        Ok(payload)
    }
}

/// Run `f` once per rank of a fresh group of `num_ranks` workers, one thread each.
///
/// Results are returned in rank order. A panic on any worker is propagated; the first
/// error (by rank) is returned otherwise.
pub fn run_group<T, F>(num_ranks: usize, f: F) -> PiolResult<Vec<T>>
where
    T: Send,
    F: Fn(LocalCommunicator) -> PiolResult<T> + Sync,
{
    let f = &f;
    std::thread::scope(|scope| {
        let handles = LocalCommunicator::group(num_ranks)
            .into_iter()
            .map(|comm| {
                std::thread::Builder::new()
                    .name(format!("piol-worker-{}", comm.rank))
                    .spawn_scoped(scope, move || f(comm))
                    .map_err(|e| piol_err!(CommError: "failed to spawn worker thread: {e}"))
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| {
                let joined = handle.map(|h| h.join().unwrap_or_else(|err| resume_unwind(err)));
                ResultExt::flatten(joined)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use crate::{Communicator, LocalCommunicator, run_group};

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn all_gather_is_rank_ordered(#[case] num_ranks: usize) {
        let results = run_group(num_ranks, |comm| {
            comm.all_gather(Bytes::from(vec![comm.rank() as u8; comm.rank() + 1]))
        })
        .unwrap();

        for gathered in results {
            assert_eq!(gathered.len(), num_ranks);
            for (rank, payload) in gathered.iter().enumerate() {
                assert_eq!(payload.len(), rank + 1);
                assert!(payload.iter().all(|&b| b as usize == rank));
            }
        }
    }

    #[test]
    fn broadcast_from_non_zero_root() {
        let results = run_group(3, |comm| {
            let payload = (comm.rank() == 2).then(|| Bytes::from_static(b"seg-y"));
            comm.broadcast(2, payload)
        })
        .unwrap();
        assert!(results.iter().all(|b| b.as_ref() == b"seg-y"));
    }

    #[test]
    fn messages_arrive_in_send_order() {
        let results = run_group(2, |comm| {
            if comm.rank() == 0 {
                for i in 0u8..4 {
                    comm.send(1, Bytes::from(vec![i]))?;
                }
                comm.barrier()?;
                Ok(vec![])
            } else {
                let received = (0..4)
                    .map(|_| comm.recv(0).map(|b| b[0]))
                    .collect::<Result<Vec<_>, _>>()?;
                comm.barrier()?;
                Ok(received)
            }
        })
        .unwrap();
        assert_eq!(results[1], vec![0, 1, 2, 3]);
    }

    #[test]
    fn recv_from_departed_peer_fails() {
        let mut group = LocalCommunicator::group(2);
        let second = group.pop().unwrap();
        drop(group);
        assert!(second.recv(0).is_err());
    }

    #[test]
    fn single_worker_collectives() {
        let comm = LocalCommunicator::single();
        assert_eq!(comm.num_ranks(), 1);
        comm.barrier().unwrap();
        let gathered = comm.all_gather(Bytes::from_static(b"x")).unwrap();
        assert_eq!(gathered, vec![Bytes::from_static(b"x")]);
    }
}

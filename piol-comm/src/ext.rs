use bytes::{Buf, BufMut, Bytes, BytesMut};
use piol_error::{PiolResult, piol_bail};

use crate::Communicator;

/// Typed collectives built on the byte-level [`Communicator`] operations.
pub trait CommunicatorExt: Communicator {
    /// Send to `peer` and then receive from it. Both sides of the pair must call this.
    fn sendrecv(&self, peer: usize, payload: Bytes) -> PiolResult<Bytes> {
        self.send(peer, payload)?;
        self.recv(peer)
    }

    /// Gather one `u64` from every worker, indexed by rank.
    fn all_gather_u64(&self, value: u64) -> PiolResult<Vec<u64>> {
        let mut buf = BytesMut::with_capacity(size_of::<u64>());
        buf.put_u64_le(value);
        self.all_gather(buf.freeze())?
            .into_iter()
            .enumerate()
            .map(|(rank, mut bytes)| {
                if bytes.len() != size_of::<u64>() {
                    piol_bail!(CommError: "rank {rank} sent {} bytes, expected a u64", bytes.len());
                }
                Ok(bytes.get_u64_le())
            })
            .collect()
    }

    /// Logical AND of `value` across every worker. All workers receive the same answer.
    fn all_reduce_and(&self, value: bool) -> PiolResult<bool> {
        Ok(self
            .all_gather_u64(u64::from(value))?
            .into_iter()
            .all(|v| v != 0))
    }

    /// Sum of `value` across every worker.
    fn all_reduce_sum(&self, value: u64) -> PiolResult<u64> {
        Ok(self.all_gather_u64(value)?.into_iter().sum())
    }

    /// Exclusive prefix sum of `value` in rank order, i.e. the sum over all lower ranks.
    fn exclusive_scan_sum(&self, value: u64) -> PiolResult<u64> {
        let rank = self.rank();
        Ok(self.all_gather_u64(value)?.into_iter().take(rank).sum())
    }
}

impl<C: Communicator + ?Sized> CommunicatorExt for C {}

#[cfg(test)]
mod tests {
    use crate::{Communicator, CommunicatorExt, run_group};

    #[test]
    fn reductions_agree_on_every_rank() {
        let results = run_group(4, |comm| {
            let rank = comm.rank() as u64;
            Ok((
                comm.all_reduce_and(rank != 2)?,
                comm.all_reduce_sum(rank)?,
                comm.exclusive_scan_sum(10)?,
            ))
        })
        .unwrap();

        for (rank, (all, sum, scan)) in results.into_iter().enumerate() {
            assert!(!all);
            assert_eq!(sum, 6);
            assert_eq!(scan, 10 * rank as u64);
        }
    }

    #[test]
    fn sendrecv_swaps_between_neighbours() {
        let results = run_group(2, |comm| {
            let peer = 1 - comm.rank();
            let payload = bytes::Bytes::from(vec![comm.rank() as u8]);
            comm.sendrecv(peer, payload)
        })
        .unwrap();

        assert_eq!(results[0].as_ref(), &[1]);
        assert_eq!(results[1].as_ref(), &[0]);
    }
}

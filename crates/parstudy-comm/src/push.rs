//! Non-blocking all-to-all exchange with unknown message counts.
//!
//! Every rank posts its sends, then keeps draining incoming messages.
//! Once all of its own sends have been matched it enters a non-blocking
//! barrier, but keeps draining. When the barrier completes, every rank
//! has had every one of its sends matched, so nothing is left in flight.

use crate::comm::{Communicator, Rank, Request, Tag};

/// Send each `(dest, bytes)` message and hand every message received on
/// `tag` to `on_receive(source, bytes)`, returning once all ranks have
/// finished.
///
/// Collective: every rank of `comm` must call this with the same `tag`.
/// A rank with nothing to send still participates. Sends to self are
/// delivered through the same path as remote ones.
pub fn push_parallel_helper<C, I, F>(comm: &C, tag: Tag, sends: I, mut on_receive: F)
where
    C: Communicator + ?Sized,
    I: IntoIterator<Item = (Rank, Vec<u8>)>,
    F: FnMut(Rank, Vec<u8>),
{
    let mut requests: Vec<C::SendRequest> = sends
        .into_iter()
        .map(|(dest, bytes)| comm.isend(dest, tag, &bytes))
        .collect();
    let posted = requests.len();
    let mut received = 0usize;
    let mut barrier: Option<C::BarrierRequest> = None;

    loop {
        while let Some(status) = comm.iprobe(tag) {
            let bytes = comm.irecv(&status).wait();
            received += 1;
            on_receive(status.source, bytes);
        }

        match barrier.as_mut() {
            None => {
                requests.retain_mut(|r| !r.test());
                if requests.is_empty() {
                    barrier = Some(comm.ibarrier());
                }
            }
            Some(b) => {
                if b.test() {
                    break;
                }
            }
        }
        std::thread::yield_now();
    }

    tracing::trace!(rank = comm.rank(), %tag, posted, received, "push exchange complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCluster;

    #[test]
    fn every_rank_hears_from_every_other() {
        let size = 4;
        let results = LocalCluster::run(size, |comm| {
            let tag = comm.unique_tag();
            let sends = (0..comm.size())
                .filter(|&d| d != comm.rank())
                .map(|d| (d, vec![comm.rank() as u8; d + 1]));
            let mut got = Vec::new();
            push_parallel_helper(&comm, tag, sends, |src, bytes| got.push((src, bytes)));
            got.sort();
            got
        });
        for (rank, got) in results.into_iter().enumerate() {
            let expected: Vec<_> = (0..size)
                .filter(|&s| s != rank)
                .map(|s| (s, vec![s as u8; rank + 1]))
                .collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn silent_ranks_still_terminate() {
        let results = LocalCluster::run(3, |comm| {
            let tag = comm.unique_tag();
            let sends = if comm.rank() == 2 {
                vec![(0, b"a".to_vec()), (0, b"b".to_vec()), (2, b"self".to_vec())]
            } else {
                Vec::new()
            };
            let mut got = Vec::new();
            push_parallel_helper(&comm, tag, sends, |_, bytes| got.push(bytes));
            got
        });
        assert_eq!(results[0], vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(results[1].is_empty());
        assert_eq!(results[2], vec![b"self".to_vec()]);
    }

    #[test]
    fn back_to_back_exchanges_stay_separate() {
        let results = LocalCluster::run(2, |comm| {
            let first = comm.unique_tag();
            let second = comm.unique_tag();
            let peer = 1 - comm.rank();
            let mut a = 0;
            let mut b = 0;
            push_parallel_helper(&comm, first, [(peer, vec![1])], |_, _| a += 1);
            push_parallel_helper(&comm, second, [(peer, vec![2]), (peer, vec![3])], |_, _| {
                b += 1
            });
            (a, b)
        });
        assert_eq!(results, vec![(1, 2), (1, 2)]);
    }
}

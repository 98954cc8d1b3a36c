//! In-process communicator: one OS thread per rank.
//!
//! Point-to-point messages travel over one unbounded `crossbeam-channel`
//! mailbox per rank. A probe drains the mailbox into a local stash and
//! scans it in arrival order, so messages from one source with one tag
//! are matched in the order they were sent. Each envelope carries a
//! shared `delivered` flag that the receiver raises when it matches the
//! message, giving sends synchronous-mode completion.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::collective::{Collectives, Key, Kind};
use crate::comm::{Communicator, Rank, Request, Status, Tag};

/// First tag handed out by [`Communicator::unique_tag`].
const FIRST_TAG: u32 = 1;

struct Envelope {
    source: Rank,
    tag: Tag,
    payload: Vec<u8>,
    delivered: Arc<AtomicBool>,
}

impl Envelope {
    fn mark_delivered(&self) {
        self.delivered.store(true, Ordering::Release);
    }
}

/// Runs a closure once per rank on its own named thread.
pub struct LocalCluster;

impl LocalCluster {
    /// Spawn `size` ranks, hand each a connected [`LocalComm`], and
    /// collect the closure results in rank order.
    ///
    /// A panic on any rank is re-raised on the calling thread once all
    /// ranks have stopped.
    ///
    /// # Panics
    ///
    /// Panics if `size == 0` or a rank thread cannot be spawned.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Sync,
        R: Send,
    {
        assert!(size > 0, "a cluster needs at least one rank");
        let comms = Self::connect(size);
        let f = &f;
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    std::thread::Builder::new()
                        .name(format!("rank-{}", comm.rank))
                        .spawn_scoped(s, move || f(comm))
                        .expect("failed to spawn rank thread")
                })
                .collect();
            let mut results = Vec::with_capacity(size);
            let mut panic = None;
            for handle in handles {
                match handle.join() {
                    Ok(r) => results.push(r),
                    Err(payload) => {
                        panic.get_or_insert(payload);
                    }
                }
            }
            if let Some(payload) = panic {
                std::panic::resume_unwind(payload);
            }
            results
        })
    }

    /// Build `size` connected communicators without spawning threads.
    pub fn connect(size: usize) -> Vec<LocalComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        let collectives = Arc::new(Collectives::new(size));
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank,
                size,
                outboxes: senders.clone(),
                inbox,
                stash: RefCell::new(VecDeque::new()),
                collectives: Arc::clone(&collectives),
                next_tag: Cell::new(FIRST_TAG),
                sums_issued: Cell::new(0),
                barriers_issued: Cell::new(0),
                gathers_issued: Cell::new(0),
            })
            .collect()
    }
}

/// One rank's endpoint in a [`LocalCluster`].
///
/// Not `Sync`: a rank's communicator is driven from its own thread.
pub struct LocalComm {
    rank: Rank,
    size: usize,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: RefCell<VecDeque<Envelope>>,
    collectives: Arc<Collectives>,
    next_tag: Cell<u32>,
    sums_issued: Cell<u64>,
    barriers_issued: Cell<u64>,
    gathers_issued: Cell<u64>,
}

impl LocalComm {
    /// A communicator of size one, for serial use.
    pub fn single() -> Self {
        let mut comms = LocalCluster::connect(1);
        match comms.pop() {
            Some(comm) => comm,
            None => unreachable!("connect(1) yields one communicator"),
        }
    }

    /// Number of received messages not yet matched by `irecv`.
    pub fn pending_messages(&self) -> usize {
        self.pull_inbox();
        self.stash.borrow().len()
    }

    /// Collectives started on any rank that some rank has not yet
    /// finished. Zero once every rank has completed every collective it
    /// joined.
    pub fn open_collectives(&self) -> usize {
        self.collectives.live_slots()
    }

    fn pull_inbox(&self) {
        let mut stash = self.stash.borrow_mut();
        stash.extend(self.inbox.try_iter());
    }

    fn next_key(&self, kind: Kind) -> Key {
        let counter = match kind {
            Kind::Sum => &self.sums_issued,
            Kind::Barrier => &self.barriers_issued,
            Kind::Gather => &self.gathers_issued,
        };
        let seq = counter.get();
        counter.set(seq + 1);
        (kind, seq)
    }
}

impl fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("stashed", &self.stash.borrow().len())
            .finish()
    }
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        // Release peers waiting on sends we will never match.
        self.pull_inbox();
        for envelope in self.stash.borrow().iter() {
            envelope.mark_delivered();
        }
    }
}

/// Send request of a [`LocalComm`].
#[derive(Debug)]
pub struct LocalSendRequest {
    delivered: Arc<AtomicBool>,
}

impl Request for LocalSendRequest {
    type Output = ();

    fn test(&mut self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    fn finish(self) {}
}

/// Receive request of a [`LocalComm`]. Complete as soon as it is posted.
#[derive(Debug)]
pub struct LocalRecvRequest {
    payload: Vec<u8>,
}

impl Request for LocalRecvRequest {
    type Output = Vec<u8>;

    fn test(&mut self) -> bool {
        true
    }

    fn finish(self) -> Vec<u8> {
        self.payload
    }
}

/// Collective request of a [`LocalComm`].
#[derive(Debug)]
pub struct LocalCollectiveRequest<T> {
    collectives: Arc<Collectives>,
    key: Key,
    result: Option<T>,
    reduce: fn(Vec<Vec<u8>>) -> T,
}

impl<T> Request for LocalCollectiveRequest<T> {
    type Output = T;

    fn test(&mut self) -> bool {
        if self.result.is_none() {
            if let Some(parts) = self.collectives.try_collect(self.key) {
                self.result = Some((self.reduce)(parts));
            }
        }
        self.result.is_some()
    }

    fn finish(self) -> T {
        match self.result {
            Some(result) => result,
            None => panic!("collective {:?} finished before completing", self.key),
        }
    }
}

fn reduce_sum(parts: Vec<Vec<u8>>) -> u64 {
    parts
        .iter()
        .map(|p| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&p[..8]);
            u64::from_le_bytes(word)
        })
        .fold(0u64, u64::wrapping_add)
}

fn reduce_unit(_parts: Vec<Vec<u8>>) {}

fn reduce_gather(parts: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    parts
}

impl LocalComm {
    fn start_collective<T>(
        &self,
        kind: Kind,
        bytes: Vec<u8>,
        reduce: fn(Vec<Vec<u8>>) -> T,
    ) -> LocalCollectiveRequest<T> {
        let key = self.next_key(kind);
        self.collectives.contribute(key, self.rank, bytes);
        LocalCollectiveRequest {
            collectives: Arc::clone(&self.collectives),
            key,
            result: None,
            reduce,
        }
    }
}

impl Communicator for LocalComm {
    type SendRequest = LocalSendRequest;
    type RecvRequest = LocalRecvRequest;
    type SumRequest = LocalCollectiveRequest<u64>;
    type BarrierRequest = LocalCollectiveRequest<()>;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn unique_tag(&self) -> Tag {
        let tag = self.next_tag.get();
        self.next_tag.set(tag + 1);
        Tag(tag)
    }

    fn isend(&self, dest: Rank, tag: Tag, bytes: &[u8]) -> LocalSendRequest {
        assert!(dest < self.size, "destination rank {dest} out of range");
        let delivered = Arc::new(AtomicBool::new(false));
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload: bytes.to_vec(),
            delivered: Arc::clone(&delivered),
        };
        if let Err(err) = self.outboxes[dest].send(envelope) {
            tracing::warn!(
                from = self.rank,
                to = dest,
                %tag,
                "mailbox of destination rank is gone; dropping message"
            );
            err.into_inner().mark_delivered();
        }
        LocalSendRequest { delivered }
    }

    fn iprobe(&self, tag: Tag) -> Option<Status> {
        self.pull_inbox();
        self.stash
            .borrow()
            .iter()
            .find(|e| e.tag == tag)
            .map(|e| Status {
                source: e.source,
                tag: e.tag,
                len: e.payload.len(),
            })
    }

    fn irecv(&self, status: &Status) -> LocalRecvRequest {
        let mut stash = self.stash.borrow_mut();
        let pos = stash
            .iter()
            .position(|e| e.source == status.source && e.tag == status.tag);
        let envelope = match pos.and_then(|p| stash.remove(p)) {
            Some(envelope) => envelope,
            None => panic!(
                "irecv on rank {} without a matching probe for {} from rank {}",
                self.rank, status.tag, status.source
            ),
        };
        envelope.mark_delivered();
        LocalRecvRequest {
            payload: envelope.payload,
        }
    }

    fn isum(&self, value: u64) -> Self::SumRequest {
        self.start_collective(Kind::Sum, value.to_le_bytes().to_vec(), reduce_sum)
    }

    fn ibarrier(&self) -> Self::BarrierRequest {
        self.start_collective(Kind::Barrier, Vec::new(), reduce_unit)
    }

    fn all_gather(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.start_collective(Kind::Gather, bytes.to_vec(), reduce_gather)
            .wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rank_collectives_complete_immediately() {
        let comm = LocalComm::single();
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.sum(41), 41);
        comm.barrier();
        assert_eq!(comm.all_gather(b"x"), vec![b"x".to_vec()]);
    }

    #[test]
    fn send_completes_only_when_matched() {
        let mut comms = LocalCluster::connect(2);
        let b = comms.pop().unwrap();
        let a = comms.pop().unwrap();
        let tag = a.unique_tag();
        assert_eq!(b.unique_tag(), tag);

        let mut req = a.isend(1, tag, &[1, 2, 3]);
        assert!(!req.test());
        assert!(b.iprobe(Tag(tag.0 + 1)).is_none());
        let status = b.iprobe(tag).unwrap();
        assert_eq!(status.source, 0);
        assert_eq!(status.len, 3);
        assert!(!req.test(), "probing does not match");
        let payload = b.irecv(&status).wait();
        assert_eq!(payload, vec![1, 2, 3]);
        assert!(req.test());
        assert_eq!(b.pending_messages(), 0);
    }

    #[test]
    fn messages_from_one_source_keep_order() {
        let mut comms = LocalCluster::connect(2);
        let b = comms.pop().unwrap();
        let a = comms.pop().unwrap();
        let tag = Tag(9);
        let _r1 = a.isend(1, tag, &[1]);
        let _r2 = a.isend(1, Tag(10), &[5]);
        let _r3 = a.isend(1, tag, &[2]);
        let s = b.iprobe(tag).unwrap();
        assert_eq!(b.irecv(&s).wait(), vec![1]);
        let s = b.iprobe(tag).unwrap();
        assert_eq!(b.irecv(&s).wait(), vec![2]);
        assert!(b.iprobe(tag).is_none());
        assert_eq!(b.pending_messages(), 1);
    }

    #[test]
    fn dropping_receiver_releases_senders() {
        let mut comms = LocalCluster::connect(2);
        let b = comms.pop().unwrap();
        let a = comms.pop().unwrap();
        let mut before = a.isend(1, Tag(3), &[0]);
        drop(b);
        assert!(before.test());
        let mut after = a.isend(1, Tag(3), &[0]);
        assert!(after.test());
    }

    #[test]
    #[should_panic(expected = "without a matching probe")]
    fn irecv_without_probe_panics() {
        let comm = LocalComm::single();
        let status = Status {
            source: 0,
            tag: Tag(1),
            len: 0,
        };
        let _ = comm.irecv(&status);
    }

    #[test]
    fn unfinished_collective_stays_open() {
        let comm = LocalComm::single();
        let pending = comm.isum(3);
        assert_eq!(comm.open_collectives(), 1);
        assert_eq!(pending.wait(), 3);
        assert_eq!(comm.open_collectives(), 0);
    }

    #[test]
    fn cluster_sums_and_gathers() {
        let results = LocalCluster::run(4, |comm| {
            let total = comm.sum(comm.rank() as u64 + 1);
            comm.barrier();
            let gathered = comm.all_gather(&[comm.rank() as u8]);
            (total, gathered)
        });
        for (total, gathered) in results {
            assert_eq!(total, 10);
            assert_eq!(gathered, vec![vec![0], vec![1], vec![2], vec![3]]);
        }
    }

    #[test]
    fn collectives_of_different_kinds_interleave() {
        // Rank 0 issues sum then barrier, rank 1 barrier then sum.
        let results = LocalCluster::run(2, |comm| {
            if comm.rank() == 0 {
                let s = comm.isum(5);
                let b = comm.ibarrier();
                b.wait();
                s.wait()
            } else {
                let b = comm.ibarrier();
                let s = comm.isum(7);
                b.wait();
                s.wait()
            }
        });
        assert_eq!(results, vec![12, 12]);
    }

    #[test]
    fn ring_exchange_across_threads() {
        let results = LocalCluster::run(3, |comm| {
            let tag = comm.unique_tag();
            let next = (comm.rank() + 1) % comm.size();
            let send = comm.isend(next, tag, &[comm.rank() as u8]);
            let status = loop {
                if let Some(s) = comm.iprobe(tag) {
                    break s;
                }
                std::thread::yield_now();
            };
            let got = comm.irecv(&status).wait();
            send.wait();
            comm.barrier();
            got[0]
        });
        assert_eq!(results, vec![2, 0, 1]);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn rank_panic_propagates() {
        LocalCluster::run(2, |comm| {
            if comm.rank() == 1 {
                panic!("boom");
            }
        });
    }
}

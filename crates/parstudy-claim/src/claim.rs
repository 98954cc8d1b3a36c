//! The claim protocol.
//!
//! Every rank submits the items it generated. Each item is routed to
//! every rank whose (inflated) bounding box contains its start point;
//! those candidates locate the point, apply [`tie_break`] to the hits,
//! and keep the item only if the winning element is theirs. Because all
//! candidates see the same hits, exactly one of them keeps it.
//!
//! The result is then checked per id: every rank reports how many items
//! it submitted and claimed for each id to the rank `id % size`, which
//! flags any id whose claims differ from its submissions. A locator that
//! breaks cross-rank consistency shows up here as an item claimed twice
//! or not at all.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use parstudy_comm::packing::{
    pack_all, pack_range, read_u64_le, unpack_all, unpack_range_into, write_u64_le,
};
use parstudy_comm::{CodecError, Communicator, Packing, Rank, Tag, push_parallel_helper};

use crate::geometry::BoundingBox;
use crate::locator::{Claimable, PointLocator, tie_break};

/// Claim failures. Both are fatal for the caller's run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimError {
    /// Some item was lost or claimed more than once. Every rank reports
    /// the same id: the lowest one whose claims differ from its
    /// submissions.
    Verification {
        /// Item id.
        id: u64,
        /// Items with this id submitted across all ranks.
        submitted: u64,
        /// Claims of this id across all ranks.
        claimed: u64,
    },
    /// An exchanged message failed to decode.
    Codec(CodecError),
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verification {
                id,
                submitted,
                claimed,
            } => write!(
                f,
                "claim verification failed: item {id} submitted {submitted} times, claimed {claimed} times"
            ),
            Self::Codec(e) => write!(f, "failed to decode claimed items: {e}"),
        }
    }
}

impl Error for ClaimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            Self::Verification { .. } => None,
        }
    }
}

impl From<CodecError> for ClaimError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// Submissions and claims of one id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct IdCount {
    id: u64,
    submitted: u64,
    claimed: u64,
}

impl IdCount {
    fn add(&mut self, other: &IdCount) {
        self.submitted += other.submitted;
        self.claimed += other.claimed;
    }

    fn balanced(&self) -> bool {
        self.submitted == self.claimed
    }
}

impl Packing for IdCount {
    fn packed_size(&self) -> usize {
        24
    }

    fn pack(&self, out: &mut Vec<u8>) {
        write_u64_le(out, self.id);
        write_u64_le(out, self.submitted);
        write_u64_le(out, self.claimed);
    }

    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            id: read_u64_le(input)?,
            submitted: read_u64_le(input)?,
            claimed: read_u64_le(input)?,
        })
    }
}

fn count_for(counts: &mut BTreeMap<u64, IdCount>, id: u64) -> &mut IdCount {
    counts.entry(id).or_insert(IdCount {
        id,
        ..IdCount::default()
    })
}

/// Assigns each item exactly one owning rank.
///
/// Collective: every rank constructs its `ClaimItems` in the same order
/// and calls [`claim`](ClaimItems::claim) the same number of times.
pub struct ClaimItems<C: Communicator> {
    comm: C,
    tag: Tag,
    count_tag: Tag,
    tolerance: f64,
    // Per-rank inflated boxes; `None` until gathered.
    boxes: Option<Vec<BoundingBox>>,
}

impl<C: Communicator> ClaimItems<C> {
    /// Protocol instance that inflates every rank's bounding box by
    /// `tolerance` when routing.
    pub fn new(comm: C, tolerance: f64) -> Self {
        let tag = comm.unique_tag();
        let count_tag = comm.unique_tag();
        Self {
            comm,
            tag,
            count_tag,
            tolerance,
            boxes: None,
        }
    }

    /// The communicator.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Forget the gathered bounding boxes. The next
    /// [`claim`](ClaimItems::claim) gathers them again.
    pub fn mesh_changed(&mut self) {
        self.boxes = None;
    }

    fn gather_boxes<L: PointLocator>(&self, locator: &L) -> Result<Vec<BoundingBox>, ClaimError> {
        let mut bytes = Vec::with_capacity(48);
        locator.local_bounding_box().pack(&mut bytes);
        self.comm
            .all_gather(&bytes)
            .iter()
            .map(|b| {
                let bbox = BoundingBox::unpack(&mut b.as_slice())?;
                Ok(bbox.inflated(self.tolerance))
            })
            .collect()
    }

    /// Claim `items`, returning the ones this rank now owns with their
    /// starting element set.
    ///
    /// Items are returned in arrival order: locally generated first, then
    /// by source rank in receipt order.
    pub fn claim<L, T>(&mut self, locator: &L, items: Vec<T>) -> Result<Vec<T>, ClaimError>
    where
        L: PointLocator,
        T: Claimable,
    {
        if self.boxes.is_none() {
            self.boxes = Some(self.gather_boxes(locator)?);
        }
        let boxes = self.boxes.as_deref().unwrap_or_default();
        let me = self.comm.rank();
        let submitted = items.len();
        let mut counts = BTreeMap::new();
        for item in &items {
            count_for(&mut counts, item.id()).submitted += 1;
        }

        let mut outgoing: Vec<Vec<&T>> = (0..boxes.len()).map(|_| Vec::new()).collect();
        let mut local_candidates = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let start = item.start_point();
            for (rank, bbox) in boxes.iter().enumerate() {
                if !bbox.contains(&start) {
                    continue;
                }
                if rank == me {
                    local_candidates.push(i);
                } else {
                    outgoing[rank].push(item);
                }
            }
        }

        let sends: Vec<(Rank, Vec<u8>)> = outgoing
            .iter()
            .enumerate()
            .filter(|(_, batch)| !batch.is_empty())
            .map(|(rank, batch)| {
                let size = 4 + batch.iter().map(|t| t.packed_size()).sum::<usize>();
                let mut bytes = Vec::with_capacity(size);
                pack_range(batch, &mut bytes, |t, out| t.pack(out));
                (rank, bytes)
            })
            .collect();

        let mut received: Vec<T> = Vec::new();
        let mut decode_error = None;
        push_parallel_helper(&self.comm, self.tag, sends, |_, bytes| {
            if let Err(e) = unpack_range_into(&bytes, &mut received, T::unpack) {
                decode_error.get_or_insert(e);
            }
        });

        let mut claimed = Vec::new();
        let mut items: Vec<Option<T>> = items.into_iter().map(Some).collect();
        let local = local_candidates
            .into_iter()
            .filter_map(|i| items[i].take());
        for mut item in local.chain(received) {
            let hits = locator.locate(&item.start_point());
            match tie_break(item.id(), &hits) {
                Some(winner) if winner.owner == me => {
                    item.set_starting_elem(winner.elem);
                    claimed.push(item);
                }
                _ => {}
            }
        }

        for item in &claimed {
            count_for(&mut counts, item.id()).claimed += 1;
        }

        // Every rank joins both exchanges even when its own decode failed.
        let unbalanced = self.verify(counts, &mut decode_error);

        if let Some(e) = decode_error {
            return Err(e.into());
        }

        tracing::debug!(
            rank = me,
            submitted,
            claimed = claimed.len(),
            "claim pass complete"
        );

        if let Some(bad) = unbalanced {
            tracing::error!(
                id = bad.id,
                submitted = bad.submitted,
                claimed = bad.claimed,
                "claim verification failed"
            );
            return Err(ClaimError::Verification {
                id: bad.id,
                submitted: bad.submitted,
                claimed: bad.claimed,
            });
        }
        Ok(claimed)
    }

    /// Route this rank's per-id counts to the rank `id % size`, total
    /// them there, and agree on the lowest unbalanced id.
    fn verify(
        &self,
        counts: BTreeMap<u64, IdCount>,
        decode_error: &mut Option<CodecError>,
    ) -> Option<IdCount> {
        let size = self.comm.size();
        let mut outgoing: Vec<Vec<IdCount>> = (0..size).map(|_| Vec::new()).collect();
        for count in counts.into_values() {
            outgoing[(count.id % size as u64) as usize].push(count);
        }
        let sends = outgoing
            .iter()
            .enumerate()
            .filter(|(_, batch)| !batch.is_empty())
            .map(|(rank, batch)| (rank, pack_all(batch)));

        let mut totals = BTreeMap::new();
        push_parallel_helper(&self.comm, self.count_tag, sends, |_, bytes| {
            match unpack_all::<IdCount>(&bytes) {
                Ok(batch) => {
                    for count in &batch {
                        count_for(&mut totals, count.id).add(count);
                    }
                }
                Err(e) => {
                    decode_error.get_or_insert(e);
                }
            }
        });

        let mut first = Vec::new();
        if let Some(bad) = totals.values().find(|c| !c.balanced()) {
            bad.pack(&mut first);
        }
        let mut lowest: Option<IdCount> = None;
        for bytes in self.comm.all_gather(&first) {
            if bytes.is_empty() {
                continue;
            }
            match IdCount::unpack(&mut bytes.as_slice()) {
                Ok(bad) if lowest.is_none_or(|l| bad.id < l.id) => lowest = Some(bad),
                Ok(_) => {}
                Err(e) => {
                    decode_error.get_or_insert(e);
                }
            }
        }
        lowest
    }
}

//! A 1D mesh of unit elements split evenly across ranks.

use parstudy_claim::{BoundingBox, Claimable, ElemHit, ElemId, Hits, Point, PointLocator};
use parstudy_comm::packing::{read_f64_le, read_u64_le, write_f64_le, write_u64_le};
use parstudy_comm::{CodecError, Packing, Rank};
use smallvec::SmallVec;

/// Element `e` spans `[e, e + 1]` on the x axis; rank `r` owns elements
/// `r * per_rank .. (r + 1) * per_rank`. Every rank can locate any
/// point, as if the whole mesh were ghosted.
#[derive(Clone, Copy, Debug)]
pub struct LineLocator {
    pub rank: Rank,
    pub size: usize,
    pub per_rank: u64,
}

impl LineLocator {
    pub fn new(rank: Rank, size: usize, per_rank: u64) -> Self {
        Self {
            rank,
            size,
            per_rank,
        }
    }

    /// Rank owning element `e`.
    pub fn owner(&self, e: u64) -> Rank {
        (e / self.per_rank) as Rank
    }
}

impl PointLocator for LineLocator {
    fn local_bounding_box(&self) -> BoundingBox {
        let lo = (self.rank as u64 * self.per_rank) as f64;
        BoundingBox::new(
            Point::new(lo, 0.0, 0.0),
            Point::new(lo + self.per_rank as f64, 0.0, 0.0),
        )
    }

    fn locate(&self, p: &Point) -> Hits {
        let elems = self.size as u64 * self.per_rank;
        let mut hits = SmallVec::new();
        if p.y != 0.0 || p.z != 0.0 || p.x < 0.0 || p.x > elems as f64 {
            return hits;
        }
        let below = p.x.floor() as u64;
        for e in [below.wrapping_sub(1), below] {
            if e < elems && e as f64 <= p.x && p.x <= e as f64 + 1.0 {
                hits.push(ElemHit {
                    elem: ElemId(e),
                    owner: self.owner(e),
                });
            }
        }
        hits
    }
}

/// A claimable item starting at `x` on the line.
#[derive(Clone, Debug, PartialEq)]
pub struct RayStart {
    pub id: u64,
    pub x: f64,
    pub elem: Option<ElemId>,
}

impl RayStart {
    pub fn new(id: u64, x: f64) -> Self {
        Self { id, x, elem: None }
    }
}

impl Packing for RayStart {
    fn packed_size(&self) -> usize {
        16
    }

    fn pack(&self, out: &mut Vec<u8>) {
        write_u64_le(out, self.id);
        write_f64_le(out, self.x);
    }

    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Self::new(read_u64_le(input)?, read_f64_le(input)?))
    }
}

impl Claimable for RayStart {
    fn id(&self) -> u64 {
        self.id
    }

    fn start_point(&self) -> Point {
        Point::new(self.x, 0.0, 0.0)
    }

    fn set_starting_elem(&mut self, elem: ElemId) {
        self.elem = Some(elem);
    }
}

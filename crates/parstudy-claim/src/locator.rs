//! Seams to the mesh and to the items being claimed.

use std::fmt;

use parstudy_comm::{Packing, Rank};
use smallvec::SmallVec;

use crate::geometry::{BoundingBox, Point};

/// Identifies a mesh element. Unique across all ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElemId(pub u64);

impl fmt::Display for ElemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ElemId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// An element whose closure contains a located point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElemHit {
    /// The element.
    pub elem: ElemId,
    /// Rank that owns the element.
    pub owner: Rank,
}

/// Hits for one point. Points rarely touch more than a handful of
/// elements.
pub type Hits = SmallVec<[ElemHit; 4]>;

/// Point location on the local portion of a distributed mesh.
///
/// Implementations must be consistent across ranks: two ranks that both
/// see a point (as local or ghost elements) must report the same hits.
pub trait PointLocator {
    /// Bounds of the elements this rank owns.
    fn local_bounding_box(&self) -> BoundingBox;

    /// Every local or ghost element whose closure contains `point`.
    fn locate(&self, point: &Point) -> Hits;
}

/// An item that can be claimed by the rank owning its start point.
pub trait Claimable: Packing {
    /// Identifier used for the tie-break and for verification. Must be
    /// the same on every rank. Items sharing an id are verified as a
    /// group, so unique ids give an exact per-item check.
    fn id(&self) -> u64;

    /// Where the item starts.
    fn start_point(&self) -> Point;

    /// Record the element that claimed the item.
    fn set_starting_elem(&mut self, elem: ElemId);
}

/// Pick the winning hit for an item.
///
/// Even ids take the smallest element id, odd ids the largest, so items
/// sitting on a shared face spread over both sides.
pub fn tie_break(id: u64, hits: &[ElemHit]) -> Option<ElemHit> {
    let by_elem = |h: &&ElemHit| h.elem;
    if id % 2 == 0 {
        hits.iter().min_by_key(by_elem).copied()
    } else {
        hits.iter().max_by_key(by_elem).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hit(elem: u64, owner: Rank) -> ElemHit {
        ElemHit {
            elem: ElemId(elem),
            owner,
        }
    }

    #[test]
    fn parity_picks_end() {
        let hits = [hit(7, 1), hit(3, 0), hit(9, 2)];
        assert_eq!(tie_break(4, &hits), Some(hit(3, 0)));
        assert_eq!(tie_break(5, &hits), Some(hit(9, 2)));
    }

    #[test]
    fn no_hits_no_winner() {
        assert_eq!(tie_break(0, &[]), None);
    }

    fn arb_hits() -> impl Strategy<Value = Vec<ElemHit>> {
        // Element ids are global, so an element has one owner.
        proptest::collection::vec(0u64..40, 0..8)
            .prop_map(|elems| elems.into_iter().map(|e| hit(e, (e % 3) as Rank)).collect())
    }

    proptest! {
        #[test]
        fn winner_is_parity_extreme_in_any_order(
            id in any::<u64>(),
            hits in arb_hits(),
            rotate in 0usize..8,
        ) {
            let mut reordered = hits.clone();
            reordered.reverse();
            if !reordered.is_empty() {
                let by = rotate % reordered.len();
                reordered.rotate_left(by);
            }
            let winner = tie_break(id, &hits);
            prop_assert_eq!(winner, tie_break(id, &reordered));

            let elems = hits.iter().map(|h| h.elem);
            let expected = if id % 2 == 0 { elems.min() } else { elems.max() };
            prop_assert_eq!(winner.map(|w| w.elem), expected);
        }
    }

    #[test]
    fn order_of_hits_does_not_matter() {
        let a = [hit(1, 0), hit(2, 1)];
        let b = [hit(2, 1), hit(1, 0)];
        for id in 0..4 {
            assert_eq!(tie_break(id, &a), tie_break(id, &b));
        }
    }
}

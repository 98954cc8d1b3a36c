//! Points and axis-aligned boxes.

use parstudy_comm::packing::{read_f64_le, write_f64_le};
use parstudy_comm::{CodecError, Packing};

/// A point in 3-space. Lower-dimensional meshes leave trailing
/// coordinates at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Point {
    /// Construct from coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Packing for Point {
    fn packed_size(&self) -> usize {
        24
    }

    fn pack(&self, out: &mut Vec<u8>) {
        for c in self.coords() {
            write_f64_le(out, c);
        }
    }

    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            x: read_f64_le(input)?,
            y: read_f64_le(input)?,
            z: read_f64_le(input)?,
        })
    }
}

/// Closed axis-aligned box.
///
/// An empty box (any `min > max`) contains nothing; it is what a rank
/// with no local elements reports.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Lower corner.
    pub min: Point,
    /// Upper corner.
    pub max: Point,
}

impl BoundingBox {
    /// Box spanning `min..=max`.
    pub const fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// A box containing no point.
    pub const fn empty() -> Self {
        Self {
            min: Point::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Whether no point lies inside.
    pub fn is_empty(&self) -> bool {
        self.min
            .coords()
            .iter()
            .zip(self.max.coords())
            .any(|(lo, hi)| *lo > hi)
    }

    /// Whether `p` lies inside or on the boundary.
    pub fn contains(&self, p: &Point) -> bool {
        let (lo, hi, p) = (self.min.coords(), self.max.coords(), p.coords());
        (0..3).all(|i| lo[i] <= p[i] && p[i] <= hi[i])
    }

    /// This box grown by `by` on every side. Empty boxes stay empty.
    pub fn inflated(&self, by: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self {
            min: Point::new(self.min.x - by, self.min.y - by, self.min.z - by),
            max: Point::new(self.max.x + by, self.max.y + by, self.max.z + by),
        }
    }
}

impl Packing for BoundingBox {
    fn packed_size(&self) -> usize {
        48
    }

    fn pack(&self, out: &mut Vec<u8>) {
        self.min.pack(out);
        self.max.pack(out);
    }

    fn unpack(input: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            min: Point::unpack(input)?,
            max: Point::unpack(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> BoundingBox {
        BoundingBox::new(Point::new(0.0, 0.0, 0.0), Point::new(1.0, 1.0, 0.0))
    }

    #[test]
    fn boundary_is_inside() {
        let b = unit();
        assert!(b.contains(&Point::new(1.0, 0.5, 0.0)));
        assert!(b.contains(&Point::new(0.0, 0.0, 0.0)));
        assert!(!b.contains(&Point::new(1.0001, 0.5, 0.0)));
    }

    #[test]
    fn inflation_grows_every_side() {
        let b = unit().inflated(0.25);
        assert!(b.contains(&Point::new(-0.2, 1.2, 0.1)));
        assert!(!b.contains(&Point::new(-0.3, 0.5, 0.0)));
    }

    #[test]
    fn empty_box_contains_nothing() {
        let b = BoundingBox::empty().inflated(10.0);
        assert!(b.is_empty());
        assert!(!b.contains(&Point::default()));
    }

    #[test]
    fn box_wire_size() {
        let mut out = Vec::new();
        unit().pack(&mut out);
        assert_eq!(out.len(), unit().packed_size());
        let decoded = BoundingBox::unpack(&mut out.as_slice()).unwrap();
        assert_eq!(decoded, unit());
    }
}

//! Spatial regions of a tensor that changed since the previous round.
use crate::TVec;
use itertools::Itertools;
use std::fmt;

/// A half-open rectangle `[y0, y1) x [x0, x1)` on the spatial plane.
///
/// Coordinates are signed: mapping a rectangle through a padded window may
/// push it out of the plane, `clamp` brings it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, new)]
pub struct Rect {
    pub y0: isize,
    pub x0: isize,
    pub y1: isize,
    pub x1: isize,
}

impl Rect {
    pub fn from_origin_size(y: isize, x: isize, h: usize, w: usize) -> Rect {
        Rect::new(y, x, y + h as isize, x + w as isize)
    }

    /// The whole `h x w` plane.
    pub fn plane(h: usize, w: usize) -> Rect {
        Rect::from_origin_size(0, 0, h, w)
    }

    pub fn height(&self) -> usize {
        (self.y1 - self.y0).max(0) as usize
    }

    pub fn width(&self) -> usize {
        (self.x1 - self.x0).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.y1 <= self.y0 || self.x1 <= self.x0
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect::new(
            self.y0.max(other.y0),
            self.x0.max(other.x0),
            self.y1.min(other.y1),
            self.x1.min(other.x1),
        )
    }

    pub fn clamp(&self, h: usize, w: usize) -> Rect {
        self.intersect(&Rect::plane(h, w))
    }

    pub fn contains(&self, y: isize, x: isize) -> bool {
        self.y0 <= y && y < self.y1 && self.x0 <= x && x < self.x1
    }

    /// Output positions a sliding window may have changed given this input
    /// rectangle changed.
    pub fn map_window(&self, y: &WindowAxis, x: &WindowAxis) -> Rect {
        if self.is_empty() {
            return Rect::new(0, 0, 0, 0);
        }
        let (y0, y1) = y.affected(self.y0, self.y1);
        let (x0, x1) = x.affected(self.x0, self.x1);
        Rect::new(y0, x0, y1, x1)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}..{})x[{}..{})", self.y0, self.y1, self.x0, self.x1)
    }
}

/// Geometry of a sliding window along one axis.
///
/// Output `o` reads the (zero padded) inputs
/// `o * stride - pad + k * dilation` for `k` in `0..kernel`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, new)]
pub struct WindowAxis {
    pub kernel: usize,
    pub stride: usize,
    pub dilation: usize,
    pub pad: usize,
}

impl WindowAxis {
    /// Half-open range of outputs whose receptive field meets `[a, b)`.
    pub fn affected(&self, a: isize, b: isize) -> (isize, isize) {
        if b <= a {
            return (0, 0);
        }
        let span = (self.kernel.saturating_sub(1) * self.dilation.max(1)) as isize;
        let stride = self.stride.max(1) as isize;
        let pad = self.pad as isize;
        // o * stride - pad + span >= a
        let lo = -(-(a + pad - span)).div_euclid(stride);
        // o * stride - pad <= b - 1
        let hi = (b - 1 + pad).div_euclid(stride) + 1;
        (lo, hi)
    }
}

/// The part of a tensor that changed since the previous round.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Region {
    /// No previous round to compare with, or unknown: everything is dirty.
    #[default]
    Full,
    /// Union of changed rectangles. An empty list means nothing changed.
    Rects(TVec<Rect>),
}

impl Region {
    pub fn unchanged() -> Region {
        Region::Rects(TVec::new())
    }

    pub fn rect(rect: Rect) -> Region {
        Region::unchanged().with_rect(rect)
    }

    pub fn with_rect(self, rect: Rect) -> Region {
        match self {
            Region::Full => Region::Full,
            Region::Rects(mut rects) => {
                if !rect.is_empty() && !rects.contains(&rect) {
                    rects.push(rect);
                }
                Region::Rects(rects)
            }
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Region::Full)
    }

    pub fn is_unchanged(&self) -> bool {
        match self {
            Region::Full => false,
            Region::Rects(rects) => rects.iter().all(|r| r.is_empty()),
        }
    }

    pub fn rects(&self) -> Option<&[Rect]> {
        match self {
            Region::Full => None,
            Region::Rects(rects) => Some(rects),
        }
    }

    pub fn union(&self, other: &Region) -> Region {
        match (self, other) {
            (Region::Rects(a), Region::Rects(b)) => {
                b.iter().fold(Region::Rects(a.clone()), |acc, r| acc.with_rect(*r))
            }
            _ => Region::Full,
        }
    }

    /// Union of many regions. Nothing to merge means nothing is known, so
    /// the result is `Full`.
    pub fn union_all<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Region {
        let mut regions = regions.into_iter();
        match regions.next() {
            None => Region::Full,
            Some(first) => regions.fold(first.clone(), |acc, r| acc.union(r)),
        }
    }

    pub fn clamp(&self, h: usize, w: usize) -> Region {
        match self {
            Region::Full => Region::Full,
            Region::Rects(rects) => rects
                .iter()
                .fold(Region::unchanged(), |acc, r| acc.with_rect(r.clamp(h, w))),
        }
    }

    pub fn map_window(&self, y: &WindowAxis, x: &WindowAxis) -> Region {
        match self {
            Region::Full => Region::Full,
            Region::Rects(rects) => rects
                .iter()
                .fold(Region::unchanged(), |acc, r| acc.with_rect(r.map_window(y, x))),
        }
    }

    /// Rectangles to recompute on a `h x w` plane: the whole plane for
    /// `Full`, the clamped non empty rectangles otherwise.
    pub fn dirty_rects(&self, h: usize, w: usize) -> TVec<Rect> {
        match self.clamp(h, w) {
            Region::Full => {
                let mut rects = TVec::new();
                rects.push(Rect::plane(h, w));
                rects
            }
            Region::Rects(rects) => rects,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Region::Full => write!(f, "full"),
            Region::Rects(rects) if rects.is_empty() => write!(f, "unchanged"),
            Region::Rects(rects) => write!(f, "{}", rects.iter().join(" + ")),
        }
    }
}

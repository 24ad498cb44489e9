//! Binary search helpers shared by [`Path`](crate::path::Path) and
//! history views.
//!
//! All searches assume the searched function is non-decreasing along the
//! sequence. Violating that is a caller error that is not detected.

/// How to round when the searched value falls between two samples or off
/// either end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rounding {
    /// Only an item whose value equals the target.
    Exact,
    /// The last item whose value is `<=` the target.
    Low,
    /// The first item whose value is `>=` the target.
    High,
    /// Both the `Low` and the `High` answers.
    Both,
    /// Whichever of `Low`/`High` is nearer; ties go to `Low`.
    Closest,
}

/// Result of a rounded lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Rounded<T> {
    /// Answer for [`Rounding::Exact`], [`Rounding::Low`],
    /// [`Rounding::High`] and [`Rounding::Closest`].
    One(Option<T>),
    /// Answer for [`Rounding::Both`].
    Both {
        /// Greatest item at or below the target.
        low: Option<T>,
        /// Least item at or above the target.
        high: Option<T>,
    },
}

impl<T> Rounded<T> {
    /// Collapse to a single item. For [`Rounded::Both`] this prefers
    /// `low`.
    pub fn single(self) -> Option<T> {
        match self {
            Self::One(item) => item,
            Self::Both { low, high } => low.or(high),
        }
    }

    /// Transform the contained items.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Rounded<U> {
        match self {
            Self::One(item) => Rounded::One(item.map(f)),
            Self::Both { low, high } => Rounded::Both {
                low: low.map(&mut f),
                high: high.map(f),
            },
        }
    }
}

/// The raw low/high bracket around a target value, with the function
/// value of each side.
#[derive(Clone, Debug, PartialEq)]
pub struct Bracket<T> {
    /// Last item with `f <= value`, and its `f`.
    pub low: Option<(T, f64)>,
    /// First item with `f >= value`, and its `f`.
    pub high: Option<(T, f64)>,
}

impl<T> Bracket<T> {
    /// A bracket with neither side found.
    pub fn empty() -> Self {
        Self {
            low: None,
            high: None,
        }
    }

    /// Merge the bracket of an earlier run with that of the run directly
    /// following it.
    pub fn then(self, later: Bracket<T>) -> Bracket<T> {
        Bracket {
            low: later.low.or(self.low),
            high: self.high.or(later.high),
        }
    }

    /// Transform the bracketed items.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Bracket<U> {
        Bracket {
            low: self.low.map(|(item, v)| (f(item), v)),
            high: self.high.map(|(item, v)| (f(item), v)),
        }
    }

    /// Apply `rounding` against the original target `value`.
    pub fn round(self, value: f64, rounding: Rounding) -> Rounded<T> {
        match rounding {
            Rounding::Exact => {
                let hit = match (self.low, self.high) {
                    (Some((item, v)), _) if v == value => Some(item),
                    (_, Some((item, v))) if v == value => Some(item),
                    _ => None,
                };
                Rounded::One(hit)
            }
            Rounding::Low => Rounded::One(self.low.map(|(item, _)| item)),
            Rounding::High => Rounded::One(self.high.map(|(item, _)| item)),
            Rounding::Both => Rounded::Both {
                low: self.low.map(|(item, _)| item),
                high: self.high.map(|(item, _)| item),
            },
            Rounding::Closest => {
                let pick = match (self.low, self.high) {
                    (Some((low, lv)), Some((high, hv))) => {
                        if value - lv <= hv - value {
                            Some(low)
                        } else {
                            Some(high)
                        }
                    }
                    (Some((low, _)), None) => Some(low),
                    (None, Some((high, _))) => Some(high),
                    (None, None) => None,
                };
                Rounded::One(pick)
            }
        }
    }
}

/// Bracket `value` within `0..len` where `f(i)` is non-decreasing in `i`.
///
/// Evaluates `f` O(log len) times.
pub fn bracket_indices(len: usize, f: impl Fn(usize) -> f64, value: f64) -> Bracket<usize> {
    let at_or_below = partition_point(len, |i| f(i) <= value);
    let below = partition_point(len, |i| f(i) < value);
    Bracket {
        low: at_or_below.checked_sub(1).map(|i| (i, f(i))),
        high: (below < len).then(|| (below, f(below))),
    }
}

/// First index in `0..len` for which `pred` is false, assuming `pred` is
/// true for a prefix and false afterwards.
fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0usize, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

//! Normalization applied to every accepted or trial parameter vector.

use ndarray::{s, Array1};

/// Projects a parameter vector back onto its valid set, e.g. renormalizing a
/// quaternion sub-block to unit length.
///
/// Any `Fn(&mut Array1<f64>)` closure is a normalization policy.
pub trait Normalize {
    /// Normalize `params` in place.
    fn normalize(&self, params: &mut Array1<f64>);
}

impl<F> Normalize for F
where
    F: Fn(&mut Array1<f64>),
{
    fn normalize(&self, params: &mut Array1<f64>) {
        self(params)
    }
}

/// Leaves parameters untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoNormalize;

impl Normalize for NoNormalize {
    fn normalize(&self, _params: &mut Array1<f64>) {}
}

/// Rescales the block `params[start..start + len]` to unit Euclidean length.
///
/// A block of zero length is left as is. Entries past the end of the vector are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitNormalize {
    start: usize,
    len: usize,
}

impl UnitNormalize {
    /// Normalize the `len` entries starting at `start`.
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Normalize a quaternion stored at `params[start..start + 4]`.
    pub fn quaternion(start: usize) -> Self {
        Self::new(start, 4)
    }
}

impl Normalize for UnitNormalize {
    fn normalize(&self, params: &mut Array1<f64>) {
        let start = self.start.min(params.len());
        let end = (self.start + self.len).min(params.len());
        let mut block = params.slice_mut(s![start..end]);
        let norm = block.dot(&block).sqrt();
        if norm > 0.0 {
            block /= norm;
        }
    }
}

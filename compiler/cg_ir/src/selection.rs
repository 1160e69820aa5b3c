//! Field selection paths.

use smallvec::SmallVec;

/// Ordered field indices leading from an aggregate to a nested field.
///
/// `a.b.c` on `struct { x, b: struct { c, .. } }` is `[1, 0]`. The checker
/// resolves `using` promotions into explicit steps, so every index is a
/// direct field of the type reached by the previous step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Selection {
    indices: SmallVec<[u32; 4]>,
}

impl Selection {
    pub fn new(indices: &[u32]) -> Self {
        Selection {
            indices: SmallVec::from_slice(indices),
        }
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Extend the path by one more step.
    pub fn push(&mut self, index: u32) {
        self.indices.push(index);
    }
}

impl From<&[u32]> for Selection {
    fn from(indices: &[u32]) -> Self {
        Selection::new(indices)
    }
}

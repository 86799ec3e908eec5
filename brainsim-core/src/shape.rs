use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::bail;
use crate::{Error, Result};

/// Maximum number of dimensions a shape may carry.
pub const MAX_RANK: usize = 100;

/// Immutable dimensions of a memory block.
///
/// A shape is either a sequence of dimension sizes or *empty*, the
/// distinguished default state of a block whose dimensions have not been set.
/// An empty shape reports rank 1 and pretends to have a single dimension of
/// size 0 so that size computations can proceed without branching on
/// emptiness.
///
/// Shapes never change after construction; "modifying" one (see
/// [`TensorShape::append`]) produces a new value, which keeps them safe to
/// share across worker threads without locks.
#[derive(Clone)]
pub struct TensorShape {
    dims: Arc<[usize]>,
    elem_count: OnceLock<usize>,
}

impl TensorShape {
    /// Build a shape from an ordered sequence of dimension sizes.
    pub fn new(dims: impl Into<Vec<usize>>) -> Result<Self> {
        let dims = dims.into();
        if dims.len() > MAX_RANK {
            bail!(
                "shape has {} dimensions, more than the maximum of {MAX_RANK}",
                dims.len()
            );
        }
        Ok(Self {
            dims: dims.into(),
            elem_count: OnceLock::new(),
        })
    }

    /// The default/unset shape.
    pub fn empty() -> Self {
        Self {
            dims: Vec::new().into(),
            elem_count: OnceLock::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of dimensions. An empty shape reports rank 1.
    pub fn rank(&self) -> usize {
        if self.is_empty() {
            1
        } else {
            self.dims.len()
        }
    }

    /// Size of the dimension at `index`.
    ///
    /// Index 0 of an empty shape reads as 0 rather than erroring, everything
    /// beyond the last dimension is [`Error::OutOfRange`].
    pub fn dim(&self, index: usize) -> Result<usize> {
        if self.is_empty() {
            if index == 0 {
                return Ok(0);
            }
            return Err(Error::OutOfRange {
                index,
                max_index: 0,
            });
        }
        self.dims.get(index).copied().ok_or(Error::OutOfRange {
            index,
            max_index: self.dims.len() - 1,
        })
    }

    /// Total number of elements, 0 for an empty shape.
    ///
    /// Computed on first use and memoized; the dimensions are immutable so the
    /// cached value can never go stale.
    pub fn element_count(&self) -> usize {
        *self.elem_count.get_or_init(|| {
            if self.is_empty() {
                0
            } else {
                self.dims.iter().product()
            }
        })
    }

    /// The raw dimension sizes; empty slice for the default shape.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// A new shape with `size` appended as the innermost dimension.
    pub fn append(&self, size: usize) -> Result<Self> {
        let mut dims = self.dims.to_vec();
        dims.push(size);
        Self::new(dims)
    }

    /// Byte size of a block holding this shape's elements.
    pub fn size_in_bytes(&self, elem_size: usize) -> usize {
        self.element_count() * elem_size
    }
}

impl Default for TensorShape {
    fn default() -> Self {
        Self::empty()
    }
}

// Equality and hashing are structural over the dimension sequence; the
// memoized element count is ignored. Two independently constructed shapes
// with the same dimensions compare equal.
impl PartialEq for TensorShape {
    fn eq(&self, other: &Self) -> bool {
        self.dims == other.dims
    }
}

impl Eq for TensorShape {}

impl Hash for TensorShape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dims.hash(state);
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "()");
        }
        let mut first = true;
        for dim in self.dims.iter() {
            if !first {
                write!(f, "x")?;
            }
            write!(f, "{dim}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorShape({self})")
    }
}

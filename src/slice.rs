//! Selections of a variable and their translation to the file layout.
//!
//! A [`Selection`] is what callers write: any of `start`, `count`, `stride`
//! and `imap` (each optional), or an `ndarray` slice expression built with
//! [`s!`](ndarray::s). Resolving it against a variable's shape produces a
//! [`SliceDescriptor`], which is fully populated and bounds-checked.
//!
//! Element `k` of a selection (a multi-index with `k[i] < count[i]`) lives at
//! file index `start[i] + k[i] * stride[i]` on each axis. Its position in the
//! caller's buffer is `k` in row-major order, or `sum(k[i] * imap[i])` when
//! an index map is given.

use crate::element::NcType;
use crate::error::{Error, ErrorCode, Result};
use ndarray::{Dimension, SliceInfo, SliceInfoElem};
use std::fmt;
use std::ops::Range;

/// Why an axis of a selection is out of bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionFault {
    /// `start` lies past the end of the axis.
    StartOutOfBounds { start: usize, len: usize },
    /// The last selected index lies past the end of the axis.
    EdgeOutOfBounds { last: usize, len: usize },
    /// The stride is zero or negative.
    BadStride,
}

impl RegionFault {
    pub fn code(self) -> ErrorCode {
        match self {
            RegionFault::StartOutOfBounds { .. } => ErrorCode::EINVALCOORDS,
            RegionFault::EdgeOutOfBounds { .. } => ErrorCode::EEDGE,
            RegionFault::BadStride => ErrorCode::ESTRIDE,
        }
    }
}

impl fmt::Display for RegionFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegionFault::StartOutOfBounds { start, len } => {
                write!(f, "start {} exceeds dimension length {}", start, len)
            }
            RegionFault::EdgeOutOfBounds { last, len } => {
                write!(f, "last index {} exceeds dimension length {}", last, len)
            }
            RegionFault::BadStride => write!(f, "stride must be at least 1"),
        }
    }
}

/// Why an index map was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImapFault {
    /// An index map needs an explicit `start` and `count`.
    WholeVariable,
    /// The mapped positions overflow `usize`.
    Overflow,
    /// The map does not describe a dense, permuted layout, so the result
    /// cannot be returned as an array. Use `get_into` instead.
    NotDense,
}

impl fmt::Display for ImapFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImapFault::WholeVariable => {
                write!(f, "an index map requires an explicit start and count")
            }
            ImapFault::Overflow => write!(f, "mapped buffer positions overflow"),
            ImapFault::NotDense => write!(f, "index map does not describe a dense layout"),
        }
    }
}

/// A requested region of a variable, before it is checked against the
/// variable's shape.
///
/// # Example
///
/// ```
/// use ndarray::s;
/// use ndarray_pnetcdf::Selection;
///
/// // Explicit start/count/stride.
/// let a = Selection::new().start([3, 0, 10]).count([1, 3, 5]).stride([1, 2, 2]);
/// // The same region with slice syntax.
/// let b = Selection::from(s![3..4, 0..6;2, 10..20;2]);
/// # let _ = (a, b);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    start: Option<Vec<usize>>,
    count: Option<Vec<usize>>,
    stride: Option<Vec<usize>>,
    imap: Option<Vec<usize>>,
    slices: Option<Vec<SliceInfoElem>>,
}

impl Selection {
    /// Selects the whole variable.
    pub fn new() -> Selection {
        Selection::default()
    }

    /// Alias for [`Selection::new`].
    pub fn all() -> Selection {
        Selection::default()
    }

    /// Selects the region described by an `ndarray` slice expression.
    ///
    /// Negative indices count from the end of the axis. An integer index
    /// selects a single element but keeps the axis (with count 1). Negative
    /// steps and new axes are not supported.
    pub fn slice<I: AsRef<[SliceInfoElem]>>(info: I) -> Selection {
        Selection {
            slices: Some(info.as_ref().to_vec()),
            ..Selection::default()
        }
    }

    /// Sets the first index selected on each axis. Defaults to zeros.
    pub fn start<V: Into<Vec<usize>>>(mut self, start: V) -> Selection {
        self.start = Some(start.into());
        self
    }

    /// Sets the number of elements selected on each axis. Defaults to the
    /// shape of the data being written, or to as many as fit.
    pub fn count<V: Into<Vec<usize>>>(mut self, count: V) -> Selection {
        self.count = Some(count.into());
        self
    }

    /// Sets the distance between selected indices on each axis. Defaults to
    /// ones.
    pub fn stride<V: Into<Vec<usize>>>(mut self, stride: V) -> Selection {
        self.stride = Some(stride.into());
        self
    }

    /// Sets the index map: the distance, in elements of the caller's buffer,
    /// between consecutive elements along each axis of the variable.
    pub fn imap<V: Into<Vec<usize>>>(mut self, imap: V) -> Selection {
        self.imap = Some(imap.into());
        self
    }

    /// Resolves the selection for reading from a variable of the given shape.
    pub fn resolve(&self, shape: &[usize]) -> Result<SliceDescriptor> {
        Resolver {
            shape,
            growable: false,
            data_shape: None,
        }
        .resolve(self)
    }

    /// Resolves the selection for writing `data_shape`-shaped data. When
    /// `growable` is set, axis 0 is the unlimited dimension and may be
    /// written past its current length.
    pub(crate) fn resolve_for_write(
        &self,
        shape: &[usize],
        growable: bool,
        data_shape: &[usize],
    ) -> Result<SliceDescriptor> {
        Resolver {
            shape,
            growable,
            data_shape: Some(data_shape),
        }
        .resolve(self)
    }
}

impl<T, Din, Dout> From<SliceInfo<T, Din, Dout>> for Selection
where
    T: AsRef<[SliceInfoElem]>,
    Din: Dimension,
    Dout: Dimension,
{
    fn from(info: SliceInfo<T, Din, Dout>) -> Selection {
        Selection::slice(info)
    }
}

impl<'a> From<&'a Selection> for Selection {
    fn from(sel: &'a Selection) -> Selection {
        sel.clone()
    }
}

struct Resolver<'a> {
    shape: &'a [usize],
    growable: bool,
    data_shape: Option<&'a [usize]>,
}

impl<'a> Resolver<'a> {
    fn ndim(&self) -> usize {
        self.shape.len()
    }

    fn is_growable(&self, axis: usize) -> bool {
        self.growable && axis == 0
    }

    /// Count implied by the caller's data on `axis`, if its rank matches.
    fn data_count(&self, axis: usize) -> Option<usize> {
        self.data_shape
            .filter(|shape| shape.len() == self.ndim())
            .map(|shape| shape[axis])
    }

    fn check_len(&self, v: &Option<Vec<usize>>) -> Result<()> {
        match v {
            Some(v) if v.len() != self.ndim() => Err(Error::RankMismatch {
                expected: self.ndim(),
                found: v.len(),
            }),
            _ => Ok(()),
        }
    }

    fn resolve(&self, sel: &Selection) -> Result<SliceDescriptor> {
        let (region, empty_extent) = match sel.slices {
            Some(ref slices) => self.from_slices(slices)?,
            None => self.from_explicit(sel)?,
        };
        self.check_bounds(&region)?;

        let imap = match sel.imap {
            Some(ref imap) => {
                if sel.slices.is_none() && (sel.start.is_none() || sel.count.is_none()) {
                    return Err(Error::UnsupportedImap(ImapFault::WholeVariable));
                }
                self.check_len(&sel.imap)?;
                Some(imap.clone())
            }
            None => None,
        };

        let whole = imap.is_none()
            && region
                .start
                .iter()
                .zip(&region.count)
                .zip(&region.stride)
                .zip(self.shape)
                .all(|(((&start, &count), &stride), &len)| {
                    start == 0 && count == len && (stride == 1 || count <= 1)
                });

        let desc = SliceDescriptor {
            region,
            imap,
            whole,
            empty_extent,
        };
        desc.buffer_len()?;
        Ok(desc)
    }

    /// Also returns whether a count filled in from the current extent of
    /// an axis came out zero.
    fn from_explicit(&self, sel: &Selection) -> Result<(Region, bool)> {
        self.check_len(&sel.start)?;
        self.check_len(&sel.count)?;
        self.check_len(&sel.stride)?;

        let start = sel.start.clone().unwrap_or_else(|| vec![0; self.ndim()]);
        let stride = sel.stride.clone().unwrap_or_else(|| vec![1; self.ndim()]);
        if let Some(axis) = stride.iter().position(|&s| s == 0) {
            return Err(Error::InvalidRegion {
                axis,
                fault: RegionFault::BadStride,
            });
        }
        let mut empty_extent = false;
        let count = match sel.count {
            Some(ref count) => count.clone(),
            None => {
                let mut count = Vec::with_capacity(self.ndim());
                for axis in 0..self.ndim() {
                    let n = match self.data_count(axis) {
                        Some(n) => n,
                        None => {
                            let n = self.max_count(axis, start[axis], stride[axis])?;
                            empty_extent |= n == 0;
                            n
                        }
                    };
                    count.push(n);
                }
                count
            }
        };
        let region = Region {
            start,
            count,
            stride,
        };
        Ok((region, empty_extent))
    }

    /// The largest count that fits on `axis` from `start` with `stride`.
    fn max_count(&self, axis: usize, start: usize, stride: usize) -> Result<usize> {
        let len = self.shape[axis];
        if start > len {
            return Err(Error::InvalidRegion {
                axis,
                fault: RegionFault::StartOutOfBounds { start, len },
            });
        }
        Ok(match len - start {
            0 => 0,
            n => (n - 1) / stride + 1,
        })
    }

    fn from_slices(&self, slices: &[SliceInfoElem]) -> Result<(Region, bool)> {
        if slices.len() != self.ndim() {
            return Err(Error::RankMismatch {
                expected: self.ndim(),
                found: slices.len(),
            });
        }
        let mut region = Region {
            start: Vec::with_capacity(self.ndim()),
            count: Vec::with_capacity(self.ndim()),
            stride: Vec::with_capacity(self.ndim()),
        };
        let mut empty_extent = false;
        for (axis, elem) in slices.iter().enumerate() {
            let len = self.shape[axis];
            let (start, count, stride) = match *elem {
                SliceInfoElem::Slice { start, end, step } => {
                    if step <= 0 {
                        return Err(Error::InvalidRegion {
                            axis,
                            fault: RegionFault::BadStride,
                        });
                    }
                    let stride = step as usize;
                    let start = self.absolute(axis, start)?;
                    let (end, from_extent) = match end {
                        Some(end) => (self.absolute(axis, end)?, false),
                        None => match self.data_count(axis) {
                            Some(n) if self.is_growable(axis) => {
                                let end = n
                                    .checked_mul(stride)
                                    .and_then(|n| n.checked_add(start))
                                    .ok_or(Error::InvalidRegion {
                                        axis,
                                        fault: RegionFault::EdgeOutOfBounds {
                                            last: usize::MAX,
                                            len,
                                        },
                                    })?;
                                (end, false)
                            }
                            _ => (len.max(start), true),
                        },
                    };
                    let count = if end > start {
                        (end - start - 1) / stride + 1
                    } else {
                        0
                    };
                    empty_extent |= from_extent && count == 0;
                    (start, count, stride)
                }
                SliceInfoElem::Index(index) => (self.absolute(axis, index)?, 1, 1),
                SliceInfoElem::NewAxis => {
                    return Err(Error::RankMismatch {
                        expected: self.ndim(),
                        found: slices.len() + 1,
                    })
                }
            };
            region.start.push(start);
            region.count.push(count);
            region.stride.push(stride);
        }
        Ok((region, empty_extent))
    }

    /// Converts a possibly negative index on `axis` to an absolute one.
    fn absolute(&self, axis: usize, index: isize) -> Result<usize> {
        let len = self.shape[axis];
        if index >= 0 {
            return Ok(index as usize);
        }
        let back = index.unsigned_abs();
        if back > len {
            return Err(Error::InvalidRegion {
                axis,
                fault: RegionFault::StartOutOfBounds { start: 0, len },
            });
        }
        Ok(len - back)
    }

    fn check_bounds(&self, region: &Region) -> Result<()> {
        let record_len = row_major_strides(self.shape).first().copied().unwrap_or(1);
        for axis in 0..self.ndim() {
            let (start, count, stride) =
                (region.start[axis], region.count[axis], region.stride[axis]);
            if stride == 0 {
                return Err(Error::InvalidRegion {
                    axis,
                    fault: RegionFault::BadStride,
                });
            }
            let len = self.shape[axis];
            if self.is_growable(axis) {
                // The axis may grow to `end` as long as the element count of
                // the grown variable fits.
                let end = count
                    .saturating_sub(1)
                    .checked_mul(stride)
                    .and_then(|n| n.checked_add(start))
                    .and_then(|n| n.checked_add(1))
                    .filter(|&end| end.checked_mul(record_len).is_some());
                if count > 0 && end.is_none() {
                    return Err(Error::InvalidRegion {
                        axis,
                        fault: RegionFault::EdgeOutOfBounds {
                            last: usize::MAX,
                            len,
                        },
                    });
                }
                continue;
            }
            if count == 0 {
                if start > len {
                    return Err(Error::InvalidRegion {
                        axis,
                        fault: RegionFault::StartOutOfBounds { start, len },
                    });
                }
                continue;
            }
            if start >= len {
                return Err(Error::InvalidRegion {
                    axis,
                    fault: RegionFault::StartOutOfBounds { start, len },
                });
            }
            let last = (count - 1)
                .checked_mul(stride)
                .and_then(|n| n.checked_add(start));
            match last {
                Some(last) if last < len => {}
                Some(last) => {
                    return Err(Error::InvalidRegion {
                        axis,
                        fault: RegionFault::EdgeOutOfBounds { last, len },
                    })
                }
                None => {
                    return Err(Error::InvalidRegion {
                        axis,
                        fault: RegionFault::EdgeOutOfBounds {
                            last: usize::MAX,
                            len,
                        },
                    })
                }
            }
        }
        Ok(())
    }
}

/// A strided, bounds-checked region of a variable in file index space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub start: Vec<usize>,
    pub count: Vec<usize>,
    pub stride: Vec<usize>,
}

impl Region {
    /// The region covering all of `shape`.
    pub fn whole(shape: &[usize]) -> Region {
        Region {
            start: vec![0; shape.len()],
            count: shape.to_vec(),
            stride: vec![1; shape.len()],
        }
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.count.len()
    }

    /// Number of selected elements.
    pub fn len(&self) -> usize {
        self.count.iter().product()
    }

    /// Returns `true` iff some axis has a count of zero.
    pub fn is_empty(&self) -> bool {
        self.count.iter().any(|&c| c == 0)
    }

    /// One past the last index selected on `axis`, or `start` if nothing is
    /// selected there. Saturates at `usize::MAX`.
    pub fn end(&self, axis: usize) -> usize {
        match self.count[axis] {
            0 => self.start[axis],
            n => (n - 1)
                .saturating_mul(self.stride[axis])
                .saturating_add(self.start[axis])
                .saturating_add(1),
        }
    }

    /// Linear offsets, in elements, of the selected elements within a
    /// row-major array of `shape`, in selection order.
    ///
    /// The length of axis 0 does not affect the offsets, so `shape[0]` may be
    /// the current length of an unlimited dimension.
    pub fn offsets(&self, shape: &[usize]) -> Positions {
        debug_assert_eq!(shape.len(), self.ndim());
        let strides = row_major_strides(shape);
        let base = self
            .start
            .iter()
            .zip(&strides)
            .map(|(&start, &s)| start * s)
            .sum();
        let weights = self
            .stride
            .iter()
            .zip(&strides)
            .map(|(&stride, &s)| stride * s)
            .collect();
        Positions::new(base, weights, self.count.clone())
    }

    /// The selected elements as a single run of linear offsets, if they are
    /// contiguous within a row-major array of `shape`.
    pub fn contiguous(&self, shape: &[usize]) -> Option<Range<usize>> {
        if self.is_empty() {
            return Some(0..0);
        }
        let first = match self.count.iter().position(|&c| c != 1) {
            Some(axis) => axis,
            None => {
                let offset = self.offsets(shape).next().unwrap_or(0);
                return Some(offset..offset + 1);
            }
        };
        if self.stride[first] != 1 {
            return None;
        }
        for axis in first + 1..self.ndim() {
            if self.start[axis] != 0 || self.count[axis] != shape[axis] {
                return None;
            }
            if self.stride[axis] != 1 && self.count[axis] > 1 {
                return None;
            }
        }
        let offset = self.offsets(shape).next().unwrap_or(0);
        Some(offset..offset + self.len())
    }
}

/// Row-major element strides of `shape`.
pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// A canonical, bounds-checked access request over a variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliceDescriptor {
    region: Region,
    imap: Option<Vec<usize>>,
    whole: bool,
    /// A count left to default came out zero because the axis is empty.
    empty_extent: bool,
}

impl SliceDescriptor {
    /// The selected region in file index space.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// First selected index on each axis.
    pub fn start(&self) -> &[usize] {
        &self.region.start
    }

    /// Number of selected elements on each axis.
    pub fn count(&self) -> &[usize] {
        &self.region.count
    }

    /// Distance between selected indices on each axis.
    pub fn stride(&self) -> &[usize] {
        &self.region.stride
    }

    /// The index map into the caller's buffer, if one was given.
    pub fn imap(&self) -> Option<&[usize]> {
        self.imap.as_deref()
    }

    /// Returns `true` iff the selection is empty only because a count that
    /// was not given defaulted to the length of an empty axis.
    pub(crate) fn has_empty_extent(&self) -> bool {
        self.empty_extent
    }

    /// Returns `true` iff the descriptor covers the entire variable in its
    /// natural order.
    pub fn is_whole(&self) -> bool {
        self.whole
    }

    /// Number of selected elements.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Returns `true` iff some axis has a count of zero.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Size in bytes of the selected elements in external representation.
    pub fn byte_size(&self, nc_type: NcType) -> usize {
        self.len() * nc_type.size()
    }

    /// Number of elements the caller's buffer must hold.
    pub fn buffer_len(&self) -> Result<usize> {
        let imap = match self.imap {
            Some(ref imap) => imap,
            None => return Ok(self.len()),
        };
        if self.is_empty() {
            return Ok(0);
        }
        imap.iter()
            .zip(&self.region.count)
            .try_fold(1usize, |acc, (&m, &c)| {
                m.checked_mul(c - 1).and_then(|n| acc.checked_add(n))
            })
            .ok_or(Error::UnsupportedImap(ImapFault::Overflow))
    }

    /// Shape of the caller's buffer when it can be expressed as an array.
    ///
    /// Without an index map this is `count`. With one, the axes are ordered
    /// by decreasing `imap`, which must then equal the row-major strides of
    /// the permuted shape.
    pub fn buffer_shape(&self) -> Result<Vec<usize>> {
        let imap = match self.imap {
            Some(ref imap) => imap,
            None => return Ok(self.region.count.clone()),
        };
        let count = &self.region.count;
        let mut axes: Vec<usize> = (0..count.len()).collect();
        axes.sort_by(|&a, &b| imap[b].cmp(&imap[a]));
        let shape: Vec<usize> = axes.iter().map(|&axis| count[axis]).collect();
        let strides = row_major_strides(&shape);
        let dense = axes
            .iter()
            .zip(&strides)
            .all(|(&axis, &stride)| count[axis] <= 1 || imap[axis] == stride);
        if dense || self.is_empty() {
            Ok(shape)
        } else {
            Err(Error::UnsupportedImap(ImapFault::NotDense))
        }
    }

    /// Positions in the caller's buffer of the selected elements, in
    /// selection order.
    pub fn buffer_positions(&self) -> Positions {
        match self.imap {
            Some(ref imap) => Positions::new(0, imap.clone(), self.region.count.clone()),
            None => Positions::new(0, row_major_strides(&self.region.count), self.region.count.clone()),
        }
    }

    /// Collects the selected elements from the caller's buffer in selection
    /// order. `buffer` must hold at least [`buffer_len`](Self::buffer_len)
    /// elements.
    pub(crate) fn gather<T: Copy>(&self, buffer: &[T]) -> Vec<T> {
        if self.imap.is_none() {
            return buffer[..self.len()].to_vec();
        }
        self.buffer_positions().map(|pos| buffer[pos]).collect()
    }

    /// Places `values`, given in selection order, into the caller's buffer.
    pub(crate) fn scatter<T: Copy>(&self, values: &[T], buffer: &mut [T]) {
        if self.imap.is_none() {
            buffer[..values.len()].copy_from_slice(values);
            return;
        }
        for (pos, &value) in self.buffer_positions().zip(values) {
            buffer[pos] = value;
        }
    }
}

/// Iterator over `base + sum(k[i] * weights[i])` for every multi-index `k`
/// below `count`, in row-major order.
#[derive(Clone, Debug)]
pub struct Positions {
    current: usize,
    weights: Vec<usize>,
    count: Vec<usize>,
    k: Vec<usize>,
    remaining: usize,
}

impl Positions {
    fn new(base: usize, weights: Vec<usize>, count: Vec<usize>) -> Positions {
        let remaining = count.iter().product();
        Positions {
            current: base,
            k: vec![0; count.len()],
            weights,
            count,
            remaining,
        }
    }
}

impl Iterator for Positions {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.current;
        self.remaining -= 1;
        if self.remaining > 0 {
            for axis in (0..self.k.len()).rev() {
                self.k[axis] += 1;
                if self.k[axis] < self.count[axis] {
                    self.current += self.weights[axis];
                    break;
                }
                self.current -= self.weights[axis] * (self.count[axis] - 1);
                self.k[axis] = 0;
            }
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Positions {}

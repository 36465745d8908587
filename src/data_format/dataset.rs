//! Dense vector storage.
//!
//! Points, queries and training batches all live in [`DenseDataset`]: one
//! contiguous, 64-byte aligned buffer with a padded stride per row. Rows are
//! immutable once loaded; subsets are copied out rather than aliased.

use crate::error::{IndexError, Result};
use crate::types::{align_up, PointIndex, SIMD_ALIGNMENT};
use aligned_vec::{AVec, ConstAlign};

/// A dense dataset storing fixed-dimension `f32` vectors in contiguous memory.
pub struct DenseDataset {
    /// Contiguous storage for all values, aligned for SIMD.
    data: AVec<f32, ConstAlign<64>>,

    /// Number of rows.
    num_points: usize,

    /// Dimensionality of each row.
    dimensionality: usize,

    /// Stride between rows (may be > dimensionality for alignment).
    stride: usize,
}

impl DenseDataset {
    /// Create an empty dense dataset.
    pub fn new() -> Self {
        Self {
            data: AVec::new(64),
            num_points: 0,
            dimensionality: 0,
            stride: 0,
        }
    }

    /// Compute the stride for a given dimensionality.
    fn compute_stride(dimensionality: usize) -> usize {
        // Align to cache line boundary (64 bytes)
        let elems_per_line = SIMD_ALIGNMENT / std::mem::size_of::<f32>();
        align_up(dimensionality, elems_per_line)
    }

    /// Create a dense dataset from a vector of vectors.
    ///
    /// Fails if the rows do not all share the dimensionality of the first one.
    pub fn from_vecs(vecs: Vec<Vec<f32>>) -> Result<Self> {
        if vecs.is_empty() {
            return Ok(Self::new());
        }

        let dimensionality = vecs[0].len();
        if let Some((i, row)) = vecs.iter().enumerate().find(|(_, v)| v.len() != dimensionality) {
            return Err(IndexError::invalid_argument(format!(
                "row {} has dimensionality {}, expected {}",
                i,
                row.len(),
                dimensionality
            )));
        }

        let num_points = vecs.len();
        let stride = Self::compute_stride(dimensionality);

        let mut data: AVec<f32, ConstAlign<64>> = AVec::new(64);
        data.resize(num_points * stride, 0.0);

        for (i, vec) in vecs.iter().enumerate() {
            let offset = i * stride;
            data[offset..offset + dimensionality].copy_from_slice(vec);
        }

        Ok(Self {
            data,
            num_points,
            dimensionality,
            stride,
        })
    }

    /// Create a dense dataset from a flat row-major array.
    pub fn from_flat(data: &[f32], dimensionality: usize) -> Result<Self> {
        if dimensionality == 0 {
            return Err(IndexError::invalid_argument("Dimensionality cannot be 0"));
        }
        if data.len() % dimensionality != 0 {
            return Err(IndexError::invalid_argument(
                "Data length must be a multiple of dimensionality",
            ));
        }

        let num_points = data.len() / dimensionality;
        let stride = Self::compute_stride(dimensionality);

        let mut aligned: AVec<f32, ConstAlign<64>> = AVec::new(64);
        aligned.resize(num_points * stride, 0.0);
        for (i, row) in data.chunks_exact(dimensionality).enumerate() {
            let offset = i * stride;
            aligned[offset..offset + dimensionality].copy_from_slice(row);
        }

        Ok(Self {
            data: aligned,
            num_points,
            dimensionality,
            stride,
        })
    }

    /// Get the number of rows.
    pub fn size(&self) -> usize {
        self.num_points
    }

    /// Check if the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Get the dimensionality of rows.
    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    /// Get the stride between rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get a row by index.
    pub fn get(&self, index: PointIndex) -> Option<&[f32]> {
        let idx = index as usize;
        if idx >= self.num_points {
            return None;
        }
        Some(self.row(idx))
    }

    /// Get a row by position. Panics if out of bounds.
    #[inline]
    pub fn row(&self, index: usize) -> &[f32] {
        let offset = index * self.stride;
        &self.data[offset..offset + self.dimensionality]
    }

    /// Iterate over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.num_points).map(move |i| self.row(i))
    }

    /// Borrow the rows at `indices`, in the given order.
    pub fn select_rows<'a>(&'a self, indices: &[usize]) -> Vec<&'a [f32]> {
        indices.iter().map(|&i| self.row(i)).collect()
    }

    /// Copy the rows at `indices` into a new dataset.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let mut data: AVec<f32, ConstAlign<64>> = AVec::new(64);
        data.resize(indices.len() * self.stride, 0.0);
        for (dst, &src) in indices.iter().enumerate() {
            let offset = dst * self.stride;
            data[offset..offset + self.dimensionality].copy_from_slice(self.row(src));
        }
        Self {
            data,
            num_points: indices.len(),
            dimensionality: self.dimensionality,
            stride: self.stride,
        }
    }

    /// Copy all rows out as owned vectors.
    pub fn to_vecs(&self) -> Vec<Vec<f32>> {
        self.rows().map(|r| r.to_vec()).collect()
    }
}

impl Default for DenseDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DenseDataset {
    fn clone(&self) -> Self {
        let mut data: AVec<f32, ConstAlign<64>> = AVec::new(64);
        data.reserve(self.data.len());
        for &val in self.data.iter() {
            data.push(val);
        }
        Self {
            data,
            num_points: self.num_points,
            dimensionality: self.dimensionality,
            stride: self.stride,
        }
    }
}

impl std::fmt::Debug for DenseDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseDataset")
            .field("num_points", &self.num_points)
            .field("dimensionality", &self.dimensionality)
            .finish()
    }
}

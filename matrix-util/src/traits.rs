/// Operations to sample random matrices, only works for
/// `ndarray::Array2`
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a normal distribution `N(0,1)` with a
    /// fixed random seed so that simulations can be replayed
    fn rnorm_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat;
}

/// Missing-value bookkeeping for dense matrices
pub trait MaskOps {
    type Mat;
    type Mask;
    type Scalar;

    /// `true` wherever the entry is `NaN` or infinite
    fn nonfinite_mask(&self) -> Self::Mask;

    /// Overwrite the masked entries with `fill`
    fn fill_masked_inplace(&mut self, mask: &Self::Mask, fill: Self::Scalar);

    /// A copy with the masked entries replaced by `fill`
    fn fill_masked(&self, mask: &Self::Mask, fill: Self::Scalar) -> Self::Mat;
}

/// Counting masked entries along the rows and columns of a boolean
/// mask
pub trait MaskCountOps {
    type Counts;

    /// number of `true` entries in each row
    fn count_rows(&self) -> Self::Counts;

    /// number of `true` entries in each column
    fn count_columns(&self) -> Self::Counts;

    /// total number of `true` entries
    fn count_all(&self) -> usize;
}

/// Layout helpers
pub trait MatOps {
    type Mat;

    /// Transpose into a fresh, row-major (C-order) matrix
    fn transpose_standard(&self) -> Self::Mat;

    /// Element-wise square
    fn square(&self) -> Self::Mat;
}

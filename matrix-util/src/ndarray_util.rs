pub use ndarray::prelude::*;
pub use rand::Rng;
pub use rand_distr::StandardNormal;

use crate::traits::*;
use num_traits::{Float, FromPrimitive};
use rand::rngs::StdRng;
use rand::SeedableRng;

impl<T> SampleOps for ndarray::Array2<T>
where
    T: Float + FromPrimitive,
{
    type Mat = Self;
    type Scalar = T;

    fn rnorm_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_simple_fn((dd, nn), || {
            let x: f64 = rng.sample(StandardNormal);
            T::from(x).expect("failed to type")
        })
    }
}

impl<T> MaskOps for ndarray::Array2<T>
where
    T: Float,
{
    type Mat = Self;
    type Mask = Array2<bool>;
    type Scalar = T;

    fn nonfinite_mask(&self) -> Self::Mask {
        self.mapv(|x| !x.is_finite())
    }

    fn fill_masked_inplace(&mut self, mask: &Self::Mask, fill: Self::Scalar) {
        debug_assert_eq!(self.dim(), mask.dim());
        ndarray::Zip::from(self).and(mask).for_each(|x, &m| {
            if m {
                *x = fill;
            }
        });
    }

    fn fill_masked(&self, mask: &Self::Mask, fill: Self::Scalar) -> Self::Mat {
        let mut ret = self.clone();
        ret.fill_masked_inplace(mask, fill);
        ret
    }
}

impl MaskCountOps for ndarray::Array2<bool> {
    type Counts = Array1<usize>;

    fn count_rows(&self) -> Self::Counts {
        self.map_axis(Axis(1), |row| row.iter().filter(|&&m| m).count())
    }

    fn count_columns(&self) -> Self::Counts {
        self.map_axis(Axis(0), |col| col.iter().filter(|&&m| m).count())
    }

    fn count_all(&self) -> usize {
        self.iter().filter(|&&m| m).count()
    }
}

impl<T> MatOps for ndarray::Array2<T>
where
    T: Float,
{
    type Mat = Self;

    fn transpose_standard(&self) -> Self::Mat {
        self.t().as_standard_layout().into_owned()
    }

    fn square(&self) -> Self::Mat {
        self.mapv(|x| x * x)
    }
}

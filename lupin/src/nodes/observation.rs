use super::*;
use crate::elbo::{observation_elbo, LikelihoodMoments};
use crate::options::ComputeOptions;
use log::debug;
use matrix_util::traits::{MaskCountOps, MaskOps};
use ndarray::{Array1, Axis, Zip};

/// Value written into masked entries of the working matrix
pub const MASK_FILL: f64 = 0.0;

/// Observed entry counts, computed once by `precompute`
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedCounts {
    /// observed features per sample (`N`)
    pub per_sample: Array1<f64>,
    /// observed samples per feature (`D`)
    pub per_feature: Array1<f64>,
    /// additive constant of the Gaussian log-likelihood,
    /// `-0.5 * sum(N) * ln(2π)`
    pub likconst: f64,
}

#[derive(Debug, Clone)]
struct MiniBatch {
    value: Mat,
    mask: Mask,
}

/// Observed data of one view with its missing-value mask.
///
/// Missing entries are filled with `MASK_FILL` in place, so the
/// original non-finite values are gone once the node exists.
#[derive(Debug, Clone)]
pub struct ObservationNode {
    moments: Moments,
    mask: Mask,
    mini_batch: Option<MiniBatch>,
    counts: Option<ObservedCounts>,
}

impl ObservationNode {
    /// Wrap a samples x features matrix; non-finite entries are
    /// treated as missing
    pub fn new(value: Mat) -> Self {
        let mask = Mask::from_elem(value.dim(), false);
        let mut ret = Self {
            moments: Moments::first(value),
            mask,
            mini_batch: None,
            counts: None,
        };
        ret.mask();
        ret
    }

    /// Wrap a matrix with an explicit missing-value mask. Non-finite
    /// entries are masked as well.
    pub fn with_mask(value: Mat, mask: Mask) -> anyhow::Result<Self> {
        if mask.dim() != value.dim() {
            return Err(ModelError::ShapeMismatch {
                what: "missing-value mask".into(),
                expected: value.dim(),
                found: mask.dim(),
            }
            .into());
        }
        let mut ret = Self {
            moments: Moments::first(value),
            mask,
            mini_batch: None,
            counts: None,
        };
        ret.mask();
        Ok(ret)
    }

    /// Mask the non-finite entries and fill every masked entry with
    /// `MASK_FILL`. Calling it again changes nothing.
    pub fn mask(&mut self) {
        let invalid = self.moments.e.nonfinite_mask();
        Zip::from(&mut self.mask)
            .and(&invalid)
            .for_each(|m, &bad| *m |= bad);
        self.moments.e.fill_masked_inplace(&self.mask, MASK_FILL);
    }

    /// Mask of the active mini-batch, or of the full matrix
    pub fn get_mask(&self) -> &Mask {
        match &self.mini_batch {
            Some(mb) => &mb.mask,
            None => &self.mask,
        }
    }

    /// Mask of the full matrix regardless of any mini-batch
    pub fn full_mask(&self) -> &Mask {
        &self.mask
    }

    /// Masked values of the full matrix
    pub fn value(&self) -> &Mat {
        &self.moments.e
    }

    pub fn nrows(&self) -> usize {
        self.moments.e.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.moments.e.ncols()
    }

    /// Count the observed entries per sample and per feature and set
    /// up the constant term of the likelihood. Counts always use the
    /// full-data mask.
    pub fn precompute(&mut self, options: &ComputeOptions) {
        if options.gpu_mode {
            debug!("gpu_mode requested; computing on the CPU");
        }

        let (nn, dd) = self.mask.dim();
        let per_sample = self.mask.count_rows().mapv(|k| (dd - k) as f64);
        let per_feature = self.mask.count_columns().mapv(|k| (nn - k) as f64);
        let likconst = -0.5 * per_sample.sum() * (2.0 * std::f64::consts::PI).ln();

        self.counts = Some(ObservedCounts {
            per_sample,
            per_feature,
            likconst,
        });
    }

    pub fn observed_counts(&self) -> Option<&ObservedCounts> {
        self.counts.as_ref()
    }

    /// Select a subset of samples as the working view for stochastic
    /// updates
    /// * `indices`: sample (row) indices
    pub fn define_mini_batch(&mut self, indices: &[usize]) -> anyhow::Result<()> {
        let nn = self.nrows();
        if let Some(&bad) = indices.iter().find(|&&i| i >= nn) {
            return Err(ModelError::IndexOutOfRange {
                what: "samples",
                index: bad,
                len: nn,
            }
            .into());
        }
        self.mini_batch = Some(MiniBatch {
            value: self.moments.e.select(Axis(0), indices),
            mask: self.mask.select(Axis(0), indices),
        });
        Ok(())
    }

    /// The active mini-batch, or the full matrix if none is set
    pub fn get_mini_batch(&self) -> &Mat {
        match &self.mini_batch {
            Some(mb) => &mb.value,
            None => &self.moments.e,
        }
    }

    pub fn clear_mini_batch(&mut self) {
        self.mini_batch = None;
    }

    pub fn has_mini_batch(&self) -> bool {
        self.mini_batch.is_some()
    }

    /// Gaussian likelihood term of this view
    /// * `likelihood`: moments of `Z`, `W` and `Tau` for this view
    pub fn calculate_elbo(&self, likelihood: &LikelihoodMoments) -> anyhow::Result<f64> {
        let counts = self
            .counts
            .as_ref()
            .ok_or(ModelError::NotPrecomputed(NodeName::Y))?;
        observation_elbo(&self.moments.e, &self.mask, counts.likconst, likelihood)
    }
}

/// The observation node `Y`: one `ObservationNode` per view sharing
/// the sample axis
#[derive(Debug, Clone)]
pub struct ObservedViews {
    views: Vec<ObservationNode>,
    dependencies: Vec<NodeName>,
}

impl ObservedViews {
    /// * `data`: one samples x features matrix per view, `NaN` for
    ///   missing entries
    pub fn new(data: Vec<Mat>) -> anyhow::Result<Self> {
        Self::from_nodes(data.into_iter().map(ObservationNode::new).collect())
    }

    pub fn from_nodes(views: Vec<ObservationNode>) -> anyhow::Result<Self> {
        if views.is_empty() {
            anyhow::bail!("no views in the observed data");
        }
        let nn = views[0].nrows();
        for v in views.iter().skip(1) {
            if v.nrows() != nn {
                return Err(ModelError::DimensionMismatch {
                    what: "samples across views".into(),
                    expected: nn,
                    found: v.nrows(),
                }
                .into());
            }
        }
        Ok(Self {
            views,
            dependencies: vec![NodeName::Tau, NodeName::W, NodeName::Z],
        })
    }

    pub fn views(&self) -> &[ObservationNode] {
        &self.views
    }

    pub fn view(&self, m: usize) -> anyhow::Result<&ObservationNode> {
        check_view(m, self.views.len())?;
        Ok(&self.views[m])
    }

    pub fn view_mut(&mut self, m: usize) -> anyhow::Result<&mut ObservationNode> {
        check_view(m, self.views.len())?;
        Ok(&mut self.views[m])
    }

    pub fn num_samples(&self) -> usize {
        self.views[0].nrows()
    }

    /// full-data masks, one per view
    pub fn masks(&self) -> Vec<&Mask> {
        self.views.iter().map(|v| v.full_mask()).collect()
    }

    pub fn precompute(&mut self, options: &ComputeOptions) {
        for v in self.views.iter_mut() {
            v.precompute(options);
        }
    }

    /// Use the same samples as the mini-batch of every view
    pub fn define_mini_batch(&mut self, indices: &[usize]) -> anyhow::Result<()> {
        for v in self.views.iter_mut() {
            v.define_mini_batch(indices)?;
        }
        Ok(())
    }

    pub fn clear_mini_batch(&mut self) {
        for v in self.views.iter_mut() {
            v.clear_mini_batch();
        }
    }
}

impl Node for ObservedViews {
    fn name(&self) -> NodeName {
        NodeName::Y
    }

    fn kind(&self) -> NodeKind {
        NodeKind::OBSERVATION
    }

    fn num_views(&self) -> usize {
        self.views.len()
    }

    fn expectations(&self, view: usize) -> anyhow::Result<&Moments> {
        Ok(&self.view(view)?.moments)
    }

    fn dependencies(&self) -> &[NodeName] {
        &self.dependencies
    }

    fn calculate_elbo(&self, blanket: &MarkovBlanket) -> anyhow::Result<f64> {
        let mut elbo = 0.0;
        for (m, v) in self.views.iter().enumerate() {
            let likelihood = LikelihoodMoments::from_blanket(blanket, m)?;
            elbo += v.calculate_elbo(&likelihood)?;
        }
        Ok(elbo)
    }

    fn as_observations(&self) -> Option<&ObservedViews> {
        Some(self)
    }

    fn as_observations_mut(&mut self) -> Option<&mut ObservedViews> {
        Some(self)
    }
}

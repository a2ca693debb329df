//! Gaussian observation term of the evidence lower bound.
//!
//! For one view with data `Y` (samples x features), factors `Z`
//! (samples x factors), loadings `W` (features x factors) and noise
//! precision `Tau` (samples x features):
//!
//! ```text
//! E[(Y - ZW')^2] = Y^2 + E[Z^2]E[W^2]' - E[Z]^2 (E[W]^2)' + (E[Z]E[W]')^2 - 2 (E[Z]E[W]') Y
//!
//! elbo = likconst + 0.5 * sum(E[ln Tau]) - sum(E[Tau] * E[(Y - ZW')^2])
//! ```
//!
//! Both sums skip the masked entries by zeroing them first; no
//! renormalisation by the observed count is applied since `likconst`
//! already carries it.

use crate::error::ModelError;
use crate::nodes::{Mask, Mat, Moment, Moments, NodeName};
use crate::registry::MarkovBlanket;
use matrix_util::traits::{MaskOps, MatOps};

/// Moments of the Markov blanket needed by the likelihood term
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodMoments<'a> {
    pub z: &'a Mat,
    pub zz: &'a Mat,
    pub w: &'a Mat,
    pub ww: &'a Mat,
    pub tau: &'a Mat,
    pub ln_tau: &'a Mat,
}

fn required(moments: &Moments, node: NodeName, moment: Moment) -> anyhow::Result<&Mat> {
    moments
        .get(moment)
        .ok_or_else(|| ModelError::MissingExpectation { node, moment }.into())
}

impl<'a> LikelihoodMoments<'a> {
    /// * `z`: factors with `E` and `E2`
    /// * `w`: loadings of the view with `E` and `E2`
    /// * `tau`: precision of the view with `E` and `lnE`
    pub fn new(z: &'a Moments, w: &'a Moments, tau: &'a Moments) -> anyhow::Result<Self> {
        Ok(Self {
            z: required(z, NodeName::Z, Moment::E)?,
            zz: required(z, NodeName::Z, Moment::E2)?,
            w: required(w, NodeName::W, Moment::E)?,
            ww: required(w, NodeName::W, Moment::E2)?,
            tau: required(tau, NodeName::Tau, Moment::E)?,
            ln_tau: required(tau, NodeName::Tau, Moment::LnE)?,
        })
    }

    /// Collect the moments of view `m` from a resolved Markov
    /// blanket; any missing node or moment is fatal
    pub fn from_blanket(blanket: &MarkovBlanket<'a>, m: usize) -> anyhow::Result<Self> {
        let tau = blanket.expectations_for_view(NodeName::Tau, m)?;
        let w = blanket.expectations_for_view(NodeName::W, m)?;
        let z = blanket.expectations_for_view(NodeName::Z, m)?;
        Self::new(z, w, tau)
    }

    fn check_shapes(&self, dim: (usize, usize)) -> anyhow::Result<()> {
        let (nn, dd) = dim;
        let kk = self.z.ncols();
        let expected = [
            ("E of Z", self.z, (nn, kk)),
            ("E2 of Z", self.zz, (nn, kk)),
            ("E of W", self.w, (dd, kk)),
            ("E2 of W", self.ww, (dd, kk)),
            ("E of Tau", self.tau, (nn, dd)),
            ("lnE of Tau", self.ln_tau, (nn, dd)),
        ];
        for (what, mat, dim) in expected {
            if mat.dim() != dim {
                return Err(ModelError::ShapeMismatch {
                    what: what.into(),
                    expected: dim,
                    found: mat.dim(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Likelihood term of one view
/// * `y`: masked observations (masked entries may hold anything)
/// * `mask`: `true` where `y` is missing
/// * `likconst`: additive constant from the observed counts
/// * `m`: moments of the Markov blanket
pub fn observation_elbo(
    y: &Mat,
    mask: &Mask,
    likconst: f64,
    m: &LikelihoodMoments,
) -> anyhow::Result<f64> {
    if mask.dim() != y.dim() {
        return Err(ModelError::ShapeMismatch {
            what: "missing-value mask".into(),
            expected: y.dim(),
            found: mask.dim(),
        }
        .into());
    }
    m.check_shapes(y.dim())?;

    let ln_tau = m.ln_tau.fill_masked(mask, 0.0);

    let y = y.fill_masked(mask, 0.0);
    let zw = m.z.dot(&m.w.t());

    let mut tmp = y.square();
    tmp += &m.zz.dot(&m.ww.t());
    tmp -= &m.z.square().dot(&m.w.square().t());
    tmp += &zw.square();
    tmp -= &(&zw * &y * 2.0);
    tmp.fill_masked_inplace(mask, 0.0);

    Ok(likconst + 0.5 * ln_tau.sum() - (m.tau * &tmp).sum())
}

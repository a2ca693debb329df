use crate::model::FactorModel;
use crate::nodes::*;
use crate::options::ComputeOptions;
use crate::persist::DimNames;
use crate::registry::NodeRegistry;
use log::info;
use matrix_util::traits::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Posterior variance attached to the simulated factors and loadings
pub const POSTERIOR_VARIANCE: f64 = 0.01;

pub struct SimArgs {
    /// number of samples across all groups
    pub samples: usize,
    pub groups: usize,
    /// number of features in each view
    pub features: Vec<usize>,
    pub factors: usize,
    /// probability that an entry is missing
    pub missing: f64,
    /// noise precision
    pub precision: f64,
    pub rseed: u64,
}

impl Default for SimArgs {
    fn default() -> Self {
        Self {
            samples: 100,
            groups: 2,
            features: vec![50, 30],
            factors: 5,
            missing: 0.05,
            precision: 10.0,
            rseed: 42,
        }
    }
}

pub struct SimOut {
    /// trained model whose expectations sit at the true parameters
    pub model: FactorModel,
    /// observed data of each view, `NaN` where missing
    pub data: Vec<Mat>,
    pub samples_groups: Vec<Box<str>>,
    pub names: DimNames,
}

/// Sample a multi-view, multi-group Gaussian factor model and wrap
/// the truth as a trained model
///
/// ```text
/// Y(m) = Z * W(m)' + E(m),  E(m)(i,j) ~ N(0, 1/tau)
/// ```
///
pub fn simulate_factor_model(args: &SimArgs) -> anyhow::Result<SimOut> {
    let nn = args.samples;
    let kk = args.factors;
    let mm = args.features.len();

    if nn == 0 || kk == 0 || mm == 0 {
        anyhow::bail!("need at least one sample, factor and view");
    }
    if args.groups == 0 || args.groups > nn {
        anyhow::bail!("{} groups for {} samples", args.groups, nn);
    }
    if !(0.0..1.0).contains(&args.missing) {
        anyhow::bail!("missing rate must be in [0, 1)");
    }
    if args.precision <= 0.0 {
        anyhow::bail!("precision must be positive");
    }

    let timer = Instant::now();
    let mut rng = StdRng::seed_from_u64(args.rseed);

    let z_nk = Mat::rnorm_seeded(nn, kk, args.rseed);

    let mut data = Vec::with_capacity(mm);
    let mut w_blocks = Vec::with_capacity(mm);
    let mut tau_blocks = Vec::with_capacity(mm);
    let mut alpha_blocks = Vec::with_capacity(mm);

    for (m, &dd) in args.features.iter().enumerate() {
        let seed = args.rseed.wrapping_add(m as u64 + 1);
        let w_dk = Mat::rnorm_seeded(dd, kk, seed);
        let noise = Mat::rnorm_seeded(nn, dd, seed.wrapping_mul(31)) / args.precision.sqrt();

        let mut y_nd = z_nk.dot(&w_dk.t()) + noise;
        y_nd.mapv_inplace(|y| {
            if rng.random::<f64>() < args.missing {
                f64::NAN
            } else {
                y
            }
        });
        data.push(y_nd);

        let ww = w_dk.square() + POSTERIOR_VARIANCE;
        w_blocks.push(Moments::first(w_dk).with_second(ww));

        tau_blocks.push(
            Moments::first(Mat::from_elem((nn, dd), args.precision))
                .with_log(Mat::from_elem((nn, dd), args.precision.ln())),
        );

        alpha_blocks.push(Moments::first(Mat::ones((kk, 1))));
    }

    info!("sampled {} views for {} samples", mm, nn);

    let zz = z_nk.square() + POSTERIOR_VARIANCE;
    let mut registry = NodeRegistry::new();

    registry.add(Box::new(ObservedViews::new(data.clone())?))?;
    registry.add(Box::new(LatentNode::single_view(
        NodeName::Z,
        true,
        Moments::first(z_nk).with_second(zz),
        &[NodeName::Y, NodeName::W],
    )?))?;
    registry.add(Box::new(LatentNode::multi_view(
        NodeName::W,
        false,
        w_blocks,
        &[NodeName::Y, NodeName::Z, NodeName::AlphaW],
    )?))?;
    registry.add(Box::new(LatentNode::multi_view(
        NodeName::Tau,
        true,
        tau_blocks,
        &[NodeName::Y, NodeName::Z, NodeName::W],
    )?))?;
    registry.add(Box::new(LatentNode::multi_view(
        NodeName::AlphaW,
        false,
        alpha_blocks,
        &[NodeName::W],
    )?))?;

    registry.resolve_markov_blankets();
    registry
        .observations_mut()?
        .precompute(&ComputeOptions::default());

    let elbo = registry.calculate_elbo()?;
    info!("ELBO at the true parameters: {}", elbo);

    let mut model = FactorModel::new(registry);
    model.record_iteration(kk as u64, timer.elapsed().as_secs_f64(), elbo);
    model.finish();

    // contiguous blocks of samples per group
    let samples_groups = (0..nn)
        .map(|i| format!("group{}", i * args.groups / nn).into_boxed_str())
        .collect();

    let names = DimNames {
        views: (0..mm).map(|m| format!("view{}", m).into_boxed_str()).collect(),
        samples: (0..nn).map(|i| format!("sample{}", i).into_boxed_str()).collect(),
        features: args
            .features
            .iter()
            .enumerate()
            .map(|(m, &dd)| {
                (0..dd)
                    .map(|j| format!("view{}_feature{}", m, j).into_boxed_str())
                    .collect()
            })
            .collect(),
    };

    Ok(SimOut {
        model,
        data,
        samples_groups,
        names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrainedModel;

    #[test]
    fn simulated_model_is_trained() -> anyhow::Result<()> {
        let args = SimArgs {
            samples: 20,
            groups: 3,
            features: vec![7, 4],
            factors: 2,
            ..Default::default()
        };
        let sim = simulate_factor_model(&args)?;

        assert!(sim.model.is_trained());
        assert_eq!(sim.data.len(), 2);
        assert_eq!(sim.data[1].dim(), (20, 4));
        assert_eq!(sim.samples_groups.len(), 20);
        assert_eq!(sim.samples_groups[19].as_ref(), "group2");
        assert_eq!(sim.model.training_stats().num_iterations(), 1);
        assert!(sim.model.training_stats().elbo[0].is_finite());
        Ok(())
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let args = SimArgs {
            groups: 0,
            ..Default::default()
        };
        assert!(simulate_factor_model(&args).is_err());
    }
}

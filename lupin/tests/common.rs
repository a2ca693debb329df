#![allow(dead_code)]

use lupin::model::FactorModel;
use lupin::nodes::*;
use lupin::options::ComputeOptions;
use lupin::persist::DimNames;
use lupin::registry::NodeRegistry;
use ndarray::{array, Array2};

pub struct Fixture {
    pub model: FactorModel,
    pub data: Vec<Mat>,
    pub samples_groups: Vec<Box<str>>,
    pub names: DimNames,
}

pub fn boxed(xs: &[&str]) -> Vec<Box<str>> {
    xs.iter().map(|&x| Box::from(x)).collect()
}

fn precision(dim: (usize, usize), tau: f64) -> Moments {
    Moments::first(Mat::from_elem(dim, tau)).with_log(Mat::from_elem(dim, tau.ln()))
}

/// Two views (3 and 2 features), five samples in groups `b a b a b`,
/// one factor. Entry (0, 1) of the first view is missing.
pub fn two_view_model(trained: bool) -> anyhow::Result<Fixture> {
    let y0: Mat = array![
        [1.0, f64::NAN, 0.5],
        [0.0, 1.0, -1.0],
        [2.0, 0.1, 0.3],
        [-0.5, 0.2, 0.4],
        [1.5, -2.0, 0.0]
    ];
    let y1: Mat = array![[1.0, 2.0], [0.0, 1.0], [3.0, 1.0], [0.5, 0.5], [1.0, 0.0]];
    let data = vec![y0, y1];

    let z: Mat = Array2::from_shape_fn((5, 1), |(i, _)| i as f64 * 0.1);
    let w0: Mat = array![[1.0], [2.0], [3.0]];
    let w1: Mat = array![[-1.0], [0.5]];

    let mut registry = NodeRegistry::new();
    registry.add(Box::new(ObservedViews::new(data.clone())?))?;
    registry.add(Box::new(LatentNode::single_view(
        NodeName::Z,
        true,
        Moments::first(z.clone()).with_second(z.mapv(|x| x * x + 0.1)),
        &[NodeName::Y, NodeName::W],
    )?))?;
    registry.add(Box::new(LatentNode::multi_view(
        NodeName::W,
        false,
        vec![
            Moments::first(w0.clone()).with_second(w0.mapv(|x| x * x + 0.1)),
            Moments::first(w1.clone()).with_second(w1.mapv(|x| x * x + 0.1)),
        ],
        &[NodeName::Y, NodeName::Z, NodeName::AlphaW],
    )?))?;
    registry.add(Box::new(LatentNode::multi_view(
        NodeName::Tau,
        true,
        vec![precision((5, 3), 2.0), precision((5, 2), 4.0)],
        &[NodeName::Y, NodeName::Z, NodeName::W],
    )?))?;
    registry.add(Box::new(LatentNode::multi_view(
        NodeName::AlphaW,
        false,
        vec![Moments::first(array![[1.0]]), Moments::first(array![[2.0]])],
        &[NodeName::W],
    )?))?;

    registry.resolve_markov_blankets();
    registry
        .observations_mut()?
        .precompute(&ComputeOptions::default());
    let elbo = registry.calculate_elbo()?;

    let mut model = FactorModel::new(registry);
    model.record_iteration(1, 0.25, elbo);
    if trained {
        model.finish();
    }

    let names = DimNames {
        views: boxed(&["view0", "view1"]),
        samples: boxed(&["s0", "s1", "s2", "s3", "s4"]),
        features: vec![boxed(&["f0", "f1", "f2"]), boxed(&["g0", "g1"])],
    };

    Ok(Fixture {
        model,
        data,
        samples_groups: boxed(&["b", "a", "b", "a", "b"]),
        names,
    })
}

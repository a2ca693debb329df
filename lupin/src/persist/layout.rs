//! Shape logic of the persisted tree: which blocks are written
//! where, and in which orientation.

use crate::error::ModelError;
use crate::nodes::{Mask, Mat, Node, Orientation};
use matrix_util::traits::{MaskOps, MatOps};
use ndarray::Axis;
use std::collections::BTreeMap;

/// Samples partitioned by group label. Groups are the sorted unique
/// labels; each group keeps the original sample order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPartition {
    names: Vec<Box<str>>,
    indices: Vec<Vec<usize>>,
}

impl GroupPartition {
    pub fn from_labels(labels: &[Box<str>]) -> Self {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, g) in labels.iter().enumerate() {
            groups.entry(g.as_ref()).or_default().push(i);
        }
        let (names, indices): (Vec<Box<str>>, Vec<Vec<usize>>) = groups
            .into_iter()
            .map(|(g, ix)| (Box::<str>::from(g), ix))
            .unzip();
        Self { names, indices }
    }

    pub fn names(&self) -> &[Box<str>] {
        &self.names
    }

    pub fn num_groups(&self) -> usize {
        self.names.len()
    }

    pub fn num_samples(&self) -> usize {
        self.indices.iter().map(|ix| ix.len()).sum()
    }

    /// (group name, sample indices)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.names
            .iter()
            .map(|g| g.as_ref())
            .zip(self.indices.iter().map(|ix| ix.as_slice()))
    }

    /// names of the samples in each group
    pub fn select_names(&self, names: &[Box<str>]) -> Vec<Vec<Box<str>>> {
        self.indices
            .iter()
            .map(|ix| ix.iter().map(|&i| names[i].clone()).collect())
            .collect()
    }
}

/// One block to be written, relative to its node (or view) group
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub path: Vec<Box<str>>,
    pub data: Mat,
}

/// Observed blocks of one view: group rows with masked entries set
/// to `NaN`
/// * `data`: samples x features matrix of the view
/// * `mask`: missing-value mask of the view
/// * `groups`: sample partition
pub fn data_leaves(data: &Mat, mask: &Mask, groups: &GroupPartition) -> Vec<Leaf> {
    let data = data.fill_masked(mask, f64::NAN);
    groups
        .iter()
        .map(|(g, rows)| Leaf {
            path: vec![g.into()],
            data: data.select(Axis(0), rows),
        })
        .collect()
}

fn check_samples(node: &dyn Node, found: usize, expected: usize) -> anyhow::Result<()> {
    if found != expected {
        return Err(ModelError::DimensionMismatch {
            what: format!("samples of multi-group node {}", node.name()),
            expected,
            found,
        }
        .into());
    }
    Ok(())
}

/// Expectation blocks of one node.
///
/// * multi-view, multi-group: `<view>/<group>`, masked with `NaN`,
///   sample-major
/// * multi-view, single-group: `<view>`, transposed
/// * single-view, multi-group: `<group>`, transposed
/// * single-view, single-group: `E`, transposed
///
/// * `node`: node to lay out
/// * `views`: view names
/// * `groups`: sample partition
/// * `masks`: missing-value mask per view
pub fn expectation_leaves(
    node: &dyn Node,
    views: &[Box<str>],
    groups: &GroupPartition,
    masks: &[&Mask],
) -> anyhow::Result<Vec<Leaf>> {
    let kind = node.kind();
    let orient = |x: Mat| match kind.persisted_orientation() {
        Orientation::SampleMajor => x,
        Orientation::Transposed => x.transpose_standard(),
    };

    let mut ret = vec![];

    if kind.multi_view {
        if node.num_views() != views.len() {
            return Err(ModelError::DimensionMismatch {
                what: format!("views of node {}", node.name()),
                expected: views.len(),
                found: node.num_views(),
            }
            .into());
        }

        for (m, view) in views.iter().enumerate() {
            let exp = node.expectation(m)?;

            if kind.multi_group {
                let mask = *masks.get(m).ok_or_else(|| ModelError::DimensionMismatch {
                    what: format!("masks for node {}", node.name()),
                    expected: views.len(),
                    found: masks.len(),
                })?;
                if mask.dim() != exp.dim() {
                    return Err(ModelError::ShapeMismatch {
                        what: format!("expectation of {} in view {}", node.name(), view),
                        expected: mask.dim(),
                        found: exp.dim(),
                    }
                    .into());
                }
                let exp = exp.fill_masked(mask, f64::NAN);
                for (g, rows) in groups.iter() {
                    ret.push(Leaf {
                        path: vec![view.clone(), g.into()],
                        data: orient(exp.select(Axis(0), rows)),
                    });
                }
            } else {
                ret.push(Leaf {
                    path: vec![view.clone()],
                    data: orient(exp.clone()),
                });
            }
        }
    } else {
        let exp = node.expectation(0)?;

        if kind.multi_group {
            check_samples(node, exp.nrows(), groups.num_samples())?;
            for (g, rows) in groups.iter() {
                ret.push(Leaf {
                    path: vec![g.into()],
                    data: orient(exp.select(Axis(0), rows)),
                });
            }
        } else {
            ret.push(Leaf {
                path: vec!["E".into()],
                data: orient(exp.clone()),
            });
        }
    }

    Ok(ret)
}

//! Variational nodes and the expectation contract they share.

pub mod latent;
pub mod observation;

pub use latent::LatentNode;
pub use observation::{ObservationNode, ObservedCounts, ObservedViews};

use crate::error::ModelError;
use crate::registry::MarkovBlanket;
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

/// Dense matrix used for every expectation
pub type Mat = Array2<f64>;

/// Boolean missing-value mask
pub type Mask = Array2<bool>;

/// Names of the nodes the model knows about. Anything else is
/// rejected when a name is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeName {
    Z,
    W,
    Y,
    Tau,
    AlphaW,
    AlphaZ,
    ThetaZ,
    ThetaW,
}

impl NodeName {
    pub const ALL: [NodeName; 8] = [
        NodeName::Z,
        NodeName::W,
        NodeName::Y,
        NodeName::Tau,
        NodeName::AlphaW,
        NodeName::AlphaZ,
        NodeName::ThetaZ,
        NodeName::ThetaW,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeName::Z => "Z",
            NodeName::W => "W",
            NodeName::Y => "Y",
            NodeName::Tau => "Tau",
            NodeName::AlphaW => "AlphaW",
            NodeName::AlphaZ => "AlphaZ",
            NodeName::ThetaZ => "ThetaZ",
            NodeName::ThetaW => "ThetaW",
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| ModelError::UnrecognisedNode(s.to_string()))
    }
}

/// Named moments of a variational distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Moment {
    /// first moment `E[x]`
    E,
    /// second moment `E[x^2]`
    E2,
    /// log expectation `E[ln x]`
    LnE,
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Moment::E => "E",
            Moment::E2 => "E2",
            Moment::LnE => "lnE",
        })
    }
}

/// Sufficient statistics of one parameter block
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub e: Mat,
    pub e2: Option<Mat>,
    pub ln_e: Option<Mat>,
}

impl Moments {
    pub fn first(e: Mat) -> Self {
        Self {
            e,
            e2: None,
            ln_e: None,
        }
    }

    pub fn with_second(mut self, e2: Mat) -> Self {
        self.e2 = Some(e2);
        self
    }

    pub fn with_log(mut self, ln_e: Mat) -> Self {
        self.ln_e = Some(ln_e);
        self
    }

    pub fn get(&self, moment: Moment) -> Option<&Mat> {
        match moment {
            Moment::E => Some(&self.e),
            Moment::E2 => self.e2.as_ref(),
            Moment::LnE => self.ln_e.as_ref(),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.e.dim()
    }

    /// every available moment must share the shape of `E`
    pub fn check_shapes(&self, owner: NodeName) -> anyhow::Result<()> {
        for (moment, mat) in [(Moment::E2, &self.e2), (Moment::LnE, &self.ln_e)] {
            if let Some(mat) = mat {
                if mat.dim() != self.e.dim() {
                    return Err(ModelError::ShapeMismatch {
                        what: format!("{} of {}", moment, owner),
                        expected: self.e.dim(),
                        found: mat.dim(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// How a node's parameters are blocked: one block per view or a
/// single one, and rows per sample (across groups) or not.
///
/// These two flags decide both the indexing of the expectations and
/// the layout of the persisted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKind {
    pub multi_view: bool,
    pub multi_group: bool,
}

/// Orientation of a block in the persisted container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// samples by features, as held in memory
    SampleMajor,
    /// transposed relative to memory
    Transposed,
}

impl NodeKind {
    pub const OBSERVATION: NodeKind = NodeKind {
        multi_view: true,
        multi_group: true,
    };

    pub fn new(multi_view: bool, multi_group: bool) -> Self {
        Self {
            multi_view,
            multi_group,
        }
    }

    /// one samples x features block per view, like the data
    pub fn is_observation_shaped(&self) -> bool {
        self.multi_view && self.multi_group
    }

    pub fn persisted_orientation(&self) -> Orientation {
        if self.is_observation_shaped() {
            Orientation::SampleMajor
        } else {
            Orientation::Transposed
        }
    }
}

/// Contract shared by every node in the registry
pub trait Node {
    fn name(&self) -> NodeName;

    fn kind(&self) -> NodeKind;

    /// number of parameter blocks; 1 for single-view nodes
    fn num_views(&self) -> usize;

    /// all moments of the block for `view` (use 0 for single-view
    /// nodes)
    fn expectations(&self, view: usize) -> anyhow::Result<&Moments>;

    /// first moment of the block for `view`
    fn expectation(&self, view: usize) -> anyhow::Result<&Mat> {
        Ok(&self.expectations(view)?.e)
    }

    /// names of the nodes this one reads from
    fn dependencies(&self) -> &[NodeName];

    /// replace the moments of one block
    fn set_moments(&mut self, _view: usize, _moments: Moments) -> anyhow::Result<()> {
        Err(ModelError::ConstantNode(self.name()).into())
    }

    /// this node's contribution to the evidence lower bound; nodes
    /// whose variational family lives outside this crate contribute
    /// nothing
    fn calculate_elbo(&self, _blanket: &MarkovBlanket) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    fn as_observations(&self) -> Option<&ObservedViews> {
        None
    }

    fn as_observations_mut(&mut self) -> Option<&mut ObservedViews> {
        None
    }
}

pub(crate) fn check_view(view: usize, num_views: usize) -> anyhow::Result<()> {
    if view >= num_views {
        return Err(ModelError::IndexOutOfRange {
            what: "views",
            index: view,
            len: num_views,
        }
        .into());
    }
    Ok(())
}

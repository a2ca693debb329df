use crate::nodes::{Moment, NodeName};
use thiserror::Error;

/// Errors raised by the inference core and the model writer.
///
/// Everything here is a programming or configuration error: nothing
/// is retried, and the writer reports these before touching the
/// output container.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model is not trained")]
    NotTrained,

    #[error("length of samples groups ({groups}) does not match the number of samples in the data ({samples})")]
    GroupLengthMismatch { groups: usize, samples: usize },

    #[error("unrecognised node: {0}")]
    UnrecognisedNode(String),

    #[error("missing expectation: {moment} of node {node}")]
    MissingExpectation { node: NodeName, moment: Moment },

    #[error("{what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("{what}: expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("compression level {0} is outside 1..=9")]
    InvalidCompression(u8),

    #[error("node {0} was used before precompute")]
    NotPrecomputed(NodeName),

    #[error("node {0} is registered twice")]
    DuplicateNode(NodeName),

    #[error("node {0} is not in the model")]
    NodeNotFound(NodeName),

    #[error("markov blankets are not resolved")]
    BlanketNotResolved,

    #[error("index {index} out of range for {len} {what}")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("node {0} holds constant moments")]
    ConstantNode(NodeName),
}

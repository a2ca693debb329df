pub mod elbo;
pub mod error;
pub mod model;
pub mod nodes;
pub mod options;
pub mod persist;
pub mod registry;
pub mod simulate;

pub use error::ModelError;
pub use model::{FactorModel, TrainedModel, TrainingStats};
pub use registry::NodeRegistry;

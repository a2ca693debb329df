use crate::registry::NodeRegistry;
use log::info;
use serde::{Deserialize, Serialize};

/// Per-iteration trace of the training loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// number of active factors after each iteration
    pub number_factors: Vec<u64>,
    /// wall-clock seconds spent in each iteration
    pub time: Vec<f64>,
    /// evidence lower bound after each iteration
    pub elbo: Vec<f64>,
}

impl TrainingStats {
    pub fn num_iterations(&self) -> usize {
        self.elbo.len()
    }
}

/// What the model writer needs from a trained model
pub trait TrainedModel {
    fn is_trained(&self) -> bool;
    fn nodes(&self) -> &NodeRegistry;
    fn training_stats(&self) -> &TrainingStats;
}

/// A node registry with the bookkeeping of the outer training loop
pub struct FactorModel {
    registry: NodeRegistry,
    stats: TrainingStats,
    trained: bool,
}

impl FactorModel {
    pub fn new(registry: NodeRegistry) -> Self {
        Self {
            registry,
            stats: TrainingStats::default(),
            trained: false,
        }
    }

    pub fn nodes_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    /// Append one iteration to the training trace
    pub fn record_iteration(&mut self, number_factors: u64, seconds: f64, elbo: f64) {
        self.stats.number_factors.push(number_factors);
        self.stats.time.push(seconds);
        self.stats.elbo.push(elbo);
    }

    /// Declare training complete
    pub fn finish(&mut self) {
        info!(
            "training finished after {} iterations",
            self.stats.num_iterations()
        );
        self.trained = true;
    }
}

impl TrainedModel for FactorModel {
    fn is_trained(&self) -> bool {
        self.trained
    }

    fn nodes(&self) -> &NodeRegistry {
        &self.registry
    }

    fn training_stats(&self) -> &TrainingStats {
        &self.stats
    }
}

use crate::model::TrainingStats;
use crate::nodes::{Mat, NodeName};
use crate::persist::hdf5_store::Hdf5Store;
use crate::persist::store::{join_path, Dataset, MemoryStore};
use log::warn;

/// A persisted model read back from its container
pub struct PersistedModel {
    views: Vec<Box<str>>,
    features: Vec<Vec<Box<str>>>,
    groups: Vec<Box<str>>,
    samples: Vec<Vec<Box<str>>>,
    train_options: Vec<(Box<str>, f64)>,
    training_stats: TrainingStats,
    store: MemoryStore,
}

fn names_under(store: &MemoryStore, parent: &str) -> anyhow::Result<(Vec<Box<str>>, Vec<Vec<Box<str>>>)> {
    let mut keys = vec![];
    let mut values = vec![];
    for k in store.children(parent) {
        let path = join_path(parent, k);
        let names = store
            .dataset(&path)
            .and_then(|d| d.as_names())
            .ok_or_else(|| anyhow::anyhow!("{} is not a list of names", path))?;
        keys.push(Box::from(k));
        values.push(names.to_vec());
    }
    Ok((keys, values))
}

fn read_vector(store: &MemoryStore, path: &str) -> anyhow::Result<Vec<f64>> {
    match store.dataset(path) {
        Some(Dataset::Vector(x)) => Ok(x.to_vec()),
        Some(_) => anyhow::bail!("{} is not a float vector", path),
        None => Ok(vec![]),
    }
}

impl PersistedModel {
    pub fn from_store(store: MemoryStore) -> anyhow::Result<Self> {
        if !store.has_group("features") || !store.has_group("samples") {
            anyhow::bail!("not a model container: missing features or samples");
        }

        let (views, features) = names_under(&store, "features")?;
        let (groups, samples) = names_under(&store, "samples")?;

        let train_options = match (store.dataset("training_opts"), store.names_attr("training_opts")) {
            (Some(Dataset::Vector(values)), Some(keys)) => {
                if keys.len() != values.len() {
                    anyhow::bail!(
                        "{} training option names for {} values",
                        keys.len(),
                        values.len()
                    );
                }
                keys.iter().cloned().zip(values.iter().copied()).collect()
            }
            (None, _) => vec![],
            _ => {
                warn!("training options without names; ignored");
                vec![]
            }
        };

        let number_factors = match store.dataset("training_stats/number_factors") {
            Some(Dataset::Integers(x)) => x.iter().map(|&k| k.max(0) as u64).collect(),
            Some(_) => anyhow::bail!("number_factors is not an integer vector"),
            None => vec![],
        };

        let training_stats = TrainingStats {
            number_factors,
            time: read_vector(&store, "training_stats/time")?,
            elbo: read_vector(&store, "training_stats/elbo")?,
        };

        Ok(Self {
            views,
            features,
            groups,
            samples,
            train_options,
            training_stats,
            store,
        })
    }

    pub fn load_hdf5(hdf5_file: &str) -> anyhow::Result<Self> {
        Self::from_store(Hdf5Store::load(hdf5_file)?)
    }

    pub fn views(&self) -> &[Box<str>] {
        &self.views
    }

    pub fn groups(&self) -> &[Box<str>] {
        &self.groups
    }

    /// feature names of a view
    pub fn features(&self, view: &str) -> Option<&[Box<str>]> {
        let m = self.views.iter().position(|v| v.as_ref() == view)?;
        Some(&self.features[m])
    }

    /// sample names of a group
    pub fn samples(&self, group: &str) -> Option<&[Box<str>]> {
        let g = self.groups.iter().position(|x| x.as_ref() == group)?;
        Some(&self.samples[g])
    }

    pub fn num_samples(&self) -> usize {
        self.samples.iter().map(|s| s.len()).sum()
    }

    /// observed block of a view and a group, `NaN` where missing
    pub fn data(&self, view: &str, group: &str) -> Option<&Mat> {
        self.store
            .dataset(&format!("data/{}/{}", view, group))
            .and_then(|d| d.as_matrix())
    }

    /// Expectation block of a node
    /// * `path`: `[view, group]`, `[view]`, `[group]` or `["E"]`
    pub fn expectation(&self, node: NodeName, path: &[&str]) -> Option<&Mat> {
        let mut full = join_path("expectations", node.as_str());
        for p in path {
            full = join_path(&full, p);
        }
        self.store.dataset(&full).and_then(|d| d.as_matrix())
    }

    /// nodes with persisted expectations
    pub fn nodes(&self) -> Vec<NodeName> {
        self.store
            .children("expectations")
            .into_iter()
            .filter_map(|x| x.parse().ok())
            .collect()
    }

    pub fn model_option(&self, key: &str) -> Option<&[Box<str>]> {
        self.store
            .dataset(&join_path("model_options", key))
            .and_then(|d| d.as_names())
    }

    pub fn train_options(&self) -> &[(Box<str>, f64)] {
        &self.train_options
    }

    pub fn train_option(&self, key: &str) -> Option<f64> {
        self.train_options
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| *v)
    }

    pub fn training_stats(&self) -> &TrainingStats {
        &self.training_stats
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

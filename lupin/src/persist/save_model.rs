use crate::error::ModelError;
use crate::model::TrainedModel;
use crate::nodes::{Mask, Mat, NodeName};
use crate::options::{flatten_train_options, ModelOptions, TrainOptions};
use crate::persist::hdf5_store::Hdf5Store;
use crate::persist::layout::*;
use crate::persist::store::*;
use log::{debug, info, warn};
use matrix_util::common_io::mkdir;
use ndarray::Array1;
use std::path::Path;
use std::str::FromStr;

/// Maximal gzip level
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 9;

/// Which nodes get their expectations written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeSelection {
    /// every node in the model
    #[default]
    All,
    /// the listed nodes that are present in the model
    Only(Vec<NodeName>),
}

impl NodeSelection {
    /// Parse a list of node names; any unrecognised name fails
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ModelError> {
        names
            .iter()
            .map(|x| x.as_ref().parse::<NodeName>())
            .collect::<Result<Vec<_>, _>>()
            .map(NodeSelection::Only)
    }

    /// Nodes to write, each once, in first-seen order
    pub fn resolve(&self, present: &[NodeName]) -> Vec<NodeName> {
        match self {
            NodeSelection::All => present.to_vec(),
            NodeSelection::Only(names) => {
                let mut ret: Vec<NodeName> = Vec::with_capacity(names.len());
                for n in names {
                    if !present.contains(n) {
                        debug!("node {} is not in the model; skipping", n);
                    } else if !ret.contains(n) {
                        ret.push(*n);
                    }
                }
                ret
            }
        }
    }
}

impl FromStr for NodeSelection {
    type Err = ModelError;

    /// `all` or a comma-separated list of node names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(NodeSelection::All);
        }
        let names: Vec<&str> = s.split(',').map(|x| x.trim()).collect();
        Self::from_names(&names)
    }
}

/// Dimension names supplied at save time
#[derive(Debug, Clone, Default)]
pub struct DimNames {
    pub views: Vec<Box<str>>,
    pub samples: Vec<Box<str>>,
    /// feature names of each view
    pub features: Vec<Vec<Box<str>>>,
}

/// Everything besides the model that goes into the container
pub struct SaveInputs<'a> {
    /// one samples x features matrix per view
    pub data: &'a [Mat],
    /// group label of each sample
    pub samples_groups: &'a [Box<str>],
    pub names: &'a DimNames,
    pub model_options: &'a ModelOptions,
    pub train_options: &'a TrainOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// gzip level, 1 to 9
    pub compression_level: u8,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Writes a trained model into a hierarchical container.
///
/// Every precondition is checked by `new`, and each `save_*` step
/// stages its part of the tree in memory. Nothing reaches the disk
/// until `write_hdf5`, so a failure never leaves a partial file.
pub struct ModelWriter<'a, M: TrainedModel> {
    model: &'a M,
    data: &'a [Mat],
    masks: Vec<&'a Mask>,
    groups: GroupPartition,
    names: &'a DimNames,
    model_options: &'a ModelOptions,
    train_options: &'a TrainOptions,
    compression_level: u8,
    store: MemoryStore,
}

fn check_len(what: String, expected: usize, found: usize) -> anyhow::Result<()> {
    if expected != found {
        return Err(ModelError::DimensionMismatch {
            what,
            expected,
            found,
        }
        .into());
    }
    Ok(())
}

impl<'a, M: TrainedModel> ModelWriter<'a, M> {
    pub fn new(model: &'a M, inputs: SaveInputs<'a>, options: &SaveOptions) -> anyhow::Result<Self> {
        if !model.is_trained() {
            return Err(ModelError::NotTrained.into());
        }

        let SaveInputs {
            data,
            samples_groups,
            names,
            model_options,
            train_options,
        } = inputs;

        if data.is_empty() {
            anyhow::bail!("no data views to save");
        }

        let nn = data[0].nrows();
        if samples_groups.len() != nn {
            return Err(ModelError::GroupLengthMismatch {
                groups: samples_groups.len(),
                samples: nn,
            }
            .into());
        }

        for x in data.iter().skip(1) {
            check_len("samples across views".into(), nn, x.nrows())?;
        }
        check_len("view names".into(), data.len(), names.views.len())?;
        check_len("sample names".into(), nn, names.samples.len())?;
        check_len("feature name tables".into(), data.len(), names.features.len())?;
        for (m, x) in data.iter().enumerate() {
            check_len(
                format!("feature names of view {}", names.views[m]),
                x.ncols(),
                names.features[m].len(),
            )?;
        }

        let level = options.compression_level;
        if !(1..=9).contains(&level) {
            return Err(ModelError::InvalidCompression(level).into());
        }

        let masks = model.nodes().observations()?.masks();
        check_len("masks".into(), data.len(), masks.len())?;
        for (x, mask) in data.iter().zip(masks.iter()) {
            if x.dim() != mask.dim() {
                return Err(ModelError::ShapeMismatch {
                    what: "missing-value mask".into(),
                    expected: x.dim(),
                    found: mask.dim(),
                }
                .into());
            }
        }

        let groups = GroupPartition::from_labels(samples_groups);
        info!(
            "{} views, {} samples in {} groups",
            data.len(),
            nn,
            groups.num_groups()
        );

        Ok(Self {
            model,
            data,
            masks,
            groups,
            names,
            model_options,
            train_options,
            compression_level: level,
            store: MemoryStore::new(),
        })
    }

    pub fn groups(&self) -> &GroupPartition {
        &self.groups
    }

    /// The tree staged so far
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn into_store(self) -> MemoryStore {
        self.store
    }

    fn compression(&self) -> Option<u8> {
        Some(self.compression_level)
    }

    fn ensure_group(&mut self, path: &str) -> anyhow::Result<()> {
        if !self.store.has_group(path) {
            self.store.create_group(path)?;
        }
        Ok(())
    }

    /// Training data with missing entries as `NaN`, plus sample and
    /// feature names
    ///
    /// ```text
    ///     ├── data/<view>/<group>
    ///     ├── features/<view>
    ///     └── samples/<group>
    /// ```
    pub fn save_data(&mut self) -> anyhow::Result<()> {
        self.store.create_group("data")?;
        self.store.create_group("features")?;
        self.store.create_group("samples")?;

        let sample_names = self.groups.select_names(&self.names.samples);
        for ((g, _), names) in self.groups.iter().zip(sample_names) {
            self.store
                .write_dataset(&join_path("samples", g), &Dataset::Names(names), None)?;
        }

        for (m, view) in self.names.views.iter().enumerate() {
            let features = Dataset::Names(self.names.features[m].clone());
            self.store
                .write_dataset(&join_path("features", view), &features, None)?;
        }

        let compression = self.compression();
        for (m, view) in self.names.views.iter().enumerate() {
            let view_path = join_path("data", view);
            self.store.create_group(&view_path)?;

            for leaf in data_leaves(&self.data[m], self.masks[m], &self.groups) {
                let path = join_path(&view_path, &leaf.path[0]);
                self.store
                    .write_dataset(&path, &Dataset::Matrix(leaf.data), compression)?;
            }
        }
        Ok(())
    }

    /// Expectations of the selected nodes under `expectations/`
    pub fn save_expectations(&mut self, nodes: &NodeSelection) -> anyhow::Result<()> {
        let model = self.model;
        let registry = model.nodes();
        let selected = nodes.resolve(&registry.names());

        // lay out every block first so that a bad node leaves no trace
        let mut planned = Vec::with_capacity(selected.len());
        for name in selected {
            let node = registry.get(name)?;
            let leaves = expectation_leaves(node, &self.names.views, &self.groups, &self.masks)?;
            planned.push((name, leaves));
        }

        self.store.create_group("expectations")?;
        let compression = self.compression();

        for (name, leaves) in planned {
            let node_path = join_path("expectations", name.as_str());
            self.store.create_group(&node_path)?;

            for leaf in leaves {
                let mut path = node_path.clone();
                let (last, parents) = leaf
                    .path
                    .split_last()
                    .ok_or_else(|| anyhow::anyhow!("empty block path for {}", name))?;
                for p in parents {
                    path = join_path(&path, p);
                    self.ensure_group(&path)?;
                }
                path = join_path(&path, last);
                self.store
                    .write_dataset(&path, &Dataset::Matrix(leaf.data), compression)?;
            }
            debug!("staged expectations of {}", name);
        }
        Ok(())
    }

    /// Variational parameters are no longer written; kept so that
    /// old call sites still run
    #[deprecated(note = "parameters are not persisted; use save_expectations")]
    pub fn save_parameters(&mut self, _nodes: &NodeSelection) -> anyhow::Result<()> {
        warn!("save_parameters is deprecated and writes nothing");
        Ok(())
    }

    /// `likelihoods`, `sl_z`, `sl_w` as byte strings
    pub fn save_model_options(&mut self) -> anyhow::Result<()> {
        self.store.create_group("model_options")?;

        let fields = self.model_options.persisted_fields();
        let keys: Vec<Box<str>> = fields.iter().map(|(k, _)| Box::from(*k)).collect();

        for (k, values) in fields {
            self.store.write_dataset(
                &join_path("model_options", k),
                &Dataset::Names(values),
                None,
            )?;
        }
        self.store.write_names_attr("model_options", &keys)?;
        Ok(())
    }

    /// Numeric training options in one dataset with a `names`
    /// attribute
    pub fn save_train_options(&mut self) -> anyhow::Result<()> {
        let flat = flatten_train_options(self.train_options);
        let (keys, values): (Vec<Box<str>>, Vec<f64>) = flat.into_iter().unzip();

        self.store.write_dataset(
            "training_opts",
            &Dataset::Vector(Array1::from_vec(values)),
            None,
        )?;
        self.store.write_names_attr("training_opts", &keys)?;
        Ok(())
    }

    /// Number of factors, time and ELBO trace
    pub fn save_training_stats(&mut self) -> anyhow::Result<()> {
        let stats = self.model.training_stats();
        self.store.create_group("training_stats")?;

        let number_factors = stats.number_factors.iter().map(|&k| k as i64).collect();
        self.store.write_dataset(
            "training_stats/number_factors",
            &Dataset::Integers(number_factors),
            None,
        )?;
        self.store.write_dataset(
            "training_stats/time",
            &Dataset::Vector(Array1::from_vec(stats.time.clone())),
            None,
        )?;
        self.store.write_dataset(
            "training_stats/elbo",
            &Dataset::Vector(Array1::from_vec(stats.elbo.clone())),
            None,
        )?;
        Ok(())
    }

    /// Stage every part of the container
    pub fn save_all(&mut self, nodes: &NodeSelection) -> anyhow::Result<()> {
        self.save_data()?;
        self.save_expectations(nodes)?;
        self.save_model_options()?;
        self.save_train_options()?;
        self.save_training_stats()?;
        Ok(())
    }

    /// Write the staged tree into an HDF5 file. The tree goes to a
    /// temporary file next to `hdf5_file` first and is renamed over
    /// it once complete, so a failed write leaves any existing file
    /// untouched and no partial file behind.
    pub fn write_hdf5(&self, hdf5_file: &str) -> anyhow::Result<()> {
        mkdir(hdf5_file)?;

        let dir = Path::new(hdf5_file)
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let staging = tempfile::Builder::new()
            .prefix(".lupin-")
            .suffix(".h5")
            .tempfile_in(dir)?
            .into_temp_path();

        let staging_file = staging
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("non-utf8 temporary path {:?}", staging))?;

        {
            let mut backend = Hdf5Store::create(staging_file)?;
            self.store.replay_into(&mut backend)?;
            backend.flush()?;
        }

        staging.persist(hdf5_file)?;
        info!("wrote {}", hdf5_file);
        Ok(())
    }
}

/// Check, stage and write a trained model in one go
/// * `model`: trained model
/// * `inputs`: data, group labels, names and options
/// * `options`: compression
/// * `nodes`: nodes whose expectations are written
/// * `hdf5_file`: output file
pub fn save_model<M: TrainedModel>(
    model: &M,
    inputs: SaveInputs,
    options: &SaveOptions,
    nodes: &NodeSelection,
    hdf5_file: &str,
) -> anyhow::Result<()> {
    let mut writer = ModelWriter::new(model, inputs, options)?;
    writer.save_all(nodes)?;
    writer.write_hdf5(hdf5_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_nodes_are_selected_once() -> anyhow::Result<()> {
        let present = [NodeName::Y, NodeName::Z, NodeName::W];
        let selection: NodeSelection = "Z, W, Z, Tau".parse()?;
        assert_eq!(selection.resolve(&present), vec![NodeName::Z, NodeName::W]);
        assert_eq!(NodeSelection::All.resolve(&present), present.to_vec());
        Ok(())
    }
}

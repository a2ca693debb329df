use crate::nodes::Mat;
use ndarray::Array1;

/// A leaf of the persisted tree
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Matrix(Mat),
    Vector(Array1<f64>),
    Integers(Array1<i64>),
    /// fixed-width byte strings
    Names(Vec<Box<str>>),
    /// a single fixed-width byte string
    Label(Box<str>),
}

impl Dataset {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Dataset::Matrix(x) => vec![x.nrows(), x.ncols()],
            Dataset::Vector(x) => vec![x.len()],
            Dataset::Integers(x) => vec![x.len()],
            Dataset::Names(x) => vec![x.len()],
            Dataset::Label(_) => vec![],
        }
    }

    pub fn as_matrix(&self) -> Option<&Mat> {
        match self {
            Dataset::Matrix(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_names(&self) -> Option<&[Box<str>]> {
        match self {
            Dataset::Names(x) => Some(x),
            _ => None,
        }
    }
}

/// Hierarchical key-value container: groups hold groups and
/// datasets, paths are `/`-separated without a leading slash.
pub trait HierarchicalStore {
    /// create a group; its parent must exist
    fn create_group(&mut self, path: &str) -> anyhow::Result<()>;

    /// write a dataset; its parent group must exist
    /// * `compression`: gzip level, or `None` for no compression
    fn write_dataset(
        &mut self,
        path: &str,
        data: &Dataset,
        compression: Option<u8>,
    ) -> anyhow::Result<()>;

    /// annotate a group or a dataset with a `names` attribute
    fn write_names_attr(&mut self, path: &str, names: &[Box<str>]) -> anyhow::Result<()>;
}

/// Join path segments with `/`
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", parent, child)
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

fn leaf_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, c)| c).unwrap_or(path)
}

#[derive(Debug, Clone)]
struct StoredDataset {
    path: Box<str>,
    data: Dataset,
    compression: Option<u8>,
}

/// Ordered in-memory tree. The model writer stages the whole tree
/// here before anything reaches the disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    groups: Vec<Box<str>>,
    datasets: Vec<StoredDataset>,
    attrs: Vec<(Box<str>, Vec<Box<str>>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_group(&self, path: &str) -> bool {
        path.is_empty() || self.groups.iter().any(|g| g.as_ref() == path)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.as_ref())
    }

    pub fn dataset(&self, path: &str) -> Option<&Dataset> {
        self.datasets
            .iter()
            .find(|d| d.path.as_ref() == path)
            .map(|d| &d.data)
    }

    pub fn compression(&self, path: &str) -> Option<u8> {
        self.datasets
            .iter()
            .find(|d| d.path.as_ref() == path)
            .and_then(|d| d.compression)
    }

    /// (path, dataset) in insertion order
    pub fn datasets(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.datasets.iter().map(|d| (d.path.as_ref(), &d.data))
    }

    pub fn names_attr(&self, path: &str) -> Option<&[Box<str>]> {
        self.attrs
            .iter()
            .find(|(p, _)| p.as_ref() == path)
            .map(|(_, names)| names.as_slice())
    }

    /// Names of the direct children (groups first, then datasets)
    pub fn children(&self, path: &str) -> Vec<&str> {
        let groups = self.groups.iter().map(|g| g.as_ref());
        let datasets = self.datasets.iter().map(|d| d.path.as_ref());
        groups
            .chain(datasets)
            .filter(|p| parent_of(p) == path)
            .map(leaf_of)
            .collect()
    }

    /// Copy the whole tree into another store, groups before the
    /// datasets they hold
    pub fn replay_into<S: HierarchicalStore>(&self, store: &mut S) -> anyhow::Result<()> {
        for g in self.groups.iter() {
            store.create_group(g)?;
        }
        for d in self.datasets.iter() {
            store.write_dataset(&d.path, &d.data, d.compression)?;
        }
        for (path, names) in self.attrs.iter() {
            store.write_names_attr(path, names)?;
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.has_group(path) || self.dataset(path).is_some()
    }
}

impl HierarchicalStore for MemoryStore {
    fn create_group(&mut self, path: &str) -> anyhow::Result<()> {
        if self.exists(path) {
            anyhow::bail!("{} already exists", path);
        }
        if !self.has_group(parent_of(path)) {
            anyhow::bail!("parent group of {} does not exist", path);
        }
        self.groups.push(path.into());
        Ok(())
    }

    fn write_dataset(
        &mut self,
        path: &str,
        data: &Dataset,
        compression: Option<u8>,
    ) -> anyhow::Result<()> {
        if self.exists(path) {
            anyhow::bail!("{} already exists", path);
        }
        if !self.has_group(parent_of(path)) {
            anyhow::bail!("parent group of {} does not exist", path);
        }
        self.datasets.push(StoredDataset {
            path: path.into(),
            data: data.clone(),
            compression,
        });
        Ok(())
    }

    fn write_names_attr(&mut self, path: &str, names: &[Box<str>]) -> anyhow::Result<()> {
        if !self.exists(path) {
            anyhow::bail!("no group or dataset at {}", path);
        }
        self.attrs.retain(|(p, _)| p.as_ref() != path);
        self.attrs.push((path.into(), names.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn tree_bookkeeping() -> anyhow::Result<()> {
        let mut store = MemoryStore::new();
        store.create_group("data")?;
        store.create_group("data/rna")?;
        assert!(store.create_group("data/rna").is_err());
        assert!(store.create_group("missing/child").is_err());

        store.write_dataset("data/rna/g1", &Dataset::Matrix(Mat::zeros((2, 3))), Some(9))?;
        store.write_dataset("training_opts", &Dataset::Vector(array![1.0, 2.0]), None)?;
        store.write_names_attr("training_opts", &["a".into(), "b".into()])?;

        assert_eq!(store.children(""), vec!["data", "training_opts"]);
        assert_eq!(store.children("data/rna"), vec!["g1"]);
        assert_eq!(store.dataset("data/rna/g1").unwrap().shape(), vec![2, 3]);
        assert_eq!(store.compression("data/rna/g1"), Some(9));
        assert_eq!(store.names_attr("training_opts").unwrap().len(), 2);

        let mut copy = MemoryStore::new();
        store.replay_into(&mut copy)?;
        assert_eq!(copy.children("data"), vec!["rna"]);
        assert_eq!(copy.dataset("training_opts"), store.dataset("training_opts"));
        Ok(())
    }
}

use crate::persist::store::*;
use hdf5::types::{FixedAscii, TypeDescriptor};
use log::{info, warn};
use ndarray::{arr1, Array1};

/// Width of every name slot in the container
pub const NAME_WIDTH: usize = 50;

pub type FixedName = FixedAscii<NAME_WIDTH>;

const NUM_CHUNKS: usize = 1000;
const MIN_CHUNK_SIZE: usize = 8192;

/// Elements per chunk of a compressed dataset with `nelem` entries
pub fn chunk_size(nelem: usize) -> usize {
    (nelem / NUM_CHUNKS).max(MIN_CHUNK_SIZE).min(nelem)
}

/// Rows per chunk of a compressed `nrow x ncol` matrix; chunks span
/// whole rows
pub fn chunk_rows(nrow: usize, ncol: usize) -> usize {
    (chunk_size(nrow * ncol) / ncol.max(1)).clamp(1, nrow.max(1))
}

/// HDF5 container
///
/// ```text
/// (root)
///     ├── data/<view>/<group>
///     ├── features/<view>
///     ├── samples/<group>
///     ├── expectations/<node>/[<view>/]<group or E>
///     ├── model_options/{likelihoods, sl_z, sl_w}
///     ├── training_opts (attribute: names)
///     └── training_stats/{number_factors, time, elbo}
/// ```
pub struct Hdf5Store {
    backend: hdf5::File,
    file_name: String,
}

impl Hdf5Store {
    /// Create (or truncate) an HDF5 file
    pub fn create(hdf5_file: &str) -> anyhow::Result<Self> {
        let backend = hdf5::File::create(hdf5_file)?;
        Ok(Self {
            backend,
            file_name: hdf5_file.to_string(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Read a whole HDF5 file back into memory. Members come back in
    /// the file's (alphabetical) link order.
    pub fn load(hdf5_file: &str) -> anyhow::Result<MemoryStore> {
        let file = hdf5::File::open(hdf5_file)?;
        info!("Opened {}", hdf5_file);

        let mut ret = MemoryStore::new();
        load_group(&file, "", &mut ret)?;
        Ok(ret)
    }
}

/// Encode names as fixed-width ASCII, truncating to `NAME_WIDTH`
/// bytes
pub fn to_fixed_names(names: &[Box<str>]) -> anyhow::Result<Vec<FixedName>> {
    names
        .iter()
        .map(|x| -> anyhow::Result<FixedName> {
            let bytes = x.as_bytes();
            if bytes.len() > NAME_WIDTH {
                warn!("name '{}' is longer than {} bytes; truncated", x, NAME_WIDTH);
            }
            let bytes = &bytes[..bytes.len().min(NAME_WIDTH)];
            FixedName::from_ascii(bytes)
                .map_err(|e| anyhow::anyhow!("name '{}' is not a valid ascii string: {}", x, e))
        })
        .collect()
}

fn from_fixed_names<'a, I>(names: I) -> Vec<Box<str>>
where
    I: IntoIterator<Item = &'a FixedName>,
{
    names
        .into_iter()
        .map(|x| x.as_str().to_string().into_boxed_str())
        .collect()
}

impl HierarchicalStore for Hdf5Store {
    fn create_group(&mut self, path: &str) -> anyhow::Result<()> {
        self.backend.create_group(path)?;
        Ok(())
    }

    fn write_dataset(
        &mut self,
        path: &str,
        data: &Dataset,
        compression: Option<u8>,
    ) -> anyhow::Result<()> {
        match data {
            Dataset::Matrix(x) => {
                let (nrow, ncol) = x.dim();
                let x = x.as_standard_layout();
                let mut builder = self.backend.new_dataset::<f64>().shape([nrow, ncol]);
                if let Some(level) = compression.filter(|_| nrow * ncol > 0) {
                    builder = builder.chunk([chunk_rows(nrow, ncol), ncol]).deflate(level);
                }
                builder.create(path)?.write(&x)?;
            }
            Dataset::Vector(x) => {
                let mut builder = self.backend.new_dataset::<f64>().shape([x.len()]);
                if let Some(level) = compression.filter(|_| !x.is_empty()) {
                    builder = builder.chunk([chunk_size(x.len())]).deflate(level);
                }
                builder.create(path)?.write(x)?;
            }
            Dataset::Integers(x) => {
                let mut builder = self.backend.new_dataset::<i64>().shape([x.len()]);
                if let Some(level) = compression.filter(|_| !x.is_empty()) {
                    builder = builder.chunk([chunk_size(x.len())]).deflate(level);
                }
                builder.create(path)?.write(x)?;
            }
            Dataset::Names(x) => {
                let names = to_fixed_names(x)?;
                self.backend
                    .new_dataset::<FixedName>()
                    .shape([names.len()])
                    .create(path)?
                    .write(&names)?;
            }
            Dataset::Label(x) => {
                let label = to_fixed_names(std::slice::from_ref(x))?;
                self.backend
                    .new_dataset::<FixedName>()
                    .shape(())
                    .create(path)?
                    .write_scalar(&label[0])?;
            }
        }
        Ok(())
    }

    fn write_names_attr(&mut self, path: &str, names: &[Box<str>]) -> anyhow::Result<()> {
        let names = to_fixed_names(names)?;
        if let Ok(ds) = self.backend.dataset(path) {
            ds.new_attr::<FixedName>()
                .shape([names.len()])
                .create("names")?
                .write(&names)?;
        } else {
            let group = self.backend.group(path)?;
            group
                .new_attr::<FixedName>()
                .shape([names.len()])
                .create("names")?
                .write(&names)?;
        }
        Ok(())
    }
}

fn read_names_attr(loc: &hdf5::Location) -> Option<Vec<Box<str>>> {
    let names = loc.attr("names").ok()?.read_1d::<FixedName>().ok()?;
    Some(from_fixed_names(names.iter()))
}

fn read_dataset(ds: &hdf5::Dataset) -> anyhow::Result<Dataset> {
    let desc = ds.dtype()?.to_descriptor()?;
    let ndim = ds.ndim();

    let ret = match (desc, ndim) {
        (TypeDescriptor::Float(_), 2) => Dataset::Matrix(ds.read_2d::<f64>()?),
        (TypeDescriptor::Float(_), 1) => Dataset::Vector(ds.read_1d::<f64>()?),
        (TypeDescriptor::Float(_), 0) => Dataset::Vector(arr1(&[ds.read_scalar::<f64>()?])),
        (TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_), 1) => {
            Dataset::Integers(ds.read_1d::<i64>()?)
        }
        (TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_), 0) => {
            Dataset::Integers(Array1::from_elem(1, ds.read_scalar::<i64>()?))
        }
        (TypeDescriptor::FixedAscii(_), 0) => {
            Dataset::Label(ds.read_scalar::<FixedName>()?.as_str().into())
        }
        (TypeDescriptor::FixedAscii(_), 1) => {
            Dataset::Names(from_fixed_names(ds.read_1d::<FixedName>()?.iter()))
        }
        (desc, ndim) => {
            anyhow::bail!("unsupported dataset {:?} with {} dimensions", desc, ndim)
        }
    };
    Ok(ret)
}

fn load_group(group: &hdf5::Group, prefix: &str, out: &mut MemoryStore) -> anyhow::Result<()> {
    for member in group.member_names()? {
        let path = join_path(prefix, &member);

        if let Ok(subgroup) = group.group(&member) {
            out.create_group(&path)?;
            load_group(&subgroup, &path, out)?;
            if let Some(names) = read_names_attr(&subgroup) {
                out.write_names_attr(&path, &names)?;
            }
        } else {
            let ds = group.dataset(&member)?;
            out.write_dataset(&path, &read_dataset(&ds)?, None)?;
            if let Some(names) = read_names_attr(&ds) {
                out.write_names_attr(&path, &names)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_bounded() {
        assert_eq!(chunk_size(100), 100);
        assert_eq!(chunk_size(10_000_000), 10_000);
        assert_eq!(chunk_rows(5, 3), 5);

        let (nrow, ncol) = (1_000_000, 1_000);
        let rows = chunk_rows(nrow, ncol);
        assert_eq!(rows, 1_000);
        assert!(rows * ncol <= chunk_size(nrow * ncol));

        assert_eq!(chunk_rows(2, 100_000), 1);
    }

    #[test]
    fn long_names_are_truncated() -> anyhow::Result<()> {
        let long: Box<str> = "x".repeat(NAME_WIDTH + 10).into();
        let names = to_fixed_names(&[long, "short".into()])?;
        assert_eq!(names[0].as_str().len(), NAME_WIDTH);
        assert_eq!(names[1].as_str(), "short");
        Ok(())
    }
}

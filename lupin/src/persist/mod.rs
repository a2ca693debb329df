pub mod hdf5_store; // HDF5 backend of the persisted tree
pub mod layout; // group partition and block orientation
pub mod reader; // reading a persisted model back
pub mod save_model; // model writer
pub mod store; // hierarchical store trait and in-memory tree

pub use hdf5_store::Hdf5Store;
pub use layout::GroupPartition;
pub use reader::PersistedModel;
pub use save_model::{save_model, DimNames, ModelWriter, NodeSelection, SaveInputs, SaveOptions};
pub use store::{Dataset, HierarchicalStore, MemoryStore};

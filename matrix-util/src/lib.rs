pub mod common_io; // reading and writing text files
pub mod ndarray_util; // `ndarray` implementations of the traits
pub mod traits; // matrix operation traits

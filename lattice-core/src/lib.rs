pub mod binning;
pub mod bins;
pub mod data_array;
pub mod dataset;
pub mod dict;
pub mod error;
pub mod ops;
pub mod sizes;
pub mod variable;

pub use bins::{Bins, BinsConstituents};
pub use data_array::DataArray;
pub use dataset::Dataset;
pub use dict::Dict;
pub use error::LatticeCoreError;
pub use sizes::Sizes;
pub use variable::{DType, Variable, VariableData};

pub mod error;
pub mod masking;
pub mod overwrite;
pub mod remap;

pub use error::LatticeBinsError;
pub use masking::hide_masked_and_reduce_meta;
pub use overwrite::CopyForOverwrite;
pub use remap::{combine_bins, combine_bins_by_binning, concat_bins, concat_bins_data_array};

pub mod coord_table;
pub mod dims;
pub mod error;
pub mod graph;
pub mod options;
pub mod rule;
pub mod transform;

pub use coord_table::{Coord, CoordTable, Destination, Usages};
pub use error::LatticeTransformError;
pub use graph::{rule_sequence, show_graph, Graph, GraphDict, Producer, Products};
pub use options::TransformOptions;
pub use rule::{Args, ComputeFn, FunctionOutput, Rule, Signature};
pub use transform::{transform_coords, TransformCoords};

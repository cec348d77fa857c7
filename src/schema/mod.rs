pub mod core;
pub mod descriptor;
pub mod registry;

pub use descriptor::{AttributeDescriptor, DataType, ResourceDescriptor};
pub use registry::{Schema, SchemaRegistry};

//! Schema Registry (spec.md §4.2).

pub mod descriptor;
pub mod errors;
pub mod mapper;
pub mod registry;

pub use descriptor::{
    EntityDescriptor, ForeignKeyDescriptor, IndexDescriptor, KeyPart, LiteralKeyPart,
    NavigationDescriptor, NavigationKind, PropertyDescriptor, ReferentialAction,
};
pub use mapper::ValueMapper;
pub use registry::{PathJoin, ResolvedPath, SchemaRegistry};

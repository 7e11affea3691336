//! Import schema: the field tree and the descriptors attached to its keys.

pub mod descriptor;
pub mod tree;

pub use descriptor::{Descriptors, FieldDescriptor, TransformFn};
pub use tree::{lookup, unflatten, FieldNode, FieldPath, FieldTree};

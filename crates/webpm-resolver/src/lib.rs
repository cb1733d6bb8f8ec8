//! Dependency graph resolver (spec §4.7/§4.8): version selection and the
//! recursive, memoized, cycle-safe build of a `DependencyNode` DAG from a
//! single root specifier.

pub mod dependency_node;
pub mod resolve;
pub mod version_picker;

pub use dependency_node::{resolution_id, ChildNode, DependencyEdge, DependencyNode, ResolutionId};
pub use resolve::{ResolveOptions, ResolverState, resolve_tree};
pub use version_picker::{pick_version, PickOptions};

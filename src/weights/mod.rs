//! Named parameter containers and the tolerant restore policy.

mod loader;
mod named;
mod store;

pub use loader::{LoadReport, ModelState, ShapeMismatch, restore};
pub use named::{NamedParameters, join};
pub use store::{ParameterStore, StoredTensor};

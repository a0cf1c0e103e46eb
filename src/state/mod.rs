//! Hub execution state: the persisted document and the store that owns it.

mod model;
mod store;

pub use model::*;
pub use store::StateStore;

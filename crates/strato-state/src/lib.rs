// strato-state: persisted cluster state
//
// One JSON document per cluster, behind the `StateStore` contract.
// `FileStore` is the production backend; `MemoryStore` backs tests and
// any embedding that wants to supply state without touching disk.

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{StateError, StateStore};

//! Node lifecycle: data directory setup, daemon spawning, and per-node handles.

pub mod datadir;
pub mod handle;
pub mod supervisor;

pub use datadir::prepare_datadir;
pub use handle::{AttachedNode, NodeHandle};
pub use supervisor::NodeSupervisor;

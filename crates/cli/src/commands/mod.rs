pub mod nodes;
pub mod rpc;
pub mod utils;

pub use nodes::UpOptions;

pub mod consumer;
pub mod registry;

pub use consumer::*;
pub use registry::*;

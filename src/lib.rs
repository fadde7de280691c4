mod batcher;
mod config;
mod crop;
mod dataset;
mod error;
mod experiment;
mod registry;
mod source;
mod utils;

pub use batcher::*;
pub use config::*;
pub use crop::*;
pub use dataset::*;
pub use error::*;
pub use experiment::*;
pub use registry::*;
pub use source::*;
pub use utils::*;

pub type Float = f32;

pub mod address;
pub mod cache;
pub mod index;
pub mod options;
pub mod synth;

pub use address::*;
pub use cache::*;
pub use index::*;
pub use options::*;
pub use synth::*;

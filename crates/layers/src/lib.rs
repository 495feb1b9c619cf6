pub mod backend;
pub mod layer;
pub mod page;
pub mod symbology;

pub use backend::*;
pub use layer::*;
pub use page::*;
pub use symbology::*;

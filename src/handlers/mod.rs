pub mod calls;
pub mod voice;

pub use calls::*;
pub use voice::*;

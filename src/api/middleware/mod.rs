pub mod security;
pub mod trace;

pub use security::*;
pub use trace::*;

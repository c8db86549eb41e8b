//! Parley ABI crate: stable contracts shared by the session core and inference backends.

pub mod backend;
pub mod batch;
pub mod error;
pub mod handle;
pub mod params;
pub mod token;

pub use backend::*;
pub use batch::*;
pub use error::*;
pub use handle::*;
pub use params::*;
pub use token::*;

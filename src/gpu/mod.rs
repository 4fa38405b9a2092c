pub mod types;
pub mod init;
pub mod info;
pub mod copy;
pub mod device;
pub mod effect;
mod readback;

#[cfg(test)]
pub mod mock;

// Re-export main types and structs for convenience
pub use types::*;
pub use init::*;
pub use info::*;
pub use effect::MorphologicalAa;

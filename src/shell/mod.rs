//! Frame-loop drivers that own the device and feed events to the harness.

pub mod headless;
pub mod window;

/// Window title shown while the overlay is hidden.
pub const TITLE: &str = "SMAA harness";

pub mod benchmark;
pub mod effect;
pub mod errors;
pub mod gpu;
pub mod harness;
pub mod image_loader;
pub mod logging;
pub mod pipeline;
pub mod profiler;
pub mod settings;
pub mod shell;
pub mod surface;


pub use errors::{GpuError, HarnessError, LoadError, Result};
pub use harness::{Command, Event, Harness, ShellRequest};

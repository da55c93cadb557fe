//! Supervision of the external engine process
//!
//! Start an executable with arguments and a working directory, observe it
//! without blocking, and stop it gracefully with a forced kill as the
//! fallback.

pub mod error;
pub mod output;
pub mod platform;
pub mod process;

// Re-export commonly used types
pub use error::{SupervisorError, SupervisorResult};
pub use output::OutputMode;
pub use process::Process;

//! Root of the `kalite-core` library.

// Prevent accidental direct writes to stdout/stderr in library code. The
// identity prompt writes through explicit handles; everything else goes
// through the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod dispatch;
pub mod error;
mod exit_status;
pub mod identity;
mod launcher;
pub mod resolve;
mod spawn;

pub use config::LaunchConfig;
pub use dispatch::Dispatch;
pub use dispatch::EntryPoint;
pub use dispatch::HostEntryPoint;
pub use error::LaunchError;
pub use identity::Confirm;
pub use identity::StdinConfirm;
pub use launcher::LaunchOutcome;
pub use launcher::Launcher;
pub use resolve::SystemToolchain;
pub use resolve::Toolchain;

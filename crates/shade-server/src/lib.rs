//! Server-side roles of the shade tunnel.
//!
//! Three entry points, all driven by the same decrypt-and-greet front:
//! [`run`] is the remote terminator (cascade cache included),
//! [`run_jumper`] a cascading intermediate hop, and [`run_reverse`] the
//! far-side claimant that serves targets only it can reach.

mod cache;
pub mod cli;
mod error;
mod jumper;
mod remote;
mod reverse;
mod wire;

pub use cli::{JumperArgs, ReverseArgs, ServerArgs};
pub use error::ServerError;
pub use jumper::run_jumper;
pub use remote::run;
pub use reverse::run_reverse;
pub use tokio_util::sync::CancellationToken;

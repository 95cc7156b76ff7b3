//! # Modhost Kernel
//!
//! Application bootstrapping and the pieces every subsystem shares.
//!
//! - **[`Application`](bootstrap::Application)**: owns the configured
//!   components and drives their lifecycle.
//! - **[`KernelComponent`](component::KernelComponent)**: the initialize,
//!   start, stop contract.
//! - **`constants`**: names and versions the host exposes.
//! - **[`Error`](error::Error)**: the crate-wide error type and `Result` alias.
pub mod bootstrap;
pub mod component;
pub mod constants;
pub mod error;

pub use bootstrap::Application;
pub use component::KernelComponent;
pub use error::{Error, Result};

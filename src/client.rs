//! Client facade over the resilient transport.
//!
//! Keep the public surface small: generic requests against an endpoint path,
//! returning either a buffered JSON body or a line stream.

pub mod builder;
pub mod core;
pub mod types;

pub use builder::{ClientBuilder, ClientConfig};
pub use core::Client;
pub use types::{ResponseMode, RunResponse, RunStream};

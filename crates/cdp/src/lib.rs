//! Chromium-backed implementation of the automation seam.
//!
//! Launches a Chromium process per execution context, discovers its DevTools
//! endpoint, and drives the page over the DevTools protocol: pre-navigation
//! script installation, navigation, evaluation with promise awaiting, and a
//! console event stream.

mod chromium;
mod connection;
mod error;
mod transport;

pub use chromium::Chromium;
pub use connection::{CdpEvent, Connection};
pub use error::CdpError;

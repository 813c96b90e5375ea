//! Command-line entrypoints for the gateway controller.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use gateway_controller_core as core;
pub use gateway_controller_jwks as jwks;
pub use gateway_controller_xds as xds;

mod args;
mod duration;
mod log;
mod lookup;
mod translate;

pub use self::{args::Args, duration::GoDuration};

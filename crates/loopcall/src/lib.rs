#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod client;
mod codec;
mod context;
mod dispatch;
mod error;
mod pipe;
mod registry;
mod transport;
mod wire;

pub use client::*;
pub use codec::*;
pub use context::*;
pub use dispatch::*;
pub use error::*;
pub use pipe::*;
pub use registry::*;
pub use transport::*;
pub use wire::*;

#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod fmt;

pub mod a2dp;
pub mod constants;

pub use a2dp::A2dpError;
pub use a2dp::registry::{CodecRegistry, RegistryOptions};

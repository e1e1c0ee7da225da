#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
pub mod bulk;
pub mod codec;
pub mod error;
pub mod listener;
pub mod pool;

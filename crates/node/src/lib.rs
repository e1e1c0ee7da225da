#![doc = include_str!("../README.md")]
pub mod error;
pub mod logging;
pub mod native;
pub mod processor;
pub mod registry;
mod rpc_impl;
#[cfg(test)]
mod tests;
pub mod util;

pub use rpc_impl::RpcHandler;

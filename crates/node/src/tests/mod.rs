pub mod native;

pub use native::prepare_processor;

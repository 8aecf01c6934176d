pub mod builder;
pub mod defaults;
pub mod encoder;
pub(crate) mod model_runtime;
pub mod rescoring;
pub mod scorer;
pub mod traits;

//! Inference backends and the model lifecycle.

mod backend;
mod backends;
mod model;
mod result;

pub use backend::InferenceBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use model::{ModelHandle, ModelStatus};
pub use result::{Detection, ObjectClass};

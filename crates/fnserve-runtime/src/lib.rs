pub mod error;
pub mod runtime;
pub mod supervisor;

pub use error::InvokeError;
pub use runtime::{create_runtime, runtime_for_path, Runtime, RuntimeConfig, RuntimeKind};

pub mod bind;
pub mod error;
pub mod types;

pub use bind::bind_parameters;
pub use error::{FailureKind, ScriptError, TraceFrame};
pub use types::*;

pub mod error;
pub mod types;

pub use error::{ErrorKind, ReportedError};
pub use types::*;

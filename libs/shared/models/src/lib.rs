pub mod error;
pub mod schedule;

pub use error::AppError;
pub use schedule::*;

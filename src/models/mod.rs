// Re-export all model types
pub use self::errors::*;
pub use self::order::*;

mod errors;
mod order;

pub mod types;
pub mod error;
pub mod utils;

pub use types::*;
pub use error::*;
pub use utils::*;

//! XML helpers shared by the dialect adapters.

mod utils;

pub use utils::*;

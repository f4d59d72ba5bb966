//! Command implementations.

mod ship;
mod validate;

pub use ship::run_ship;
pub use validate::run_validate;

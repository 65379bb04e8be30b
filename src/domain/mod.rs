pub mod grid;
pub mod inverter;

pub use grid::*;
pub use inverter::*;

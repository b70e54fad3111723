pub mod book;
pub mod sort;

pub use book::*;
pub use sort::*;

pub mod create_renditions;

pub use create_renditions::*;

pub mod hash;
pub mod lines;
pub mod log;

pub mod probe;
pub mod refresh;

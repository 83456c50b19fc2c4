pub mod posting;
pub mod term;
pub mod merge;
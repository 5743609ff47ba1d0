pub mod probe;
pub mod prune;
pub mod resolve;
pub mod serve;

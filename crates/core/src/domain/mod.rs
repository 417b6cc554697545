pub mod market;
pub mod position;
pub mod recommendation;

pub mod dataset;
pub mod inference;
pub mod video;

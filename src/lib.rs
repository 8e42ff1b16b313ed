pub mod checkpoint;
pub mod config;
pub mod orchestration;
pub mod plan;
pub mod recovery;
pub mod shared;

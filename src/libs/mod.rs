pub mod coordinator;
pub mod error;
pub mod genome;
pub mod job;
pub mod merge;
pub mod pipeline;
pub mod region;
pub mod tools;

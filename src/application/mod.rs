//! Application services: the compute protocol, item handling and background jobs.

pub mod compute;
pub mod error;
pub mod items;
pub mod jobs;
pub mod repos;

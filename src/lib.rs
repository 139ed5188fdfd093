//! itemforge: item records with image uploads, plus a compute-then-cache
//! protocol where clients poll a cache while background workers fill it.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

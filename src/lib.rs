//! Circles: forms small peer groups of dads by city, state, and child life stage.

pub mod config;
pub mod error;
pub mod matching;
pub mod notify;
pub mod store;

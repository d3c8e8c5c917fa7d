//! CLI Commands

pub mod setup;
pub mod users;

//! Seedbed CLI
//!
//! Operator commands for the local Supabase stack and for test users that
//! outlived the run that created them.

pub mod commands;
pub mod context;
pub mod output;

//! A3S Image CLI - inspect and import disk images.

pub mod commands;
pub mod output;

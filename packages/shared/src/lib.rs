//! Utilities shared by the Stoop packages.

pub mod logger;
pub mod time;

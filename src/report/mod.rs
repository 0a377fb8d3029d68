//! The operations offered on the command line.
pub mod build;
pub mod lookup;

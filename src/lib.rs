#[macro_use]
extern crate tracing;

pub mod cli;
pub mod layout;
pub mod settings;
pub mod trace;
pub mod utils;

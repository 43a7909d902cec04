#![allow(dead_code)]

pub mod handlers;
pub mod harness;
pub mod strategies;

pub use handlers::*;
pub use harness::*;

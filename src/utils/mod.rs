//! Utils module - logging setup and text helpers

pub mod logging;
pub mod string;

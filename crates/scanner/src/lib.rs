#![allow(clippy::collapsible_if, clippy::manual_range_contains)]
pub mod parser;
pub mod subtitles;
pub mod walk;

pub use parser::parse;

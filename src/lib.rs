pub mod aggregate;
pub mod artifact;
pub mod checkpoint;
pub mod cli;
pub mod compare;
pub mod config;
pub mod judge;
pub mod manifest;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod util;

pub mod aws;
pub mod backend;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod schedule;
pub mod sink;

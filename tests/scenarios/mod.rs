//! Scenario-based tests for regpipe

mod caching;
mod failure_handling;
mod parameter_files;
mod single_step;
mod success_chain;
mod transforms;

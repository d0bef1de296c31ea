// src/lib.rs — Library root for funsearch

pub mod cli;
pub mod core;
pub mod database;
pub mod evaluator;
pub mod infra;
pub mod profiler;
pub mod program;
pub mod provider;
pub mod sampler;

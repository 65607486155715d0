//! blockmark - stable block identity migration
//!
//! Assigns a persistent `stableId` attribute to every block in stored
//! block-markup documents and moves annotations keyed by legacy block
//! addresses onto those ids, one document at a time, without touching
//! anything else in the content.

pub mod annotation;
pub mod api;
pub mod assigner;
pub mod block;
pub mod cli;
pub mod config;
pub mod crash_point;
pub mod errors;
pub mod http_server;
pub mod observability;
pub mod orchestrator;
pub mod rewriter;
pub mod scanner;
pub mod store;

//! Sauna Daemon - sensor acquisition, storage and status evaluation
//!
//! Tasks: acquisition -> channel -> store writer; evaluation loop over the
//! store; retention pruning. They share the store and a shutdown signal and
//! nothing else.

pub mod acquisition;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod retention;
pub mod retry;
pub mod shutdown;

//! Caption pipeline: media in, polished and translated WebVTT/SRT tracks out.
//!
//! Jobs are queued through [`queue::CaptionService`], run one at a time by [`pipeline::Pipeline`]
//! and checkpointed in [`store::JobStore`] so resubmitted jobs resume where they stopped.

pub mod artifact;
pub mod batch;
pub mod cap;
pub mod cli;
pub mod config;
pub mod job;
pub mod language;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod segment;
pub mod serve;
pub mod server;
pub mod store;
pub mod subtitle;

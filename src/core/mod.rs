//! Core engine: decoder, pipeline, sink, buffers and the sync machine.

pub mod buffer;
pub mod decoder;
pub mod indexer;
pub mod pipeline;
pub mod sink;
pub mod sync;

//! Artifact export
//!
//! Turns a trained checkpoint into a flat, self-describing inference
//! graph that external runtimes can replay, and verifies the artifact
//! against the source model before it ships.

mod graph;

pub use graph::{export_graph, GraphOp, InferenceGraph};

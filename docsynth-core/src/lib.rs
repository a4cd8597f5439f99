#![doc = "docsynth-core: core logic library for docsynth."]

//! This crate turns loosely formatted generated text into stored word-processing documents.
//! It holds the markup parser, the document model, the `.docx` codec, the tiered persistence
//! orchestrator and container/document discovery. Network clients are not part of it; they
//! implement the traits in [`contract`] from the CLI crate.
//!
//! # Usage
//! Build a [`synthesise::DocumentSynthesizer`] from a [`config::SynthesisConfig`] and the
//! collaborators, then call `synthesize_and_store` or `generate_document`.

pub mod codec;
pub mod config;
pub mod contract;
pub mod discovery;
pub mod markup;
pub mod model;
pub mod persist;
pub mod synthesise;

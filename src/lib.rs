//! Colored de Bruijn graph engine for structural variant breakpoint
//! discovery from short-read sequencing data.
//!
//! The crate is organised in layers: `kmer` holds the 2-bit sequence
//! codecs, `graph` the concurrent hash table and colored graph overlay,
//! `paths` the link (junction-choice) store used to resolve branches,
//! `traverse` the walkers and the multi-color graph crawler, and `calls`
//! the reference k-mer index plus the parallel breakpoint caller.

pub mod calls;
pub mod cli;
pub mod error;
pub mod graph;
pub mod kmer;
pub mod paths;
pub mod traverse;

pub use error::EngineError;

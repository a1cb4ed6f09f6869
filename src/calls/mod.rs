pub mod breakpoint_caller;
pub mod json_header;
pub mod kmer_occur;

pub use breakpoint_caller::{call_breakpoints, BreakpointOpts, CallStats};
pub use kmer_occur::{KOGraph, KOccur, KOccurRun};

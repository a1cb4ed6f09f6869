use std::path::PathBuf;
use thiserror::Error;

/// Fatal error kinds raised by the engine. Per-record rejections during
/// calling (unanchored flanks etc.) are counted in summary statistics
/// instead of surfacing here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed header in {path}: {reason}")]
    MalformedHeader { path: PathBuf, reason: String },

    #[error("unsupported kmer size {kmer_size}: must be odd, in {min}..={max}")]
    UnsupportedKmerSize {
        kmer_size: usize,
        min: usize,
        max: usize,
    },

    #[error("hash table is full ({occupancy}/{capacity} occupied); increase --nkmers")]
    TableFull { occupancy: usize, capacity: usize },

    #[error("out of link memory ({used}/{capacity} arena bytes used)")]
    OutOfPathMemory { used: usize, capacity: usize },

    #[error("link file uses color {color} but graph only has {num_cols} colors")]
    InconsistentColors { color: usize, num_cols: usize },

    #[error("contig '{chrom}' listed in input header but not in loaded reference")]
    RefChromMismatch { chrom: String },
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EngineError::MalformedHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub mod binary_kmer;
pub mod nuc;
pub mod packed_seq;

pub use binary_kmer::{BinaryKmer, Orient, MAX_KMER_SIZE, MIN_KMER_SIZE};
pub use nuc::Nuc;

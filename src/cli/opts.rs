use clap::{value_parser, ArgAction, Args};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct GraphArgs {
    /// Input binary graph file [path]
    #[clap(
        short = 'g',
        long,
        value_parser,
        required = true,
        help_heading = "Core"
    )]
    pub graph: PathBuf,

    /// Link file(s) to load, may be repeated [path]
    #[clap(short = 'p', long = "paths", value_parser, num_args = 1.., action = ArgAction::Append, help_heading = "Core")]
    pub links: Vec<PathBuf>,

    /// Number of threads to use [integer]
    #[clap(short = 't', long, default_value = "1", help_heading = "Core")]
    pub n_threads: usize,

    /// Extra hash table headroom in kmers on top of the graph file and
    /// reference [integer]
    #[clap(long, default_value = "0", help_heading = "Memory")]
    pub extra_nkmers: usize,

    /// Link arena size in bytes [integer]
    #[clap(long, default_value = "67108864", help_heading = "Memory")]
    pub path_memory: usize,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Minimum number of reference kmers to anchor a flank [integer]
    #[clap(long, default_value = "10", value_parser = value_parser!(u32).range(1..), help_heading = "Calling")]
    pub min_ref_nkmers: u32,

    /// Crawl step budget per path [integer]
    #[clap(long, default_value = "1000", value_parser = value_parser!(u32).range(1..), help_heading = "Calling")]
    pub max_ref_nkmers: u32,
}

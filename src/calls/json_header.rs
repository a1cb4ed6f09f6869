//! JSON header written before breakpoint records, followed by a block of
//! `#` comment lines describing the run-list syntax.

use std::io::{self, Write};
use std::path::Path;

use serde_json::json;

use crate::calls::kmer_occur::KOGraph;
use crate::graph::db_graph::DbGraph;

pub const BREAKPOINTS_FORMAT: &str = "CtxBreakpoints";
pub const BREAKPOINTS_FORMAT_VERSION: u64 = 2;

const FORMAT_COMMENT: &str = "\
# This file was generated with svbreak
#
# Comment lines begin with a # and are ignored, but must come after the header
# Format is:
#   chr=seq:start-end:strand:offset
#   all coordinates are 1-based
#   <strand> is + or -. If +, start <= end otherwise start >= end.
#   <offset> is the position in the sequence where ref starts agreeing
";

pub fn breakpoints_header_json(
    graph: &DbGraph,
    sample_names: &[String],
    ref_paths: &[impl AsRef<Path>],
    kograph: &KOGraph,
    commands: &[String],
) -> serde_json::Value {
    let colors: Vec<_> = sample_names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({"colour": i, "sample": name}))
        .collect();
    // absolute paths where resolvable
    let ref_files: Vec<String> = ref_paths
        .iter()
        .map(|p| {
            let p = p.as_ref();
            std::fs::canonicalize(p)
                .unwrap_or_else(|_| p.to_path_buf())
                .display()
                .to_string()
        })
        .collect();
    let contigs: Vec<_> = kograph
        .chrom_names
        .iter()
        .zip(&kograph.chrom_lengths)
        .map(|(name, &len)| json!({"id": name, "length": len}))
        .collect();
    json!({
        "file_format": BREAKPOINTS_FORMAT,
        "format_version": BREAKPOINTS_FORMAT_VERSION,
        "kmer_size": graph.kmer_size,
        "num_of_cols": graph.num_cols,
        "colors": colors,
        "commands": commands,
        "breakpoints": {
            "ref_files": ref_files,
            "contigs": contigs,
        },
    })
}

pub fn write_breakpoints_header(w: &mut impl Write, header: &serde_json::Value) -> io::Result<()> {
    let pretty = serde_json::to_string_pretty(header)?;
    w.write_all(pretty.as_bytes())?;
    w.write_all(b"\n\n")?;
    w.write_all(FORMAT_COMMENT.as_bytes())?;
    w.write_all(b"\n")
}

//! Link file (ctp) save and load. A JSON header object is followed by a
//! `#` comment block, then for each k-mer with links a line
//! `<KMER> <npaths>` and one line per link:
//! `<F|R> <nkmers> <njuncs> <nseen0,nseen1,...> <ACGT-string>`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use serde::Serialize;
use serde_json::json;

use crate::error::EngineError;
use crate::graph::db_graph::{DbGraph, DbNode};
use crate::graph::hash_table::HKey;
use crate::kmer::binary_kmer::{BinaryKmer, Orient};
use crate::kmer::packed_seq;
use crate::paths::gpath::GPath;
use crate::paths::gpath_hash::GPathHash;
use crate::paths::gpath_store::GPathStore;
use crate::paths::threading::ContigHists;

pub const CTP_FORMAT: &str = "ctp";
pub const CTP_FORMAT_VERSION: u64 = 3;

const CTP_COMMENT: &str = "\
# This file was generated with svbreak
#
# Comment lines begin with a # and are ignored, but must come after the header
# Format is:
#   [kmer] [num_paths] ...(ignored)
#   [FR] [num_kmers] [num_juncs] [counts0,counts1,...] [juncs:ACAGT] ...(ignored)
";

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

fn open_writer(path: &Path) -> Result<Box<dyn Write>, EngineError> {
    let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
    Ok(if is_gz(path) {
        Box::new(GzEncoder::new(BufWriter::new(file), Compression::default()))
    } else {
        Box::new(BufWriter::new(file))
    })
}

fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    Ok(if is_gz(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Box::new(BufReader::new(file))
    })
}

/* ---------------------------------------------------------------------- */
/*  save                                                                  */
/* ---------------------------------------------------------------------- */

#[derive(Serialize)]
struct ColorJson {
    colour: usize,
    sample: String,
}

#[derive(Serialize)]
struct HistJson {
    lengths: Vec<usize>,
    counts: Vec<u64>,
}

pub fn links_header_json(
    graph: &DbGraph,
    store: &GPathStore,
    sample_names: &[String],
    hists: &ContigHists,
) -> serde_json::Value {
    let colors: Vec<ColorJson> = sample_names
        .iter()
        .enumerate()
        .map(|(i, name)| ColorJson {
            colour: i,
            sample: name.clone(),
        })
        .collect();
    let json_hists: Vec<HistJson> = (0..hists.ncols())
        .map(|c| {
            let entries = hists.entries(c);
            HistJson {
                lengths: entries.iter().map(|&(l, _)| l).collect(),
                counts: entries.iter().map(|&(_, n)| n).collect(),
            }
        })
        .collect();
    json!({
        "file_format": CTP_FORMAT,
        "format_version": CTP_FORMAT_VERSION,
        "kmer_size": graph.kmer_size,
        "num_of_cols": store.ncols,
        "colors": colors,
        "paths": {
            "num_kmers_with_paths": store.num_kmers_with_paths(),
            "num_paths": store.num_paths(),
            "path_bytes": store.path_bytes(),
            "contig_hists": json_hists,
        },
    })
}

/// Trace a link through the graph, returning the node path and the node
/// index of every junction. Used for the optional `seq=`/`juncpos=`
/// annotations.
fn trace_link_nodes(
    graph: &DbGraph,
    store: &GPathStore,
    hkey: HKey,
    path: &GPath,
) -> Option<(Vec<DbNode>, Vec<usize>)> {
    let mut node = DbNode::new(hkey, path.orient);
    let mut nodes = vec![node];
    let mut juncpos = Vec::with_capacity(path.num_juncs);
    let mut plen = 0;
    while plen < path.num_juncs {
        let mut edges = crate::graph::edges::Edges::default();
        for col in 0..store.ncols {
            if store.colset_has(path, col) {
                edges = edges.union(graph.edges(node.key, col));
            }
        }
        let nexts = graph.next_nodes(node, edges);
        node = match nexts.len() {
            0 => return None,
            1 => nexts[0].0,
            _ => {
                juncpos.push(nodes.len() - 1);
                let want = path.junc(plen);
                plen += 1;
                nexts.iter().find(|(_, nuc)| *nuc == want)?.0
            }
        };
        nodes.push(node);
    }
    Some((nodes, juncpos))
}

/// Write all links. Within a k-mer, links are sorted for deterministic
/// output. `save_seq` adds the traced `seq=`/`juncpos=` annotations.
pub fn save_links(
    graph: &DbGraph,
    store: &GPathStore,
    path: &Path,
    save_seq: bool,
    sample_names: &[String],
    hists: &ContigHists,
) -> Result<(), EngineError> {
    let mut w = open_writer(path)?;
    let io_err = |e| EngineError::io(path, e);

    let hdr = links_header_json(graph, store, sample_names, hists);
    serde_json::to_writer_pretty(&mut w, &hdr).map_err(|e| {
        EngineError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e))
    })?;
    w.write_all(b"\n\n").map_err(io_err)?;
    w.write_all(CTP_COMMENT.as_bytes()).map_err(io_err)?;
    w.write_all(b"\n").map_err(io_err)?;

    for hkey in graph.ht.iter() {
        let mut links: Vec<GPath> = store.links(hkey).collect();
        if links.is_empty() {
            continue;
        }
        links.sort_by(|a, b| {
            (a.orient.idx(), a.num_juncs, &a.seq).cmp(&(b.orient.idx(), b.num_juncs, &b.seq))
        });

        let kstr = graph.ht.bkmer(hkey).to_string(graph.kmer_size);
        writeln!(w, "{} {}", kstr, links.len()).map_err(io_err)?;
        for link in &links {
            let nseen: Vec<String> = (0..store.ncols)
                .map(|c| store.nseen(link, c).to_string())
                .collect();
            write!(
                w,
                "{} {} {} {} {}",
                link.orient.symbol(),
                link.num_kmers,
                link.num_juncs,
                nseen.join(","),
                link.juncs_string()
            )
            .map_err(io_err)?;
            if save_seq {
                if let Some((nodes, juncpos)) = trace_link_nodes(graph, store, hkey, link) {
                    let jp: Vec<String> = juncpos.iter().map(|p| p.to_string()).collect();
                    write!(w, " seq={} juncpos={}", graph.nodes_to_string(&nodes), jp.join(","))
                        .map_err(io_err)?;
                }
            }
            w.write_all(b"\n").map_err(io_err)?;
        }
    }
    w.flush().map_err(io_err)?;
    info!(
        "[links] saved {} paths on {} kmers to {}",
        store.num_paths(),
        store.num_kmers_with_paths(),
        path.display()
    );
    Ok(())
}

/* ---------------------------------------------------------------------- */
/*  load                                                                  */
/* ---------------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct LinkLoadStats {
    pub kmers_with_links: u64,
    pub links_loaded: u64,
}

/// Consume the JSON header object from the stream: everything up to the
/// brace that closes the first `{`, tolerating braces inside strings.
fn read_json_header(r: &mut impl BufRead, path: &Path) -> Result<serde_json::Value, EngineError> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    let mut started = false;
    let mut byte = [0u8; 1];
    loop {
        let n = r.read(&mut byte).map_err(|e| EngineError::io(path, e))?;
        if n == 0 {
            return Err(EngineError::malformed(path, "EOF inside JSON header"));
        }
        let c = byte[0];
        if !started {
            if c.is_ascii_whitespace() {
                continue;
            }
            if c != b'{' {
                return Err(EngineError::malformed(path, "link file must start with a JSON header"));
            }
            started = true;
        }
        buf.push(c);
        if in_str {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if c == b'"' {
                in_str = false;
            }
            continue;
        }
        match c {
            b'"' => in_str = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    serde_json::from_slice(&buf)
        .map_err(|e| EngineError::malformed(path, format!("bad JSON header: {e}")))
}

/// Load a ctp file into the store, deduplicating through `gphash`.
/// K-mer size and colors are validated against the graph.
pub fn load_links(
    path: &Path,
    graph: &DbGraph,
    store: &GPathStore,
    gphash: &GPathHash,
) -> Result<LinkLoadStats, EngineError> {
    let mut r = open_reader(path)?;
    let hdr = read_json_header(&mut r, path)?;

    if hdr["file_format"].as_str() != Some(CTP_FORMAT) {
        return Err(EngineError::malformed(path, "file_format is not \"ctp\""));
    }
    if hdr["format_version"].as_u64() != Some(CTP_FORMAT_VERSION) {
        return Err(EngineError::malformed(
            path,
            format!("unsupported ctp format_version {}", hdr["format_version"]),
        ));
    }
    let file_k = hdr["kmer_size"].as_u64().unwrap_or(0) as usize;
    if file_k != graph.kmer_size {
        return Err(EngineError::malformed(
            path,
            format!("kmer size {} does not match graph kmer size {}", file_k, graph.kmer_size),
        ));
    }
    let file_cols = hdr["num_of_cols"].as_u64().unwrap_or(0) as usize;
    if file_cols > store.ncols {
        return Err(EngineError::InconsistentColors {
            color: file_cols.saturating_sub(1),
            num_cols: store.ncols,
        });
    }

    let mut stats = LinkLoadStats::default();
    let mut cur_kmer: Option<(HKey, usize)> = None; // (slot, links left)
    for line in r.lines() {
        let line = line.map_err(|e| EngineError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match cur_kmer {
            None => {
                let mut it = line.split_whitespace();
                let (Some(kstr), Some(nstr)) = (it.next(), it.next()) else {
                    return Err(EngineError::malformed(path, format!("bad kmer line: {line}")));
                };
                let bk = BinaryKmer::from_str(kstr, graph.kmer_size).ok_or_else(|| {
                    EngineError::malformed(path, format!("bad kmer '{kstr}'"))
                })?;
                let hkey = graph.find(&bk.canonical(graph.kmer_size)).ok_or_else(|| {
                    EngineError::malformed(path, format!("link kmer '{kstr}' is not in the graph"))
                })?;
                let n: usize = nstr.parse().map_err(|_| {
                    EngineError::malformed(path, format!("bad path count '{nstr}'"))
                })?;
                stats.kmers_with_links += 1;
                if n > 0 {
                    cur_kmer = Some((hkey, n));
                }
            }
            Some((hkey, left)) => {
                load_link_line(path, graph, store, gphash, hkey, line)?;
                stats.links_loaded += 1;
                cur_kmer = (left > 1).then_some((hkey, left - 1));
            }
        }
    }
    if cur_kmer.is_some() {
        return Err(EngineError::malformed(path, "truncated link block at EOF"));
    }
    info!(
        "[links] loaded {} links on {} kmers from {}",
        stats.links_loaded,
        stats.kmers_with_links,
        path.display()
    );
    Ok(stats)
}

fn load_link_line(
    path: &Path,
    graph: &DbGraph,
    store: &GPathStore,
    gphash: &GPathHash,
    hkey: HKey,
    line: &str,
) -> Result<(), EngineError> {
    let bad = |what: &str| EngineError::malformed(path, format!("{what} in link line: {line}"));

    let mut it = line.split_whitespace();
    let orient = match it.next() {
        Some("F") => Orient::Forward,
        Some("R") => Orient::Reverse,
        _ => return Err(bad("bad orientation")),
    };
    let num_kmers: usize = it.next().and_then(|s| s.parse().ok()).ok_or_else(|| bad("bad nkmers"))?;
    let num_juncs: usize = it.next().and_then(|s| s.parse().ok()).ok_or_else(|| bad("bad njuncs"))?;
    let nseen_str = it.next().ok_or_else(|| bad("missing nseen"))?;
    let seq_str = it.next().ok_or_else(|| bad("missing junction string"))?;

    if seq_str.len() != num_juncs || num_juncs == 0 || num_juncs > num_kmers {
        return Err(bad("inconsistent lengths"));
    }
    let nseen: Vec<u64> = nseen_str
        .split(',')
        .map(|s| s.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| bad("bad nseen counts"))?;
    if nseen.len() > store.ncols {
        return Err(EngineError::InconsistentColors {
            color: nseen.len() - 1,
            num_cols: store.ncols,
        });
    }
    let packed = packed_seq::from_str(seq_str).ok_or_else(|| bad("bad junction base"))?;

    for (col, &count) in nseen.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let (pindex, _) =
            store.find_or_add_mt(gphash, hkey, orient, num_kmers, num_juncs, &packed, col)?;
        let gp = store.path(pindex);
        store.set_nseen(&gp, col, count.min(u8::MAX as u64) as u8);
    }
    Ok(())
}

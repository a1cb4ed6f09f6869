use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use svbreak::calls::breakpoint_caller::{call_breakpoints, BreakpointOpts};
use svbreak::calls::json_header::{breakpoints_header_json, write_breakpoints_header};
use svbreak::calls::kmer_occur::KOGraph;
use svbreak::cli::fasta::read_fasta;
use svbreak::cli::opts::{CallArgs, GraphArgs};
use svbreak::graph::edges::Edges;
use svbreak::graph::io as graph_io;
use svbreak::kmer::nuc::{nuc_complement, nuc_to_char};
use svbreak::paths::{GPathHash, GPathStore};

/// Command-line interface for the breakpoint discovery engine
#[derive(Parser)]
#[command(
    name = "svbreak",
    about = "Structural variant breakpoint discovery on colored de Bruijn graphs",
    version = "0.1.0"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// View a binary graph file: header info, validity checks, kmers
    View {
        /// Input graph file [path]
        #[clap(value_parser)]
        graph: PathBuf,

        /// Print kmers [flag]
        #[clap(short = 'k', long)]
        kmers: bool,

        /// Check kmers [flag]
        #[clap(short = 'c', long)]
        check: bool,

        /// Print header info [flag]
        #[clap(short = 'i', long)]
        info: bool,
    },

    /// Call breakpoints between the graph and a reference
    Breakpoints {
        #[command(flatten)]
        graph_args: GraphArgs,

        #[command(flatten)]
        call_args: CallArgs,

        /// Reference FASTA file(s), may be repeated [path]
        #[clap(short = 'r', long = "ref", value_parser, num_args = 1.., required = true, help_heading = "Core")]
        references: Vec<PathBuf>,

        /// Output file; gzipped when it ends in .gz [path]
        #[clap(short = 'o', long, value_parser, required = true, help_heading = "Core")]
        out: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start_time = Instant::now();
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        eprintln!("Fatal Error after {:.2?}", start_time.elapsed());
        std::process::exit(1);
    }
    std::process::exit(0);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::View {
            graph,
            kmers,
            check,
            info,
        } => run_view(&graph, kmers, check, info),
        Cmd::Breakpoints {
            graph_args,
            call_args,
            references,
            out,
        } => run_breakpoints(graph_args, call_args, references, out),
    }
}

/* ---------------------------------------------------------------------- */
/*  view                                                                  */
/* ---------------------------------------------------------------------- */

fn run_view(path: &PathBuf, kmers: bool, mut check: bool, mut info: bool) -> Result<()> {
    // default is --info --check
    if kmers {
        check = true;
    }
    if !info && !check && !kmers {
        info = true;
        check = true;
    }

    let (hdr, report) = graph_io::check_graph_file(path)
        .with_context(|| format!("checking graph {:?}", path))?;

    if info {
        println!("version: {}", hdr.version);
        println!("kmer size: {}", hdr.kmer_size);
        println!("bitfields: {}", hdr.num_words);
        println!("colours: {}", hdr.num_cols);
        println!("number of kmers: {}", report.num_kmers_read);
        println!("----");
        for (i, ginfo) in hdr.infos.iter().enumerate() {
            println!("Colour {}:", i);
            if hdr.version >= 6 {
                println!("  sample name: '{}'", ginfo.sample_name);
            }
            println!("  mean input contig length: {}", ginfo.mean_read_length);
            println!("  total sequence loaded:    {}", ginfo.total_sequence);
            if hdr.version >= 6 {
                println!("  sequence error rate: {}", ginfo.seq_err);
            }
        }
    }

    if kmers {
        print_kmers(path)?;
    }

    if check {
        println!("----");
        println!("number of kmers: {}", report.num_kmers_read);
        println!("sum of coverages: {}", report.sum_covgs);
        for wmsg in &report.warnings {
            println!("warning: {}", wmsg);
        }
        for emsg in &report.errors {
            println!("error: {}", emsg);
        }
        if report.is_valid() {
            println!(
                "{}",
                if report.warnings.is_empty() {
                    "Graph is valid"
                } else {
                    "Graph may be ok"
                }
            );
        } else {
            anyhow::bail!("graph file {:?} failed validation", path);
        }
    }
    Ok(())
}

/// Per-color edge string: incoming bases lowercase, outgoing uppercase,
/// '.' when absent.
fn edges_str(e: Edges) -> String {
    use svbreak::kmer::binary_kmer::Orient;
    let mut s = String::with_capacity(8);
    for b in 0..4u8 {
        if e.has_edge(nuc_complement(b), Orient::Reverse) {
            s.push((nuc_to_char(b) as char).to_ascii_lowercase());
        } else {
            s.push('.');
        }
    }
    for b in 0..4u8 {
        if e.has_edge(b, Orient::Forward) {
            s.push(nuc_to_char(b) as char);
        } else {
            s.push('.');
        }
    }
    s
}

fn print_kmers(path: &PathBuf) -> Result<()> {
    let file = File::open(path).context("reopening graph")?;
    let mut r = BufReader::new(file);
    let (hdr, _) = graph_io::read_header(&mut r, path)?;
    let mut covgs = vec![0u32; hdr.num_cols];
    let mut edges = vec![Edges::default(); hdr.num_cols];
    println!("----");
    while let Some(bkmer) =
        graph_io::read_kmer_record(&mut r, hdr.num_words, &mut covgs, &mut edges, path)?
    {
        let covg_str: Vec<String> = covgs.iter().map(|c| c.to_string()).collect();
        let edge_str: Vec<String> = edges.iter().map(|&e| edges_str(e)).collect();
        println!(
            "{} {} {}",
            bkmer.to_string(hdr.kmer_size),
            covg_str.join(" "),
            edge_str.join(" ")
        );
    }
    Ok(())
}

/* ---------------------------------------------------------------------- */
/*  breakpoints                                                           */
/* ---------------------------------------------------------------------- */

fn run_breakpoints(
    graph_args: GraphArgs,
    call_args: CallArgs,
    references: Vec<PathBuf>,
    out_path: PathBuf,
) -> Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(graph_args.n_threads)
        .build_global()
        .context("building Rayon thread pool")?;

    println!("Start: Loading reference");
    let mut contigs = Vec::new();
    for path in &references {
        contigs.extend(read_fasta(path)?);
    }
    let ref_bases: usize = contigs.iter().map(|(_, s)| s.len()).sum();

    println!("Start: Loading graph");
    let (graph, hdr) = graph_io::load_graph_new(
        &graph_args.graph,
        ref_bases + graph_args.extra_nkmers,
    )
    .with_context(|| format!("loading graph {:?}", graph_args.graph))?;

    let store = GPathStore::new(graph_args.path_memory, graph.ht.capacity(), graph.num_cols);
    let gphash = GPathHash::new(graph_args.path_memory / 32);

    if !graph_args.links.is_empty() {
        println!("Start: Loading links");
        let pb = ProgressBar::new(graph_args.links.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("       {bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        for path in &graph_args.links {
            svbreak::paths::io::load_links(path, &graph, &store, &gphash)
                .with_context(|| format!("loading links {:?}", path))?;
            pb.inc(1);
        }
        pb.finish_with_message("| Links loaded");
    }

    println!("Start: Indexing reference kmers");
    let kograph = KOGraph::build(&graph, &contigs).context("building kmer occurrence index")?;

    println!("Start: Calling breakpoints");
    let opts = BreakpointOpts {
        nthreads: graph_args.n_threads.max(1),
        min_ref_nkmers: call_args.min_ref_nkmers as usize,
        max_ref_nkmers: call_args.max_ref_nkmers as usize,
        prefix: "call".to_string(),
    };
    let sample_names: Vec<String> = hdr.infos.iter().map(|i| i.sample_name.clone()).collect();
    let header = breakpoints_header_json(
        &graph,
        &sample_names,
        &references,
        &kograph,
        &[std::env::args().collect::<Vec<_>>().join(" ")],
    );

    let file = File::create(&out_path).with_context(|| format!("creating {:?}", out_path))?;
    let stats = if out_path.extension().is_some_and(|e| e == "gz") {
        let mut w = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_breakpoints_header(&mut w, &header)?;
        let (stats, w) = call_breakpoints(&graph, &store, &kograph, &opts, w)?;
        w.finish().context("closing gzip output")?.flush()?;
        stats
    } else {
        let mut w = BufWriter::new(file);
        write_breakpoints_header(&mut w, &header)?;
        let (stats, mut w) = call_breakpoints(&graph, &store, &kograph, &opts, w)?;
        w.flush()?;
        stats
    };

    println!(
        "Done: {} calls written to {:?} ({} breaks examined, {} unanchored 5' flanks)",
        stats.calls_emitted, out_path, stats.breaks_examined, stats.flank5p_unanchored
    );
    Ok(())
}

//! Binary graph file format. Layout: magic `CORTEX`, u32 version, u32
//! kmer size, u32 word count, u32 color count; per color a mean read
//! length, a total-sequence count and (version >= 6) sample name, 80-bit
//! sequencing error rate and an error-cleaning sub-record; the magic
//! again; then one record per k-mer: the key words, per-color coverages
//! and per-color edge bytes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};

use crate::error::EngineError;
use crate::graph::db_graph::{check_kmer_size, Covg, DbGraph};
use crate::graph::edges::Edges;
use crate::kmer::binary_kmer::{num_words, BinaryKmer};

pub const GRAPH_MAGIC: &[u8; 6] = b"CORTEX";
pub const GRAPH_FORMAT_VERSION: u32 = 6;

/// Size in bytes of one k-mer record.
pub fn record_size(nwords: usize, ncols: usize) -> usize {
    8 * nwords + 5 * ncols
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorCleaning {
    pub cleaned_tips: bool,
    pub cleaned_snodes: bool,
    pub cleaned_kmers: bool,
    pub is_graph_intersection: bool,
    pub clean_snodes_thresh: u32,
    pub clean_kmers_thresh: u32,
    pub intersection_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphInfo {
    pub mean_read_length: u32,
    pub total_sequence: u64,
    pub sample_name: String,
    pub seq_err: f64,
    pub cleaning: ErrorCleaning,
}

impl GraphInfo {
    pub fn with_name(name: impl Into<String>) -> Self {
        GraphInfo {
            sample_name: name.into(),
            seq_err: 0.01,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphFileHeader {
    pub version: u32,
    pub kmer_size: usize,
    pub num_words: usize,
    pub num_cols: usize,
    pub infos: Vec<GraphInfo>,
}

/* ---------------------------------------------------------------------- */
/*  80-bit extended float codec                                           */
/* ---------------------------------------------------------------------- */

// The format stores the per-color sequencing error rate as a 16-byte
// x87 `long double`: 8 mantissa bytes (explicit integer bit at bit 63),
// 2 sign+exponent bytes, 6 bytes of padding.

pub fn f64_to_ld_bytes(v: f64) -> [u8; 16] {
    let bits = v.to_bits();
    let sign = (bits >> 63) as u16;
    let exp = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & ((1u64 << 52) - 1);

    let (mant, e15): (u64, u16) = if exp == 0 && frac == 0 {
        (0, 0)
    } else if exp == 0x7ff {
        // inf keeps a bare integer bit, nan keeps its payload
        ((1u64 << 63) | (frac << 11), 0x7fff)
    } else if exp == 0 {
        // subnormal: normalize into the explicit integer bit
        let p = 63 - frac.leading_zeros() as i32;
        ((frac << (63 - p)) as u64, (p - 1074 + 16383) as u16)
    } else {
        ((1u64 << 63) | (frac << 11), (exp - 1023 + 16383) as u16)
    };

    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&mant.to_le_bytes());
    out[8..10].copy_from_slice(&((sign << 15) | e15).to_le_bytes());
    out
}

pub fn ld_bytes_to_f64(b: &[u8; 16]) -> f64 {
    let mant = u64::from_le_bytes(b[..8].try_into().unwrap());
    let se = u16::from_le_bytes(b[8..10].try_into().unwrap());
    let sign = (se >> 15) as u64;
    let e15 = (se & 0x7fff) as i32;

    if e15 == 0 && mant == 0 {
        return f64::from_bits(sign << 63);
    }
    if e15 == 0x7fff {
        return if mant << 1 == 0 {
            if sign == 0 {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            }
        } else {
            f64::NAN
        };
    }
    let exp = e15 - 16383 + 1023;
    if exp >= 0x7ff {
        return if sign == 0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
    }
    if exp <= 0 {
        // flush values below f64 normal range
        return f64::from_bits(sign << 63);
    }
    let frac = (mant & !(1u64 << 63)) >> 11;
    f64::from_bits((sign << 63) | ((exp as u64) << 52) | frac)
}

/* ---------------------------------------------------------------------- */
/*  header                                                                */
/* ---------------------------------------------------------------------- */

fn read_lenstr(r: &mut impl Read, path: &Path, what: &str) -> Result<String, EngineError> {
    let len = r
        .read_u32::<LittleEndian>()
        .map_err(|e| EngineError::io(path, e))? as usize;
    if len > 0xffff {
        return Err(EngineError::malformed(
            path,
            format!("{what} length {len} is implausible"),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|e| EngineError::io(path, e))?;
    String::from_utf8(buf)
        .map_err(|_| EngineError::malformed(path, format!("{what} is not valid UTF-8")))
}

fn write_lenstr(w: &mut impl Write, s: &str) -> io::Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

pub fn read_header(r: &mut impl Read, path: &Path) -> Result<(GraphFileHeader, usize), EngineError> {
    let io_err = |e| EngineError::io(path, e);

    let mut magic = [0u8; 6];
    r.read_exact(&mut magic).map_err(io_err)?;
    if &magic != GRAPH_MAGIC {
        return Err(EngineError::malformed(path, "missing CORTEX magic"));
    }
    let version = r.read_u32::<LittleEndian>().map_err(io_err)?;
    let kmer_size = r.read_u32::<LittleEndian>().map_err(io_err)? as usize;
    let nwords = r.read_u32::<LittleEndian>().map_err(io_err)? as usize;
    let num_cols = r.read_u32::<LittleEndian>().map_err(io_err)? as usize;

    if !(4..=7).contains(&version) {
        return Err(EngineError::malformed(
            path,
            format!("unsupported graph format version {version}"),
        ));
    }
    check_kmer_size(kmer_size)?;
    if nwords != num_words(kmer_size) {
        return Err(EngineError::malformed(
            path,
            format!(
                "kmer size {kmer_size} needs {} words, header says {nwords}",
                num_words(kmer_size)
            ),
        ));
    }
    if num_cols == 0 || num_cols > 10_000 {
        return Err(EngineError::malformed(
            path,
            format!("implausible color count {num_cols}"),
        ));
    }

    let mut infos = vec![GraphInfo::default(); num_cols];
    let mut nbytes = 6 + 4 * 4;
    for info in infos.iter_mut() {
        info.mean_read_length = r.read_u32::<LittleEndian>().map_err(io_err)?;
        nbytes += 4;
    }
    for info in infos.iter_mut() {
        info.total_sequence = r.read_u64::<LittleEndian>().map_err(io_err)?;
        nbytes += 8;
    }

    if version >= 6 {
        for info in infos.iter_mut() {
            info.sample_name = read_lenstr(r, path, "sample name")?;
            nbytes += 4 + info.sample_name.len();
        }
        for info in infos.iter_mut() {
            let mut ld = [0u8; 16];
            r.read_exact(&mut ld).map_err(io_err)?;
            info.seq_err = ld_bytes_to_f64(&ld);
            nbytes += 16;
        }
        for info in infos.iter_mut() {
            let mut flags = [0u8; 4];
            r.read_exact(&mut flags).map_err(io_err)?;
            let ec = &mut info.cleaning;
            ec.cleaned_tips = flags[0] != 0;
            ec.cleaned_snodes = flags[1] != 0;
            ec.cleaned_kmers = flags[2] != 0;
            ec.is_graph_intersection = flags[3] != 0;
            ec.clean_snodes_thresh = r.read_u32::<LittleEndian>().map_err(io_err)?;
            ec.clean_kmers_thresh = r.read_u32::<LittleEndian>().map_err(io_err)?;
            ec.intersection_name = read_lenstr(r, path, "intersection name")?;
            nbytes += 4 + 4 + 4 + 4 + ec.intersection_name.len();
        }
    }

    r.read_exact(&mut magic).map_err(io_err)?;
    if &magic != GRAPH_MAGIC {
        return Err(EngineError::malformed(path, "header not closed by CORTEX magic"));
    }
    nbytes += 6;

    Ok((
        GraphFileHeader {
            version,
            kmer_size,
            num_words: nwords,
            num_cols,
            infos,
        },
        nbytes,
    ))
}

pub fn write_header(w: &mut impl Write, h: &GraphFileHeader) -> io::Result<()> {
    w.write_all(GRAPH_MAGIC)?;
    w.write_u32::<LittleEndian>(h.version)?;
    w.write_u32::<LittleEndian>(h.kmer_size as u32)?;
    w.write_u32::<LittleEndian>(h.num_words as u32)?;
    w.write_u32::<LittleEndian>(h.num_cols as u32)?;
    for info in &h.infos {
        w.write_u32::<LittleEndian>(info.mean_read_length)?;
    }
    for info in &h.infos {
        w.write_u64::<LittleEndian>(info.total_sequence)?;
    }
    if h.version >= 6 {
        for info in &h.infos {
            write_lenstr(w, &info.sample_name)?;
        }
        for info in &h.infos {
            w.write_all(&f64_to_ld_bytes(info.seq_err))?;
        }
        for info in &h.infos {
            let ec = &info.cleaning;
            w.write_all(&[
                ec.cleaned_tips as u8,
                ec.cleaned_snodes as u8,
                ec.cleaned_kmers as u8,
                ec.is_graph_intersection as u8,
            ])?;
            w.write_u32::<LittleEndian>(if ec.cleaned_snodes {
                ec.clean_snodes_thresh
            } else {
                0
            })?;
            w.write_u32::<LittleEndian>(if ec.cleaned_kmers {
                ec.clean_kmers_thresh
            } else {
                0
            })?;
            write_lenstr(w, &ec.intersection_name)?;
        }
    }
    w.write_all(GRAPH_MAGIC)
}

/* ---------------------------------------------------------------------- */
/*  records                                                               */
/* ---------------------------------------------------------------------- */

/// Read one k-mer record; `Ok(None)` on clean end-of-file.
pub fn read_kmer_record(
    r: &mut impl Read,
    nwords: usize,
    covgs: &mut [Covg],
    edges: &mut [Edges],
    path: &Path,
) -> Result<Option<BinaryKmer>, EngineError> {
    let mut words = [0u64; crate::kmer::binary_kmer::MAX_KMER_WORDS];
    match r.read_u64::<LittleEndian>() {
        Ok(w) => words[0] = w,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(EngineError::io(path, e)),
    }
    for w in words[1..nwords].iter_mut() {
        *w = r
            .read_u64::<LittleEndian>()
            .map_err(|e| EngineError::io(path, e))?;
    }
    for c in covgs.iter_mut() {
        *c = r
            .read_u32::<LittleEndian>()
            .map_err(|e| EngineError::io(path, e))?;
    }
    for e in edges.iter_mut() {
        *e = Edges(r.read_u8().map_err(|err| EngineError::io(path, err))?);
    }
    Ok(Some(BinaryKmer::from_words(&words[..nwords])))
}

pub fn write_kmer_record(
    w: &mut impl Write,
    bkmer: &BinaryKmer,
    nwords: usize,
    covgs: &[Covg],
    edges: &[Edges],
) -> io::Result<()> {
    for &word in bkmer.words(nwords) {
        w.write_u64::<LittleEndian>(word)?;
    }
    for &c in covgs {
        w.write_u32::<LittleEndian>(c)?;
    }
    for &e in edges {
        w.write_u8(e.0)?;
    }
    Ok(())
}

/* ---------------------------------------------------------------------- */
/*  whole-graph save / load                                               */
/* ---------------------------------------------------------------------- */

/// Dump all k-mers with all colors. `infos` must have one entry per color.
pub fn save_graph(graph: &DbGraph, infos: &[GraphInfo], path: &Path) -> Result<u64, EngineError> {
    assert_eq!(infos.len(), graph.num_cols);
    let hdr = GraphFileHeader {
        version: GRAPH_FORMAT_VERSION,
        kmer_size: graph.kmer_size,
        num_words: num_words(graph.kmer_size),
        num_cols: graph.num_cols,
        infos: infos.to_vec(),
    };
    let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
    let mut w = BufWriter::new(file);
    write_header(&mut w, &hdr).map_err(|e| EngineError::io(path, e))?;

    let mut covgs = vec![0 as Covg; graph.num_cols];
    let mut edges = vec![Edges::default(); graph.num_cols];
    let mut n = 0u64;
    for hkey in graph.ht.iter() {
        for col in 0..graph.num_cols {
            covgs[col] = graph.covg(hkey, col);
            edges[col] = graph.edges(hkey, col);
        }
        write_kmer_record(&mut w, &graph.ht.bkmer(hkey), hdr.num_words, &covgs, &edges)
            .map_err(|e| EngineError::io(path, e))?;
        n += 1;
    }
    w.flush().map_err(|e| EngineError::io(path, e))?;
    info!("[graph] saved {} kmers to {}", n, path.display());
    Ok(n)
}

/// Load a graph file into an already-allocated graph. The k-mer size must
/// match; file colors map one-to-one onto graph colors.
pub fn load_graph_into(path: &Path, graph: &DbGraph) -> Result<GraphFileHeader, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    let mut r = BufReader::new(file);
    let (hdr, _) = read_header(&mut r, path)?;

    if hdr.kmer_size != graph.kmer_size {
        return Err(EngineError::malformed(
            path,
            format!(
                "kmer size {} does not match graph kmer size {}",
                hdr.kmer_size, graph.kmer_size
            ),
        ));
    }
    if hdr.num_cols > graph.num_cols {
        return Err(EngineError::InconsistentColors {
            color: hdr.num_cols - 1,
            num_cols: graph.num_cols,
        });
    }

    let mut covgs = vec![0 as Covg; hdr.num_cols];
    let mut edges = vec![Edges::default(); hdr.num_cols];
    let mut n = 0u64;
    while let Some(bkmer) = read_kmer_record(&mut r, hdr.num_words, &mut covgs, &mut edges, path)? {
        let (hkey, _) = graph.ht.find_or_insert(&bkmer.canonical(hdr.kmer_size))?;
        for col in 0..hdr.num_cols {
            graph.add_covg(hkey, col, covgs[col]);
            graph.merge_edges(hkey, col, edges[col]);
            if covgs[col] > 0 {
                graph.set_node_in_col(hkey, col);
            }
        }
        n += 1;
    }
    info!("[graph] loaded {} kmers from {}", n, path.display());
    Ok(hdr)
}

/// Load a graph file into a freshly sized graph.
pub fn load_graph_new(path: &Path, extra_kmers: usize) -> Result<(DbGraph, GraphFileHeader), EngineError> {
    let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| EngineError::io(path, e))?
        .len() as usize;
    let mut r = BufReader::new(file);
    let (hdr, hdr_bytes) = read_header(&mut r, path)?;
    drop(r);

    let rec = record_size(hdr.num_words, hdr.num_cols);
    let nkmers = file_size.saturating_sub(hdr_bytes) / rec;
    let graph = DbGraph::alloc(hdr.kmer_size, hdr.num_cols, nkmers + extra_kmers, true, false)?;
    let hdr = load_graph_into(path, &graph)?;
    Ok((graph, hdr))
}

/* ---------------------------------------------------------------------- */
/*  checking                                                              */
/* ---------------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct GraphCheckReport {
    pub num_kmers_read: u64,
    pub expected_num_kmers: Option<u64>,
    pub sum_covgs: u64,
    pub num_all_zero_kmers: u64,
    pub num_zero_covg_kmers: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl GraphCheckReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Stream a graph file and validate its records: non-canonical keys, more
/// than one all-`A` k-mer and short files are errors; k-mers with zero
/// coverage in every color are warned about.
pub fn check_graph_file(path: &Path) -> Result<(GraphFileHeader, GraphCheckReport), EngineError> {
    let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| EngineError::io(path, e))?
        .len() as usize;
    let mut r = BufReader::new(file);
    let (hdr, hdr_bytes) = read_header(&mut r, path)?;

    let mut report = GraphCheckReport::default();
    let rec = record_size(hdr.num_words, hdr.num_cols);
    report.expected_num_kmers = Some((file_size.saturating_sub(hdr_bytes) / rec) as u64);

    let mut covgs = vec![0 as Covg; hdr.num_cols];
    let mut edges = vec![Edges::default(); hdr.num_cols];
    while let Some(bkmer) = read_kmer_record(&mut r, hdr.num_words, &mut covgs, &mut edges, path)? {
        report.num_kmers_read += 1;
        report.sum_covgs += covgs.iter().map(|&c| c as u64).sum::<u64>();

        if bkmer != bkmer.canonical(hdr.kmer_size) {
            report
                .errors
                .push(format!("non-canonical kmer at record {}", report.num_kmers_read));
        }
        if bkmer.is_all_a() {
            report.num_all_zero_kmers += 1;
            if report.num_all_zero_kmers == 2 {
                report.errors.push("more than one all-'A' kmer".to_string());
            }
        }
        if covgs.iter().all(|&c| c == 0) {
            report.num_zero_covg_kmers += 1;
        }
    }

    if report.num_zero_covg_kmers > 0 {
        report.warnings.push(format!(
            "{} kmers have no coverage in any color",
            report.num_zero_covg_kmers
        ));
    }
    if let Some(exp) = report.expected_num_kmers {
        if exp != report.num_kmers_read {
            report.warnings.push(format!(
                "expected {} kmers, read {}",
                exp, report.num_kmers_read
            ));
        }
    }
    for wmsg in &report.warnings {
        warn!("[graph] {}: {}", path.display(), wmsg);
    }
    Ok((hdr, report))
}

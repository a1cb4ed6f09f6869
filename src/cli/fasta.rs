use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;

/// Read a (possibly gzipped) FASTA file into (name, sequence) pairs.
/// The record name is the first whitespace-separated token after '>'.
pub fn read_fasta(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let file = File::open(path).context(format!("opening FASTA {:?}", path))?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };

    let mut contigs: Vec<(String, Vec<u8>)> = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line.context("reading FASTA line")?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(hdr) = line.strip_prefix('>') {
            let name = hdr.split_whitespace().next().unwrap_or("").to_string();
            if name.is_empty() {
                bail!("FASTA record without a name in {:?}", path);
            }
            contigs.push((name, Vec::new()));
        } else {
            match contigs.last_mut() {
                Some((_, seq)) => seq.extend(line.bytes().map(|b| b.to_ascii_uppercase())),
                None => bail!("FASTA {:?} does not start with '>'", path),
            }
        }
    }
    if contigs.is_empty() {
        bail!("no records in FASTA {:?}", path);
    }
    Ok(contigs)
}

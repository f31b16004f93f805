//! Sequence access for features.
//!
//! Records carry sequence bytes either from the `##FASTA` section of the
//! GFF3 file or from a separate FASTA file loaded with [`attach_fasta`].

use crate::feature::{Feature, Record, Strand};
use crate::gff::{open_input, Result};
use bio::alphabets::dna::revcomp;
use bio::io::fasta;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Read every sequence of a FASTA file (gzip accepted) keyed by id.
pub fn load_fasta<P: AsRef<Path>>(path: P) -> Result<FxHashMap<String, Vec<u8>>> {
    let reader = fasta::Reader::new(open_input(Some(path.as_ref()))?);
    let mut sequences = FxHashMap::default();
    for record in reader.records() {
        let record = record?;
        sequences.insert(record.id().to_string(), record.seq().to_vec());
    }
    debug!("Loaded {} sequences", sequences.len());
    Ok(sequences)
}

/// Attach sequences to records by id, replacing embedded ones.
///
/// Returns the number of records that received a sequence.
pub fn attach_fasta(records: &mut [Record], mut sequences: FxHashMap<String, Vec<u8>>) -> usize {
    let mut attached = 0;
    for record in records.iter_mut() {
        match sequences.remove(&record.id) {
            Some(seq) => {
                record.sequence = Some(seq);
                attached += 1;
            }
            None if record.sequence.is_none() => {
                warn!("No sequence found for {}", record.id);
            }
            None => {}
        }
    }
    attached
}

/// The bases covered by `feature`, reverse-complemented on the minus strand.
///
/// `None` when the record has no sequence, the location is malformed, or
/// the span runs past the sequence end.
pub fn feature_sequence(record: &Record, feature: &Feature) -> Option<Vec<u8>> {
    let seq = record.sequence.as_ref()?;
    let (start, end) = feature.location.span()?;
    let (start, end) = (start as usize, end as usize);
    if start > end || end > seq.len() {
        return None;
    }
    let slice = &seq[start..end];
    Some(match feature.strand {
        Strand::Minus => revcomp(slice),
        _ => slice.to_vec(),
    })
}

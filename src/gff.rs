//! GFF3 file parser.
//!
//! Reads feature lines into [`Record`]s and assembles the `ID`/`Parent`
//! attributes into nested feature trees. An embedded `##FASTA` section is
//! attached to the matching records as sequence bytes.

use crate::config::is_strict;
use crate::feature::{Attributes, Feature, Location, Record, Strand};
use crate::format::parsing::{column_count, parse_u64_fast, percent_decode, split_columns};
use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading, filtering or converting GFF data.
#[derive(Error, Debug)]
pub enum GffError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Malformed filter file at line {line}: {message}")]
    MalformedFilterFile { line: usize, message: String },

    #[error("Malformed feature {id}: {message}")]
    MalformedFeature { id: String, message: String },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GffError>;

/// Open a path for reading, with transparent gzip decompression.
///
/// `None` or `-` reads from stdin.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    let path = match path {
        Some(p) if p.as_os_str() != "-" => p,
        _ => return Ok(Box::new(BufReader::new(io::stdin()))),
    };

    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let gzipped =
        (n == 2 && magic == [0x1f, 0x8b]) || path.extension().is_some_and(|ext| ext == "gz");
    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::with_capacity(256 * 1024, file)))
    }
}

/// Deepest `Parent` nesting kept in an assembled tree. A feature below this
/// level starts a new top-level tree.
pub const MAX_NESTING_DEPTH: usize = 32;

/// A feature line before tree assembly.
struct FlatFeature {
    feature: Feature,
    parent: Option<String>,
    line: usize,
}

/// Per-sequence accumulator.
#[derive(Default)]
struct RecordBuilder {
    record: Record,
    flat: Vec<FlatFeature>,
}

/// A GFF3 reader producing fully assembled records.
pub struct GffReader<R: BufRead> {
    reader: R,
    line_number: usize,
    buffer: String,
}

impl GffReader<Box<dyn BufRead>> {
    /// Open a GFF3 file from a path (`-` for stdin, `.gz` accepted).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(open_input(Some(path.as_ref()))?))
    }
}

impl<R: BufRead> GffReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buffer: String::with_capacity(1024),
        }
    }

    /// Read the whole input and return records in order of first appearance.
    pub fn read_records(mut self) -> Result<Vec<Record>> {
        let mut builders: Vec<RecordBuilder> = Vec::new();
        let mut index: FxHashMap<String, usize> = FxHashMap::default();
        let mut in_fasta = false;
        let mut current_seq: Option<usize> = None;

        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_line(&mut self.buffer)?;
            if bytes_read == 0 {
                break;
            }
            self.line_number += 1;

            let line = self.buffer.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            if in_fasta || line.starts_with('>') {
                in_fasta = true;
                if let Some(header) = line.strip_prefix('>') {
                    let id = header.split_whitespace().next().unwrap_or_default();
                    let idx = builder_index(&mut builders, &mut index, id);
                    builders[idx].record.sequence = Some(Vec::new());
                    current_seq = Some(idx);
                } else if let Some(idx) = current_seq {
                    if let Some(seq) = builders[idx].record.sequence.as_mut() {
                        seq.extend(line.trim().bytes());
                    }
                } else {
                    return Err(GffError::Parse {
                        line: self.line_number,
                        message: "Sequence data before any FASTA header".to_string(),
                    });
                }
                continue;
            }

            if line.starts_with("##FASTA") {
                in_fasta = true;
                continue;
            }

            if let Some(pragma) = line.strip_prefix("##sequence-region") {
                let fields: Vec<&str> = pragma.split_whitespace().collect();
                if let [id, _, end, ..] = fields.as_slice() {
                    let idx = builder_index(&mut builders, &mut index, id);
                    builders[idx].record.declared_len = end.parse().ok();
                }
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            let flat = self.parse_line(line)?;
            let idx = builder_index(&mut builders, &mut index, &flat.feature.seqid);
            builders[idx].flat.push(flat);
        }

        builders
            .into_iter()
            .map(|builder| {
                let mut record = builder.record;
                record.features = assemble_tree(builder.flat)?;
                Ok(record)
            })
            .collect()
    }

    /// Parse a single GFF3 feature line.
    fn parse_line(&self, line: &str) -> Result<FlatFeature> {
        let cols = split_columns(line).ok_or_else(|| GffError::Parse {
            line: self.line_number,
            message: format!(
                "Expected 9 tab-separated columns, got {}",
                column_count(line)
            ),
        })?;

        let location = self.parse_location(cols[3], cols[4])?;

        let strand = match Strand::from_field(cols[6]) {
            Some(strand) => strand,
            None if is_strict() => {
                return Err(GffError::Parse {
                    line: self.line_number,
                    message: format!("Invalid strand: '{}'", cols[6]),
                });
            }
            None => {
                debug!(
                    "Line {}: unrecognized strand '{}', treating as unknown",
                    self.line_number, cols[6]
                );
                Strand::Unknown
            }
        };

        let attributes = self.parse_attributes(cols[8])?;
        let parents = attributes.get("Parent").unwrap_or_default();
        if parents.len() > 1 {
            debug!(
                "Line {}: feature has {} parents, nesting under the first",
                self.line_number,
                parents.len()
            );
        }
        let parent = parents.first().cloned();

        Ok(FlatFeature {
            feature: Feature {
                seqid: cols[0].to_string(),
                source: cols[1].to_string(),
                kind: cols[2].to_string(),
                location,
                score: optional_column(cols[5]),
                strand,
                phase: optional_column(cols[7]),
                attributes,
                children: Vec::new(),
            },
            parent,
            line: self.line_number,
        })
    }

    fn parse_location(&self, start: &str, end: &str) -> Result<Location> {
        let parsed = parse_u64_fast(start.as_bytes()).zip(parse_u64_fast(end.as_bytes()));
        match parsed {
            Some((s, e)) if s >= 1 && s <= e => Ok(Location::Span { start: s - 1, end: e }),
            _ if is_strict() => Err(GffError::Parse {
                line: self.line_number,
                message: format!("Invalid coordinates: start '{}', end '{}'", start, end),
            }),
            _ => {
                warn!(
                    "Line {}: invalid coordinates (start '{}', end '{}'), keeping feature as malformed",
                    self.line_number, start, end
                );
                Ok(Location::Malformed {
                    start: start.to_string(),
                    end: end.to_string(),
                })
            }
        }
    }

    fn parse_attributes(&self, column: &str) -> Result<Attributes> {
        let mut attributes = Attributes::new();
        if column == "." {
            return Ok(attributes);
        }

        for entry in column.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((key, values)) = entry.split_once('=') else {
                if is_strict() {
                    return Err(GffError::Parse {
                        line: self.line_number,
                        message: format!("Attribute without '=': '{}'", entry),
                    });
                }
                warn!(
                    "Line {}: can't split attribute '{}', skipping it",
                    self.line_number, entry
                );
                continue;
            };
            let key = percent_decode(key.trim()).into_owned();
            for value in values.split(',') {
                attributes.push(key.clone(), percent_decode(value.trim()).into_owned());
            }
        }

        Ok(attributes)
    }
}

fn optional_column(s: &str) -> Option<String> {
    if s == "." || s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn builder_index(
    builders: &mut Vec<RecordBuilder>,
    index: &mut FxHashMap<String, usize>,
    id: &str,
) -> usize {
    if let Some(&idx) = index.get(id) {
        return idx;
    }
    let idx = builders.len();
    builders.push(RecordBuilder {
        record: Record::new(id),
        flat: Vec::new(),
    });
    index.insert(id.to_string(), idx);
    idx
}

/// Nest features under their `Parent`, preserving file order at each level.
///
/// Features whose parent is unknown, or that sit on a parent cycle, stay at
/// the top level. So do features nested deeper than [`MAX_NESTING_DEPTH`],
/// unless strict mode is on, where that is a parse error.
fn assemble_tree(flat: Vec<FlatFeature>) -> Result<Vec<Feature>> {
    let n = flat.len();
    let mut id_index: FxHashMap<String, usize> = FxHashMap::default();
    for (i, f) in flat.iter().enumerate() {
        if let Some(id) = f.feature.id() {
            id_index.entry(id.to_string()).or_insert(i);
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut has_parent = vec![false; n];
    for (i, f) in flat.iter().enumerate() {
        let Some(parent) = f.parent.as_deref() else {
            continue;
        };
        match id_index.get(parent) {
            Some(&p) if p != i => {
                children[p].push(i);
                has_parent[i] = true;
            }
            Some(_) => warn!("Feature {} lists itself as parent", parent),
            None => warn!(
                "Feature {} references unknown parent {}, keeping it at top level",
                f.feature.tag("ID"),
                parent
            ),
        }
    }

    let mut levels = Levels {
        attached: vec![Vec::new(); n],
        visited: vec![false; n],
        depth: vec![0; n],
        roots: Vec::new(),
        queue: VecDeque::new(),
    };
    for i in 0..n {
        if !has_parent[i] {
            levels.push_root(i);
        }
    }
    levels.attach(&children, &flat)?;

    // Anything not reached from a root sits on a parent cycle.
    for i in 0..n {
        if !levels.visited[i] {
            warn!("Parent cycle detected, promoting feature to top level");
            levels.push_root(i);
            levels.attach(&children, &flat)?;
        }
    }

    let mut slots: Vec<Option<Feature>> = flat.into_iter().map(|f| Some(f.feature)).collect();
    let mut roots = levels.roots;
    roots.sort_unstable();
    Ok(roots
        .into_iter()
        .filter_map(|i| build_subtree(i, &mut slots, &levels.attached))
        .collect())
}

/// Breadth-first parent assignment with a depth cap.
struct Levels {
    attached: Vec<Vec<usize>>,
    visited: Vec<bool>,
    depth: Vec<usize>,
    roots: Vec<usize>,
    queue: VecDeque<usize>,
}

impl Levels {
    fn push_root(&mut self, idx: usize) {
        self.visited[idx] = true;
        self.depth[idx] = 0;
        self.roots.push(idx);
        self.queue.push_back(idx);
    }

    fn attach(&mut self, children: &[Vec<usize>], flat: &[FlatFeature]) -> Result<()> {
        while let Some(parent) = self.queue.pop_front() {
            for &child in &children[parent] {
                if self.visited[child] {
                    continue;
                }
                if self.depth[parent] < MAX_NESTING_DEPTH {
                    self.visited[child] = true;
                    self.depth[child] = self.depth[parent] + 1;
                    self.attached[parent].push(child);
                    self.queue.push_back(child);
                    continue;
                }
                if is_strict() {
                    return Err(GffError::Parse {
                        line: flat[child].line,
                        message: format!(
                            "Parent chain nested deeper than {} levels",
                            MAX_NESTING_DEPTH
                        ),
                    });
                }
                warn!(
                    "Line {}: feature {} nested deeper than {} levels, keeping it at top level",
                    flat[child].line,
                    flat[child].feature.tag("ID"),
                    MAX_NESTING_DEPTH
                );
                self.push_root(child);
            }
        }
        Ok(())
    }
}

/// Recursion depth is bounded by [`MAX_NESTING_DEPTH`].
fn build_subtree(
    idx: usize,
    slots: &mut [Option<Feature>],
    attached: &[Vec<usize>],
) -> Option<Feature> {
    let mut feature = slots[idx].take()?;
    for &child in &attached[idx] {
        if let Some(sub) = build_subtree(child, slots, attached) {
            feature.children.push(sub);
        }
    }
    Some(feature)
}

/// Read all records from a GFF3 file (`-` for stdin).
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    GffReader::from_path(path)?.read_records()
}

/// Parse records from a string (useful for testing).
pub fn parse_records(content: &str) -> Result<Vec<Record>> {
    GffReader::new(content.as_bytes()).read_records()
}

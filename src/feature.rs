//! Core feature types for GFF3 annotation trees.
//!
//! Coordinates are stored 0-based, half-open. GFF3 text is 1-based and
//! closed, so a line with start 100 and end 200 becomes `start = 99`,
//! `end = 200`.

use std::fmt;

/// Strand orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Plus,
    Minus,
    Unknown,
}

impl Strand {
    /// Parse a GFF3 strand column.
    ///
    /// Returns None for values that are not one of `+ - . ?`.
    pub fn from_field(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Strand::Plus),
            "-" => Some(Strand::Minus),
            "." | "?" => Some(Strand::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Plus => write!(f, "+"),
            Strand::Minus => write!(f, "-"),
            Strand::Unknown => write!(f, "."),
        }
    }
}

/// Genomic location of a feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Parsed span, 0-based half-open.
    Span { start: u64, end: u64 },
    /// Coordinate columns that could not be read as integers, kept verbatim.
    Malformed { start: String, end: String },
}

impl Location {
    #[inline]
    pub fn span(&self) -> Option<(u64, u64)> {
        match *self {
            Location::Span { start, end } => Some((start, end)),
            Location::Malformed { .. } => None,
        }
    }

    #[inline]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Location::Malformed { .. })
    }
}

/// Ordered attribute column: each key maps to one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Attributes {
    entries: Vec<(String, Vec<String>)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a value to `key`, creating the key if needed.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// First value of `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Escape characters reserved in the GFF3 attribute column.
pub fn encode_attribute_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("%3B"),
            '=' => out.push_str("%3D"),
            '&' => out.push_str("%26"),
            ',' => out.push_str("%2C"),
            '\t' => out.push_str("%09"),
            '\n' => out.push_str("%0A"),
            '%' => out.push_str("%25"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, ".");
        }
        for (i, (key, values)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{}=", encode_attribute_value(key))?;
            for (j, value) in values.iter().enumerate() {
                if j > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", encode_attribute_value(value))?;
            }
        }
        Ok(())
    }
}

/// One annotated feature with its sub-features.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub seqid: String,
    pub source: String,
    pub kind: String,
    pub location: Location,
    /// Score column, verbatim. None when the column is `.`.
    pub score: Option<String>,
    pub strand: Strand,
    /// Phase column, verbatim. None when the column is `.`.
    pub phase: Option<String>,
    pub attributes: Attributes,
    pub children: Vec<Feature>,
}

impl Feature {
    /// Create a feature with a 0-based half-open span.
    pub fn new(seqid: impl Into<String>, kind: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            seqid: seqid.into(),
            source: ".".to_string(),
            kind: kind.into(),
            location: Location::Span { start, end },
            score: None,
            strand: Strand::Unknown,
            phase: None,
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push(key, value);
        self
    }

    pub fn with_child(mut self, child: Feature) -> Self {
        self.children.push(child);
        self
    }

    /// The `ID` attribute, if any.
    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.attributes.first("ID")
    }

    /// 0-based start, when the location parsed.
    #[inline]
    pub fn start(&self) -> Option<u64> {
        self.location.span().map(|(s, _)| s)
    }

    /// End position, when the location parsed.
    #[inline]
    pub fn end(&self) -> Option<u64> {
        self.location.span().map(|(_, e)| e)
    }

    /// Length in bases, 0 for malformed locations.
    #[inline]
    pub fn len(&self) -> u64 {
        self.location
            .span()
            .map(|(s, e)| e.saturating_sub(s))
            .unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable identifier: the value of `key`, else `type_seqid:start-end`.
    pub fn tag(&self, key: &str) -> String {
        match self.attributes.first(key) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => match self.location {
                Location::Span { start, end } => {
                    format!("{}_{}:{}-{}", self.kind, self.seqid, start, end)
                }
                Location::Malformed {
                    ref start,
                    ref end,
                } => format!("{}_{}:{}-{}", self.kind, self.seqid, start, end),
            },
        }
    }

    /// This feature and every descendant in depth-first pre-order.
    pub fn walk(&self) -> Vec<&Feature> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(feature) = stack.pop() {
            out.push(feature);
            stack.extend(feature.children.iter().rev());
        }
        out
    }

    /// Number of features in this subtree, including self.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Feature::subtree_size)
            .sum::<usize>()
    }
}

/// Writes the feature's own GFF3 line (without children or newline).
impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t", self.seqid, self.source, self.kind)?;
        match &self.location {
            Location::Span { start, end } => write!(f, "{}\t{}", start + 1, end)?,
            Location::Malformed { start, end } => write!(f, "{}\t{}", start, end)?,
        }
        write!(
            f,
            "\t{}\t{}\t{}\t{}",
            self.score.as_deref().unwrap_or("."),
            self.strand,
            self.phase.as_deref().unwrap_or("."),
            self.attributes
        )
    }
}

/// One sequence context (contig or chromosome) and its top-level features.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub id: String,
    pub features: Vec<Feature>,
    /// Sequence bytes from an embedded `##FASTA` section or a FASTA file.
    pub sequence: Option<Vec<u8>>,
    /// Length declared by a `##sequence-region` pragma.
    pub declared_len: Option<u64>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            features: Vec::new(),
            sequence: None,
            declared_len: None,
        }
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    /// Sequence length, from the sequence itself or the region pragma.
    pub fn len(&self) -> Option<u64> {
        self.sequence
            .as_ref()
            .map(|s| s.len() as u64)
            .or(self.declared_len)
    }

    /// Number of features at every depth.
    pub fn feature_count(&self) -> usize {
        self.features.iter().map(Feature::subtree_size).sum()
    }

    /// Every feature at every depth, parents before children.
    pub fn flatten(&self) -> Vec<&Feature> {
        self.features.iter().flat_map(Feature::walk).collect()
    }
}

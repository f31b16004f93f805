//! Selection criteria for the nested feature filter.
//!
//! An [`AttributeFilterTable`] lists, per attribute key, the values a
//! feature must hold to be selected. Strand and coordinate bounds are
//! checked separately by [`passes`].

use crate::feature::{Feature, Location, Strand};
use crate::gff::{GffError, Result};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Marker that opens a key section in an attribute table file.
pub const KEY_MARKER: &str = "##";

/// Attribute key -> set of accepted values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeFilterTable {
    keys: Vec<String>,
    allowed: FxHashMap<String, FxHashSet<String>>,
}

impl AttributeFilterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an accepted value for `key`.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.section(key).insert(value.into());
    }

    fn section(&mut self, key: &str) -> &mut FxHashSet<String> {
        if !self.allowed.contains_key(key) {
            self.keys.push(key.to_string());
        }
        self.allowed.entry(key.to_string()).or_default()
    }

    /// Load a table from a file of `##key` sections with one value per line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load a table from any buffered reader.
    ///
    /// Blank lines are ignored. A value line before the first `##key`
    /// header is an error.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::new();
        let mut current: Option<String> = None;

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(key) = line.strip_prefix(KEY_MARKER) {
                let key = key.trim();
                if key.is_empty() {
                    return Err(GffError::MalformedFilterFile {
                        line: line_num + 1,
                        message: "Key header without a key name".to_string(),
                    });
                }
                table.section(key);
                current = Some(key.to_string());
                continue;
            }

            match current.as_deref() {
                Some(key) => table.insert(key, line),
                None => {
                    return Err(GffError::MalformedFilterFile {
                        line: line_num + 1,
                        message: format!("Value '{}' appears before any ##key header", line),
                    });
                }
            }
        }

        debug!(
            "Loaded attribute table with {} keys and {} values",
            table.len(),
            table.value_count()
        );
        Ok(table)
    }

    /// Parse a table from a string (useful for testing).
    pub fn parse(content: &str) -> Result<Self> {
        Self::from_reader(content.as_bytes())
    }

    /// Keys in the order they were first declared.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn allowed(&self, key: &str) -> Option<&FxHashSet<String>> {
        self.allowed.get(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Total number of accepted values across keys.
    pub fn value_count(&self) -> usize {
        self.allowed.values().map(FxHashSet::len).sum()
    }

    /// True when the feature holds some table key with an accepted value.
    ///
    /// A missing key is a plain non-match.
    pub fn matches(&self, feature: &Feature) -> bool {
        self.keys.iter().any(|key| {
            let Some(values) = feature.attributes.get(key) else {
                return false;
            };
            self.allowed
                .get(key)
                .is_some_and(|allowed| intersects(values, allowed))
        })
    }
}

/// Set-intersection test between a feature's values and accepted values.
#[inline]
pub fn intersects(values: &[String], allowed: &FxHashSet<String>) -> bool {
    values.iter().any(|v| allowed.contains(v))
}

/// Strand constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrandFilter {
    Plus,
    Minus,
}

impl StrandFilter {
    /// Fail-open: only a confirmed opposite strand is rejected.
    #[inline]
    pub fn accepts(&self, strand: Strand) -> bool {
        !matches!(
            (self, strand),
            (StrandFilter::Plus, Strand::Minus) | (StrandFilter::Minus, Strand::Plus)
        )
    }
}

impl FromStr for StrandFilter {
    type Err = GffError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plus" | "+" => Ok(StrandFilter::Plus),
            "minus" | "-" => Ok(StrandFilter::Minus),
            _ => Err(GffError::InvalidFormat(format!(
                "Invalid strand '{}'. Use: plus, minus",
                s
            ))),
        }
    }
}

/// Everything the nested filter can select on.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub strand: Option<StrandFilter>,
    /// Minimum 1-based start.
    pub min_start: Option<u64>,
    /// Maximum end (inclusive, same in both coordinate systems).
    pub max_end: Option<u64>,
    pub attributes: Option<AttributeFilterTable>,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strand(mut self, strand: StrandFilter) -> Self {
        self.strand = Some(strand);
        self
    }

    pub fn with_min_start(mut self, start: u64) -> Self {
        self.min_start = Some(start);
        self
    }

    pub fn with_max_end(mut self, end: u64) -> Self {
        self.max_end = Some(end);
        self
    }

    pub fn with_attributes(mut self, table: AttributeFilterTable) -> Self {
        self.attributes = Some(table);
        self
    }

    /// True when no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.strand.is_none()
            && self.min_start.is_none()
            && self.max_end.is_none()
            && self.attributes.is_none()
    }

    #[inline]
    fn has_bounds(&self) -> bool {
        self.min_start.is_some() || self.max_end.is_some()
    }
}

/// Strand and position test for one feature; attributes are not consulted.
///
/// Returns `MalformedFeature` when a position bound is set but the feature's
/// coordinates could not be parsed.
pub fn passes(feature: &Feature, criteria: &SelectionCriteria) -> Result<bool> {
    if let Some(strand) = criteria.strand {
        if !strand.accepts(feature.strand) {
            return Ok(false);
        }
    }

    if !criteria.has_bounds() {
        return Ok(true);
    }

    let (start, end) = match &feature.location {
        Location::Span { start, end } => (*start, *end),
        Location::Malformed { start, end } => {
            return Err(GffError::MalformedFeature {
                id: feature.tag("ID"),
                message: format!("coordinates '{}'..'{}' are not integers", start, end),
            });
        }
    };

    if let Some(min) = criteria.min_start {
        if start + 1 < min {
            return Ok(false);
        }
    }
    if let Some(max) = criteria.max_end {
        if end > max {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feature with 1-based closed coordinates, as written in a GFF3 file.
    fn feature(start1: u64, end: u64, strand: Strand) -> Feature {
        Feature::new("ctg1", "gene", start1 - 1, end).with_strand(strand)
    }

    #[test]
    fn test_load_table() {
        let table =
            AttributeFilterTable::parse("##product\nkinase\nphosphatase\n\n##ID\ng1\nkinase\n")
                .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["product", "ID"]);
        assert!(table.allowed("product").unwrap().contains("phosphatase"));
        assert_eq!(table.value_count(), 4);
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let table =
            AttributeFilterTable::parse("##product\nkinase\nkinase\n##product\nkinase\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.value_count(), 1);
    }

    #[test]
    fn test_value_before_key_is_fatal() {
        let result = AttributeFilterTable::parse("kinase\n##product\n");
        assert!(matches!(
            result,
            Err(GffError::MalformedFilterFile { line: 1, .. })
        ));
    }

    #[test]
    fn test_empty_key_header() {
        assert!(AttributeFilterTable::parse("##\nkinase\n").is_err());
    }

    #[test]
    fn test_table_matches() {
        let mut table = AttributeFilterTable::new();
        table.insert("product", "kinase");

        let hit = feature(1, 10, Strand::Plus).with_attribute("product", "kinase");
        let miss = feature(1, 10, Strand::Plus).with_attribute("product", "ligase");
        let absent = feature(1, 10, Strand::Plus).with_attribute("ID", "kinase");

        assert!(table.matches(&hit));
        assert!(!table.matches(&miss));
        assert!(!table.matches(&absent));
    }

    #[test]
    fn test_multi_valued_attribute_intersects() {
        let mut table = AttributeFilterTable::new();
        table.insert("Dbxref", "GO:2");
        let f = feature(1, 10, Strand::Plus)
            .with_attribute("Dbxref", "GO:1")
            .with_attribute("Dbxref", "GO:2");
        assert!(table.matches(&f));
    }

    #[test]
    fn test_strand_fail_open() {
        let plus = SelectionCriteria::new().with_strand(StrandFilter::Plus);
        let minus = SelectionCriteria::new().with_strand(StrandFilter::Minus);

        assert!(passes(&feature(1, 10, Strand::Plus), &plus).unwrap());
        assert!(passes(&feature(1, 10, Strand::Unknown), &plus).unwrap());
        assert!(!passes(&feature(1, 10, Strand::Minus), &plus).unwrap());

        assert!(passes(&feature(1, 10, Strand::Minus), &minus).unwrap());
        assert!(passes(&feature(1, 10, Strand::Unknown), &minus).unwrap());
        assert!(!passes(&feature(1, 10, Strand::Plus), &minus).unwrap());
    }

    #[test]
    fn test_position_bounds() {
        let criteria = SelectionCriteria::new().with_min_start(100).with_max_end(200);

        assert!(passes(&feature(150, 180, Strand::Plus), &criteria).unwrap());
        assert!(!passes(&feature(50, 90, Strand::Plus), &criteria).unwrap());
        assert!(!passes(&feature(100, 250, Strand::Plus), &criteria).unwrap());
        assert!(passes(&feature(100, 200, Strand::Plus), &criteria).unwrap());
        assert!(!passes(&feature(99, 200, Strand::Plus), &criteria).unwrap());
    }

    #[test]
    fn test_no_bounds_always_passes() {
        let mut f = feature(1, 10, Strand::Unknown);
        f.location = Location::Malformed {
            start: "x".to_string(),
            end: "y".to_string(),
        };
        assert!(passes(&f, &SelectionCriteria::new()).unwrap());
    }

    #[test]
    fn test_malformed_location_with_bounds() {
        let mut f = feature(1, 10, Strand::Plus).with_attribute("ID", "g1");
        f.location = Location::Malformed {
            start: "x".to_string(),
            end: "10".to_string(),
        };
        let criteria = SelectionCriteria::new().with_max_end(100);
        assert!(matches!(
            passes(&f, &criteria),
            Err(GffError::MalformedFeature { ref id, .. }) if id == "g1"
        ));
    }

    #[test]
    fn test_strand_filter_from_str() {
        assert_eq!("plus".parse::<StrandFilter>().unwrap(), StrandFilter::Plus);
        assert_eq!("-".parse::<StrandFilter>().unwrap(), StrandFilter::Minus);
        assert!("either".parse::<StrandFilter>().is_err());
    }
}

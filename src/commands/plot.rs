//! Plot command: SVG rendering of the features in a genomic window.
//!
//! Features are drawn as arrows pointing along their strand, packed into
//! lanes so that overlapping features never share a row. Several GFF3
//! files can be overlaid through a file of file names (`gff,label,color`
//! per line), each drawn in its own color with its own legend entry.

use crate::feature::{Record, Strand};
use crate::gff::{read_records, GffError, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use svg::node::element::path::Data;
use svg::node::element::{Line, Path as SvgPath, Rectangle, Text};
use svg::Document;

/// Pixels per unit of the width and height ratios.
const PX_PER_UNIT: f64 = 50.0;
const MARGIN: f64 = 40.0;
const LANE_HEIGHT: f64 = 36.0;
const FEATURE_HEIGHT: f64 = 14.0;
const AXIS_SPACE: f64 = 40.0;
const LEGEND_ROW: f64 = 18.0;
const LEGEND_WIDTH: f64 = 180.0;
const MAX_HEAD: f64 = 10.0;

/// One line of a file of file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FofnEntry {
    pub gff: PathBuf,
    pub label: String,
    pub color: String,
}

/// Parse a file of file names: `gff,label,color` per line.
pub fn load_fofn<P: AsRef<Path>>(path: P) -> Result<Vec<FofnEntry>> {
    let content = fs::read_to_string(path)?;
    parse_fofn(&content)
}

pub fn parse_fofn(content: &str) -> Result<Vec<FofnEntry>> {
    let mut entries = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.splitn(3, ',').map(str::trim).collect();
        if fields.len() < 3 {
            return Err(GffError::Parse {
                line: line_num + 1,
                message: format!("Expected 'gff,label,color', got '{}'", line),
            });
        }
        entries.push(FofnEntry {
            gff: PathBuf::from(fields[0]),
            label: fields[1].to_string(),
            color: fields[2].to_string(),
        });
    }
    Ok(entries)
}

/// A feature ready to draw. Coordinates are 1-based inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotFeature {
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub label: String,
}

/// Features from one source, drawn in one color.
#[derive(Debug, Clone)]
pub struct PlotTrack {
    pub label: String,
    pub color: String,
    pub features: Vec<PlotFeature>,
}

/// Plot command configuration.
#[derive(Debug, Clone)]
pub struct PlotCommand {
    pub contig: String,
    /// 1-based window start
    pub start: u64,
    /// 1-based inclusive window end
    pub end: u64,
    pub feature_types: Vec<String>,
    /// Attribute used for the feature labels
    pub identification: String,
    pub title: String,
    pub label: String,
    pub color: String,
    pub width: f64,
    pub height: f64,
}

impl PlotCommand {
    pub fn new(contig: impl Into<String>) -> Self {
        Self {
            contig: contig.into(),
            start: 1,
            end: 500,
            feature_types: vec!["gene".to_string()],
            identification: "ID".to_string(),
            title: "Gene Plot".to_string(),
            label: "Gene".to_string(),
            color: "#ccccff".to_string(),
            width: 20.0,
            height: 5.0,
        }
    }

    pub fn with_window(mut self, start: u64, end: u64) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_feature_types(mut self, types: Vec<String>) -> Self {
        self.feature_types = types;
        self
    }

    pub fn with_identification(mut self, key: impl Into<String>) -> Self {
        self.identification = key.into();
        self
    }

    pub fn with_legend(mut self, title: impl Into<String>, label: impl Into<String>) -> Self {
        self.title = title.into();
        self.label = label.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.start == 0 || self.start > self.end {
            return Err(GffError::InvalidFormat(format!(
                "Invalid window {}..{}: start must be >= 1 and <= end",
                self.start, self.end
            )));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(GffError::InvalidFormat(
                "Plot width and height must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Features of `records` on the contig, of a wanted type, inside the window.
    pub fn select_features(&self, records: &[Record]) -> Vec<PlotFeature> {
        records
            .iter()
            .filter(|record| record.id == self.contig)
            .flat_map(Record::flatten)
            .filter(|f| self.feature_types.iter().any(|t| *t == f.kind))
            .filter_map(|f| {
                let (start0, end) = f.location.span()?;
                let start = start0 + 1;
                (start >= self.start && end <= self.end).then(|| PlotFeature {
                    start,
                    end,
                    strand: f.strand,
                    label: f.tag(&self.identification),
                })
            })
            .collect()
    }

    /// Plot a single GFF3 file.
    pub fn run_single<P: AsRef<Path>, W: Write>(&self, input: P, output: &mut W) -> Result<usize> {
        self.validate()?;
        let records = read_records(input)?;
        let track = PlotTrack {
            label: self.label.clone(),
            color: self.color.clone(),
            features: self.select_features(&records),
        };
        self.write_svg(&[track], output)
    }

    /// Plot every file listed in a file of file names, in list order.
    pub fn run_fofn<P: AsRef<Path>, W: Write>(&self, fofn: P, output: &mut W) -> Result<usize> {
        self.validate()?;
        let entries = load_fofn(fofn)?;
        debug!("Plotting {} GFF files", entries.len());

        let tracks: Vec<PlotTrack> = entries
            .par_iter()
            .map(|entry| -> Result<PlotTrack> {
                let records = read_records(&entry.gff)?;
                Ok(PlotTrack {
                    label: entry.label.clone(),
                    color: entry.color.clone(),
                    features: self.select_features(&records),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.write_svg(&tracks, output)
    }

    fn write_svg<W: Write>(&self, tracks: &[PlotTrack], output: &mut W) -> Result<usize> {
        let count: usize = tracks.iter().map(|t| t.features.len()).sum();
        if count == 0 {
            warn!(
                "No {} features on {} between {} and {}",
                self.feature_types.join(","),
                self.contig,
                self.start,
                self.end
            );
        }
        let svg = self.render(tracks);
        output.write_all(svg.as_bytes())?;
        output.flush()?;
        info!("Plotted {} features", count);
        Ok(count)
    }

    /// Render tracks to an SVG document string.
    pub fn render(&self, tracks: &[PlotTrack]) -> String {
        let drawn: Vec<(&PlotFeature, &str)> = tracks
            .iter()
            .flat_map(|t| t.features.iter().map(move |f| (f, t.color.as_str())))
            .collect();
        let features: Vec<&PlotFeature> = drawn.iter().map(|(f, _)| *f).collect();
        let lanes = assign_lanes(&features);
        let lane_count = lanes.iter().max().map_or(1, |l| l + 1);

        let width = self.width * PX_PER_UNIT;
        let legend_height = LEGEND_ROW * (tracks.len() as f64 + 1.5);
        let lanes_height = LANE_HEIGHT * lane_count as f64;
        let height = (self.height * PX_PER_UNIT)
            .max(MARGIN * 2.0 + legend_height.max(lanes_height) + AXIS_SPACE);

        let scale = Scale {
            start: self.start,
            end: self.end,
            left: MARGIN,
            right: width - MARGIN - LEGEND_WIDTH,
        };
        let axis_y = height - MARGIN - AXIS_SPACE / 2.0;

        let mut doc = Document::new()
            .set("viewBox", (0, 0, width, height))
            .set("width", width)
            .set("height", height)
            .add(
                Rectangle::new()
                    .set("x", 0)
                    .set("y", 0)
                    .set("width", width)
                    .set("height", height)
                    .set("fill", "#ffffff"),
            );

        doc = doc.add(
            Line::new()
                .set("x1", scale.left)
                .set("y1", axis_y)
                .set("x2", scale.right)
                .set("y2", axis_y)
                .set("stroke", "#333333")
                .set("stroke-width", 1),
        );
        for tick in tick_positions(self.start, self.end) {
            let x = scale.x(tick);
            doc = doc
                .add(
                    Line::new()
                        .set("x1", x)
                        .set("y1", axis_y)
                        .set("x2", x)
                        .set("y2", axis_y + 5.0)
                        .set("stroke", "#333333")
                        .set("stroke-width", 1),
                )
                .add(
                    Text::new(tick.to_string())
                        .set("x", x)
                        .set("y", axis_y + 18.0)
                        .set("text-anchor", "middle")
                        .set("font-family", "sans-serif")
                        .set("font-size", 10)
                        .set("fill", "#333333"),
                );
        }

        for ((feature, color), lane) in drawn.iter().zip(&lanes) {
            let x1 = scale.x(feature.start);
            let x2 = scale.x(feature.end + 1).max(x1 + 1.0);
            let y = axis_y - AXIS_SPACE / 2.0 - LANE_HEIGHT * (*lane as f64 + 0.5);
            doc = doc
                .add(
                    SvgPath::new()
                        .set("d", arrow(x1, x2, y, feature.strand))
                        .set("fill", *color)
                        .set("stroke", "#000000")
                        .set("stroke-width", 0.5),
                )
                .add(
                    Text::new(feature.label.clone())
                        .set("x", (x1 + x2) / 2.0)
                        .set("y", y - FEATURE_HEIGHT / 2.0 - 3.0)
                        .set("text-anchor", "middle")
                        .set("font-family", "sans-serif")
                        .set("font-size", 10)
                        .set("fill", "#000000"),
                );
        }

        let legend_x = width - MARGIN - LEGEND_WIDTH + 10.0;
        doc = doc
            .add(
                Rectangle::new()
                    .set("x", legend_x)
                    .set("y", MARGIN)
                    .set("width", LEGEND_WIDTH - 10.0)
                    .set("height", legend_height)
                    .set("rx", 4)
                    .set("ry", 4)
                    .set("fill", "#ffffff")
                    .set("stroke", "#999999"),
            )
            .add(
                Text::new(self.title.clone())
                    .set("x", legend_x + 8.0)
                    .set("y", MARGIN + LEGEND_ROW)
                    .set("font-family", "sans-serif")
                    .set("font-size", 12)
                    .set("font-weight", "bold")
                    .set("fill", "#000000"),
            );
        for (i, track) in tracks.iter().enumerate() {
            let y = MARGIN + LEGEND_ROW * (i as f64 + 1.5);
            doc = doc
                .add(
                    Rectangle::new()
                        .set("x", legend_x + 8.0)
                        .set("y", y)
                        .set("width", 16)
                        .set("height", 10)
                        .set("fill", track.color.as_str())
                        .set("stroke", "#000000")
                        .set("stroke-width", 0.5),
                )
                .add(
                    Text::new(track.label.clone())
                        .set("x", legend_x + 30.0)
                        .set("y", y + 9.0)
                        .set("font-family", "sans-serif")
                        .set("font-size", 11)
                        .set("fill", "#000000"),
                );
        }

        doc.to_string()
    }
}

/// Linear map from genome positions to x pixels.
struct Scale {
    start: u64,
    end: u64,
    left: f64,
    right: f64,
}

impl Scale {
    fn x(&self, pos: u64) -> f64 {
        let span = (self.end - self.start + 1) as f64;
        let offset = pos.saturating_sub(self.start) as f64;
        self.left + offset / span * (self.right - self.left)
    }
}

/// Outline of a feature: an arrow along the strand, a box when unknown.
fn arrow(x1: f64, x2: f64, y: f64, strand: Strand) -> Data {
    let half = FEATURE_HEIGHT / 2.0;
    let head = MAX_HEAD.min((x2 - x1) / 2.0);
    match strand {
        Strand::Plus => Data::new()
            .move_to((x1, y - half))
            .line_to((x2 - head, y - half))
            .line_to((x2, y))
            .line_to((x2 - head, y + half))
            .line_to((x1, y + half))
            .close(),
        Strand::Minus => Data::new()
            .move_to((x2, y - half))
            .line_to((x1 + head, y - half))
            .line_to((x1, y))
            .line_to((x1 + head, y + half))
            .line_to((x2, y + half))
            .close(),
        Strand::Unknown => Data::new()
            .move_to((x1, y - half))
            .line_to((x2, y - half))
            .line_to((x2, y + half))
            .line_to((x1, y + half))
            .close(),
    }
}

/// Greedy lane packing: each feature takes the lowest lane whose last
/// feature ends before it starts. Returns the lane of each input feature.
pub fn assign_lanes(features: &[&PlotFeature]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..features.len()).collect();
    order.sort_by_key(|&i| (features[i].start, features[i].end));

    let mut lane_ends: Vec<u64> = Vec::new();
    let mut lanes = vec![0; features.len()];
    for i in order {
        let feature = features[i];
        let lane = match lane_ends.iter().position(|&end| end < feature.start) {
            Some(lane) => lane,
            None => {
                lane_ends.push(0);
                lane_ends.len() - 1
            }
        };
        lane_ends[lane] = feature.end;
        lanes[i] = lane;
    }
    lanes
}

/// Round tick positions (1, 2 or 5 times a power of ten) inside the window.
pub fn tick_positions(start: u64, end: u64) -> Vec<u64> {
    let span = end.saturating_sub(start) + 1;
    let raw = (span as f64 / 10.0).max(1.0);
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|&s| s >= raw)
        .unwrap_or(magnitude * 10.0) as u64;
    let step = step.max(1);

    let first = start.div_ceil(step) * step;
    let mut ticks: Vec<u64> = (first..=end).step_by(step as usize).collect();
    if ticks.first() != Some(&start) {
        ticks.insert(0, start);
    }
    ticks
}

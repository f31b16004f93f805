//! Buffered GFF3 output.
//!
//! Uses itoa for coordinate formatting to avoid allocation per line.

use crate::feature::{Feature, Location, Record};
use crate::gff::GffError;
use std::io::{BufWriter, Write};

/// Buffer size for GffWriter (1MB default).
const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Line width used for sequences in the `##FASTA` section.
const FASTA_LINE_WIDTH: usize = 60;

/// GFF3 writer.
pub struct GffWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
    header_written: bool,
}

impl<W: Write> GffWriter<W> {
    /// Create a new GffWriter with default 1MB buffer.
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    /// Create a new GffWriter with specified buffer size.
    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
            header_written: false,
        }
    }

    /// Write the `##gff-version 3` header once.
    pub fn write_header(&mut self) -> Result<(), GffError> {
        if !self.header_written {
            self.writer.write_all(b"##gff-version 3\n")?;
            self.header_written = true;
        }
        Ok(())
    }

    /// Write a `##sequence-region` pragma when the record length is known.
    pub fn write_sequence_region(&mut self, record: &Record) -> Result<(), GffError> {
        if let Some(len) = record.len() {
            self.writer.write_all(b"##sequence-region ")?;
            self.writer.write_all(record.id.as_bytes())?;
            self.writer.write_all(b" 1 ")?;
            self.writer.write_all(self.itoa_buf.format(len).as_bytes())?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Write one feature line followed by its descendants, depth-first.
    pub fn write_feature(&mut self, feature: &Feature) -> Result<(), GffError> {
        self.write_feature_line(feature)?;
        for child in &feature.children {
            self.write_feature(child)?;
        }
        Ok(())
    }

    fn write_feature_line(&mut self, feature: &Feature) -> Result<(), GffError> {
        let w = &mut self.writer;
        w.write_all(feature.seqid.as_bytes())?;
        w.write_all(b"\t")?;
        w.write_all(feature.source.as_bytes())?;
        w.write_all(b"\t")?;
        w.write_all(feature.kind.as_bytes())?;
        w.write_all(b"\t")?;
        match &feature.location {
            Location::Span { start, end } => {
                w.write_all(self.itoa_buf.format(start + 1).as_bytes())?;
                w.write_all(b"\t")?;
                w.write_all(self.itoa_buf.format(*end).as_bytes())?;
            }
            Location::Malformed { start, end } => {
                w.write_all(start.as_bytes())?;
                w.write_all(b"\t")?;
                w.write_all(end.as_bytes())?;
            }
        }
        writeln!(
            w,
            "\t{}\t{}\t{}\t{}",
            feature.score.as_deref().unwrap_or("."),
            feature.strand,
            feature.phase.as_deref().unwrap_or("."),
            feature.attributes
        )?;
        Ok(())
    }

    /// Write a record's region pragma and all of its features.
    pub fn write_record(&mut self, record: &Record) -> Result<(), GffError> {
        self.write_header()?;
        self.write_sequence_region(record)?;
        for feature in &record.features {
            self.write_feature(feature)?;
        }
        Ok(())
    }

    /// Write the `##FASTA` section for records that carry a sequence.
    pub fn write_fasta_section(&mut self, records: &[Record]) -> Result<(), GffError> {
        let mut opened = false;
        for record in records {
            let Some(seq) = record.sequence.as_ref() else {
                continue;
            };
            if !opened {
                self.writer.write_all(b"##FASTA\n")?;
                opened = true;
            }
            self.writer.write_all(b">")?;
            self.writer.write_all(record.id.as_bytes())?;
            self.writer.write_all(b"\n")?;
            for chunk in seq.chunks(FASTA_LINE_WIDTH) {
                self.writer.write_all(chunk)?;
                self.writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    /// Flush the output buffer.
    pub fn flush(&mut self) -> Result<(), GffError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Write records as a complete GFF3 document.
pub fn write_records<W: Write>(
    output: W,
    records: &[Record],
    with_fasta: bool,
) -> Result<(), GffError> {
    let mut writer = GffWriter::new(output);
    writer.write_header()?;
    for record in records {
        writer.write_record(record)?;
    }
    if with_fasta {
        writer.write_fasta_section(records)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Strand;

    fn sample_record() -> Record {
        let gene = Feature::new("ctg1", "gene", 9, 50)
            .with_strand(Strand::Plus)
            .with_attribute("ID", "g1")
            .with_child(
                Feature::new("ctg1", "mRNA", 9, 50)
                    .with_strand(Strand::Plus)
                    .with_attribute("ID", "m1")
                    .with_attribute("Parent", "g1"),
            );
        Record::new("ctg1").with_features(vec![gene])
    }

    #[test]
    fn test_write_record() {
        let mut output = Vec::new();
        write_records(&mut output, &[sample_record()], false).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(
            text,
            "##gff-version 3\n\
             ctg1\t.\tgene\t10\t50\t.\t+\t.\tID=g1\n\
             ctg1\t.\tmRNA\t10\t50\t.\t+\t.\tID=m1;Parent=g1\n"
        );
    }

    #[test]
    fn test_header_written_once() {
        let mut output = Vec::new();
        {
            let mut writer = GffWriter::new(&mut output);
            writer.write_header().unwrap();
            writer.write_record(&sample_record()).unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("##gff-version").count(), 1);
    }

    #[test]
    fn test_fasta_section_and_region() {
        let mut record = sample_record();
        record.sequence = Some(b"ACGT".repeat(20));
        let mut output = Vec::new();
        write_records(&mut output, &[record], true).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("##sequence-region ctg1 1 80\n"));
        assert!(text.contains("##FASTA\n>ctg1\n"));
        // 80 bases wrap into a 60 + 20 split
        let seq_lines: Vec<&str> = text.lines().skip_while(|l| *l != ">ctg1").skip(1).collect();
        assert_eq!(seq_lines.len(), 2);
        assert_eq!(seq_lines[0].len(), 60);
    }

    #[test]
    fn test_malformed_location_written_verbatim() {
        let mut feature = Feature::new("ctg1", "gene", 0, 1);
        feature.location = Location::Malformed {
            start: "1O".to_string(),
            end: "50".to_string(),
        };
        let mut output = Vec::new();
        write_records(&mut output, &[Record::new("ctg1").with_features(vec![feature])], false)
            .unwrap();
        assert!(String::from_utf8(output).unwrap().contains("\t1O\t50\t"));
    }
}

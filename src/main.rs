// Clippy allows
#![allow(clippy::too_many_arguments)]

//! gfftk: GFF3 annotation toolbox
//!
//! Usage: gfftk <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use log::{debug, LevelFilter};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process;

use gfftk::commands::{
    AskStoreCommand, ConvertCommand, ConvertFormat, FilterCommand, IngestCommand, OverviewCommand,
    PatternFilterCommand, PlotCommand, StoreQuery,
};
use gfftk::gff::GffError;
use gfftk::selection::{AttributeFilterTable, SelectionCriteria, StrandFilter};

#[derive(Parser)]
#[command(name = "gfftk")]
#[command(version)]
#[command(
    about = "gfftk: filter, summarize, convert and plot GFF3 annotation files",
    long_about = None
)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// Treat malformed coordinates, strands and attributes as errors
    /// instead of logging and recovering
    #[arg(long, global = true)]
    strict: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    /// RUST_LOG overrides this.
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter features by column pattern, or by nested attribute values with --exact
    Filter {
        /// Input GFF3 file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Pattern to search for (repeatable)
        #[arg(short, long)]
        pattern: Vec<String>,

        /// File with one pattern per line
        #[arg(short, long)]
        list: Option<PathBuf>,

        /// Column to search (1-9)
        #[arg(short, long, default_value = "9")]
        column: usize,

        /// Attribute field searched when the column is 9
        #[arg(short, long, default_value = "ID")]
        field: String,

        /// Sort output lines by start position
        #[arg(long)]
        sort: bool,

        /// Exact mode: nested attribute, strand and position filter
        #[arg(long)]
        exact: bool,

        /// Attribute table (##key sections, one value per line)
        #[arg(short, long, requires = "exact")]
        attributes: Option<PathBuf>,

        /// Keep only features on this strand (unknown strand always passes)
        #[arg(long, value_parser = ["plus", "minus"], requires = "exact")]
        strand: Option<String>,

        /// Minimum 1-based start position
        #[arg(long, requires = "exact")]
        start: Option<u64>,

        /// Maximum end position
        #[arg(long, requires = "exact")]
        end: Option<u64>,

        /// Write records left without features
        #[arg(long, requires = "exact")]
        keep_empty: bool,

        /// Append the ##FASTA section of the kept records
        #[arg(long, requires = "exact")]
        with_fasta: bool,

        /// Print filter statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Summarize a GFF3 file: counts per seqid, source, type and attribute key
    Overview {
        /// Input GFF3 file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print counts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert GFF3 to another format
    Convert {
        /// Input GFF3 file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output format
        #[arg(
            short,
            long,
            default_value = "json",
            value_parser = ["json", "fasta", "genbank", "gff", "store"]
        )]
        format: String,

        /// Attribute used as JSON key and FASTA header
        #[arg(long, default_value = "ID")]
        id: String,

        /// FASTA file with the record sequences
        #[arg(long)]
        fasta: Option<PathBuf>,

        /// Comma-separated feature types written to FASTA (default: all)
        #[arg(long, value_delimiter = ',')]
        feature_type: Vec<String>,

        /// Store database name
        #[arg(short = 'd', long, default_value = "annotation_db")]
        db_name: String,

        /// Store collection name
        #[arg(short = 'n', long, default_value = "Genome")]
        collection: String,

        /// Store directory
        #[arg(short = 'p', long, default_value = "./store")]
        store_path: PathBuf,

        /// Print conversion statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Add tabular annotations (locusName, Id, IdType, description) to a stored collection
    Ingest {
        /// Annotation TSV (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Feature type to annotate
        #[arg(short = 'l', long, default_value = "gene")]
        feature_type: String,

        /// Store database name
        #[arg(short = 'd', long, default_value = "annotation_db")]
        db_name: String,

        /// Store collection name
        #[arg(short = 'n', long, default_value = "Genome")]
        collection: String,

        /// Store directory
        #[arg(short = 'p', long, default_value = "./store")]
        store_path: PathBuf,

        /// The first line is data, not a header
        #[arg(long)]
        no_header: bool,

        /// Print ingest statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// List databases or collections of the document store
    AskStore {
        /// Store directory
        #[arg(short = 'p', long, default_value = "./store")]
        store_path: PathBuf,

        /// List databases
        #[arg(
            long,
            conflicts_with = "list_collections",
            required_unless_present = "list_collections"
        )]
        list_dbs: bool,

        /// List collections of a database
        #[arg(long, value_name = "DB")]
        list_collections: Option<String>,
    },

    /// Render the features of a genomic window as SVG
    Plot {
        /// Input GFF3 file
        #[arg(short, long, conflicts_with = "fofn", required_unless_present = "fofn")]
        input: Option<PathBuf>,

        /// CSV file of gff,label,color lines
        #[arg(long)]
        fofn: Option<PathBuf>,

        /// Contig to plot
        #[arg(long)]
        contig: String,

        /// Window start (1-based)
        #[arg(long, default_value = "1")]
        start: u64,

        /// Window end (inclusive)
        #[arg(long, default_value = "500")]
        end: u64,

        /// Comma-separated feature types to draw
        #[arg(long, value_delimiter = ',', default_value = "gene")]
        feature: Vec<String>,

        /// Attribute used as feature label
        #[arg(long, default_value = "ID")]
        identification: String,

        /// Legend title
        #[arg(long, default_value = "Gene Plot")]
        title: String,

        /// Legend label for single-file plots
        #[arg(short, long, default_value = "Gene")]
        label: String,

        /// Feature color for single-file plots
        #[arg(long, default_value = "#ccccff")]
        color: String,

        /// Plot width ratio
        #[arg(long, default_value = "20")]
        width: f64,

        /// Plot height ratio
        #[arg(long, default_value = "5")]
        height: f64,

        /// Output SVG file
        #[arg(short, long, default_value = "out.svg")]
        output: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Must be set before any parsing occurs
    if cli.strict {
        gfftk::config::set_strict(true);
    }

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
        {
            eprintln!("Error: failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Filter {
            input,
            pattern,
            list,
            column,
            field,
            sort,
            exact,
            attributes,
            strand,
            start,
            end,
            keep_empty,
            with_fasta,
            stats,
        } => {
            if exact {
                run_filter_exact(
                    input, attributes, strand, start, end, keep_empty, with_fasta, stats,
                )
            } else {
                run_filter_pattern(input, pattern, list, column, field, sort, stats)
            }
        }

        Commands::Overview { input, json } => run_overview(input, json),

        Commands::Convert {
            input,
            format,
            id,
            fasta,
            feature_type,
            db_name,
            collection,
            store_path,
            stats,
        } => run_convert(
            input,
            format,
            id,
            fasta,
            feature_type,
            db_name,
            collection,
            store_path,
            stats,
        ),

        Commands::Ingest {
            input,
            feature_type,
            db_name,
            collection,
            store_path,
            no_header,
            stats,
        } => run_ingest(
            input,
            feature_type,
            db_name,
            collection,
            store_path,
            no_header,
            stats,
        ),

        Commands::AskStore {
            store_path,
            list_dbs,
            list_collections,
        } => run_ask_store(store_path, list_dbs, list_collections),

        Commands::Plot {
            input,
            fofn,
            contig,
            start,
            end,
            feature,
            identification,
            title,
            label,
            color,
            width,
            height,
            output,
        } => run_plot(
            input,
            fofn,
            contig,
            start,
            end,
            feature,
            identification,
            title,
            label,
            color,
            width,
            height,
            output,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// `None` and `-` both mean stdin.
fn input_or_stdin(input: Option<PathBuf>) -> PathBuf {
    input.unwrap_or_else(|| PathBuf::from("-"))
}

fn run_filter_exact(
    input: Option<PathBuf>,
    attributes: Option<PathBuf>,
    strand: Option<String>,
    start: Option<u64>,
    end: Option<u64>,
    keep_empty: bool,
    with_fasta: bool,
    stats: bool,
) -> Result<(), GffError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    // The table is loaded before any GFF input is read
    let mut criteria = SelectionCriteria::new();
    if let Some(path) = attributes {
        criteria = criteria.with_attributes(AttributeFilterTable::from_file(&path)?);
    }
    if let Some(strand) = strand {
        criteria = criteria.with_strand(strand.parse::<StrandFilter>()?);
    }
    if let Some(start) = start {
        criteria = criteria.with_min_start(start);
    }
    if let Some(end) = end {
        criteria = criteria.with_max_end(end);
    }
    if criteria.is_empty() {
        debug!("No selection criteria given, records pass through unchanged");
    }

    let cmd = FilterCommand::new()
        .with_criteria(criteria)
        .with_keep_empty(keep_empty)
        .with_fasta(with_fasta);

    let input = input_or_stdin(input);
    let result = if input.to_string_lossy() == "-" {
        cmd.run_stdin(&mut handle)?
    } else {
        cmd.run(&input, &mut handle)?
    };

    if stats {
        eprintln!("Filter stats: {}", result);
    }
    Ok(())
}

fn run_filter_pattern(
    input: Option<PathBuf>,
    pattern: Vec<String>,
    list: Option<PathBuf>,
    column: usize,
    field: String,
    sort: bool,
    stats: bool,
) -> Result<(), GffError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let mut patterns = pattern;
    if let Some(path) = list {
        patterns.extend(PatternFilterCommand::load_patterns(&path)?);
    }

    let cmd = PatternFilterCommand::new()
        .with_patterns(patterns)
        .with_column(column)
        .with_field(field)
        .with_sort(sort);

    let result = cmd.run(input.as_deref(), &mut handle)?;
    if stats {
        eprintln!("Pattern filter stats: {}", result);
    }
    Ok(())
}

fn run_overview(input: Option<PathBuf>, json: bool) -> Result<(), GffError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    OverviewCommand::new()
        .with_json(json)
        .run(input_or_stdin(input), &mut handle)?;
    Ok(())
}

fn run_convert(
    input: Option<PathBuf>,
    format: String,
    id: String,
    fasta: Option<PathBuf>,
    feature_type: Vec<String>,
    db_name: String,
    collection: String,
    store_path: PathBuf,
    stats: bool,
) -> Result<(), GffError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let cmd = ConvertCommand::new()
        .with_format(format.parse::<ConvertFormat>()?)
        .with_id_attribute(id)
        .with_fasta(fasta)
        .with_feature_types(feature_type)
        .with_store(store_path, db_name, collection);

    let result = cmd.run(input_or_stdin(input), &mut handle)?;
    if stats {
        eprintln!("Convert stats: {}", result);
    }
    Ok(())
}

fn run_ingest(
    input: Option<PathBuf>,
    feature_type: String,
    db_name: String,
    collection: String,
    store_path: PathBuf,
    no_header: bool,
    stats: bool,
) -> Result<(), GffError> {
    let cmd = IngestCommand::new()
        .with_feature_type(feature_type)
        .with_store(store_path, db_name, collection)
        .with_header(!no_header);

    let result = cmd.run(input.as_deref())?;
    if stats {
        eprintln!("Ingest stats: {}", result);
    }
    Ok(())
}

fn run_ask_store(
    store_path: PathBuf,
    list_dbs: bool,
    list_collections: Option<String>,
) -> Result<(), GffError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let query = match list_collections {
        Some(db) => StoreQuery::Collections(db),
        None if list_dbs => StoreQuery::Databases,
        None => {
            return Err(GffError::InvalidFormat(
                "Use --list-dbs or --list-collections <DB>".to_string(),
            ));
        }
    };
    AskStoreCommand::new(store_path, query).run(&mut handle)?;
    Ok(())
}

fn run_plot(
    input: Option<PathBuf>,
    fofn: Option<PathBuf>,
    contig: String,
    start: u64,
    end: u64,
    feature: Vec<String>,
    identification: String,
    title: String,
    label: String,
    color: String,
    width: f64,
    height: f64,
    output: PathBuf,
) -> Result<(), GffError> {
    let cmd = PlotCommand::new(contig)
        .with_window(start, end)
        .with_feature_types(feature)
        .with_identification(identification)
        .with_legend(title, label)
        .with_color(color)
        .with_size(width, height);

    let mut writer = BufWriter::new(File::create(&output)?);
    let count = match (fofn, input) {
        (Some(fofn), _) => cmd.run_fofn(&fofn, &mut writer)?,
        (None, Some(input)) => cmd.run_single(&input, &mut writer)?,
        (None, None) => {
            return Err(GffError::InvalidFormat("Use --input or --fofn".to_string()));
        }
    };
    debug!("Wrote {} features to {}", count, output.display());
    Ok(())
}

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kmerscan::errors::IndexResult;
use kmerscan::io::{open_input, open_output};
use kmerscan::{
    BuildConfigBuilder, CancellationToken, IndexBuilder, OutputFormat, ProteinSearcher,
    ProteomeIndex, ResultWriter, SearchConfigBuilder, SequenceType,
};

#[derive(Parser)]
#[command(name = "kmerscan")]
#[command(about = "Protein k-mer search against UniProtKB-derived databases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a database, one shard per UniProtKB TSV file
    Makedb {
        /// Input TSV files or directories of *.tsv / *.tsv.gz files
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output database directory
        #[arg(short, long)]
        output: PathBuf,

        /// K-mer size
        #[arg(short, long, default_value = "7")]
        ksize: u32,

        /// Number of shards built concurrently (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Worker threads per shard
        #[arg(long, default_value = "2")]
        workers: usize,

        /// Progress notification interval (number of proteins between progress reports)
        #[arg(short, long, default_value = "10000")]
        progress_interval: u64,
    },
    /// Search query sequences against a database
    Search {
        /// Database directory
        #[arg(short, long)]
        db: PathBuf,

        /// Query file (FASTA or FASTQ, plain or gzip); `-` reads stdin
        #[arg(short, long)]
        query: PathBuf,

        /// Kind of query sequences
        #[arg(short = 'T', long = "type", default_value = "protein")]
        sequence_type: QueryType,

        /// Output format
        #[arg(short, long, default_value = "tsv")]
        format: Format,

        /// Maximum number of hits per query
        #[arg(short, long, default_value = "10")]
        max_results: usize,

        /// Minimum fraction of query k-mers a hit must share
        #[arg(long, default_value = "0.2")]
        min_ratio: f64,

        /// Report the matched query positions of each hit
        #[arg(long, default_value = "false")]
        positions: bool,

        /// Report the full annotations of each hit
        #[arg(short, long, default_value = "false")]
        annotations: bool,

        /// Number of queries searched concurrently (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print database statistics as JSON
    Stats {
        /// Database directory
        #[arg(short, long)]
        db: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum QueryType {
    Protein,
    Nucleotide,
    Reads,
}

impl From<QueryType> for SequenceType {
    fn from(kind: QueryType) -> Self {
        match kind {
            QueryType::Protein => SequenceType::Protein,
            QueryType::Nucleotide => SequenceType::Nucleotide,
            QueryType::Reads => SequenceType::Reads,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Tsv,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Tsv => OutputFormat::Tsv,
            Format::Json => OutputFormat::Json,
        }
    }
}

fn main() -> IndexResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Makedb { input, output, ksize, threads, workers, progress_interval } => {
            let mut builder = BuildConfigBuilder::new(output)
                .ksize(ksize)?
                .workers(workers)
                .progress_interval(progress_interval);
            if let Some(threads) = threads {
                builder = builder.num_threads(threads);
            }
            let config = builder.build()?;

            let inputs = IndexBuilder::collect_inputs(&input)?;
            info!(
                files = inputs.len(),
                ksize = config.ksize.get(),
                output = %config.db_path.display(),
                "building database"
            );
            let report = IndexBuilder::new(config)?.build(&inputs)?;

            let proteins: u64 = report.shards.iter().map(|s| s.stats.proteins).sum();
            info!(shards = report.shards.len(), proteins, "database built");
            for rejected in &report.rejected {
                tracing::warn!(input = %rejected.source.display(), reason = %rejected.reason, "input skipped");
            }
        }
        Commands::Search {
            db,
            query,
            sequence_type,
            format,
            max_results,
            min_ratio,
            positions,
            annotations,
            threads,
            output,
        } => {
            let mut builder = SearchConfigBuilder::new()
                .min_ratio(min_ratio)?
                .max_results(max_results)
                .extract_positions(positions)
                .annotations(annotations)
                .sequence_type(sequence_type.into())
                .output_format(format.into());
            if let Some(threads) = threads {
                builder = builder.num_threads(threads);
            }
            let config = builder.build()?;

            let searcher = ProteinSearcher::load(&db, config)?;
            let (input, content) = open_input(&query)?;
            info!(query = %query.display(), content = %content, "reading queries");

            let mut writer = ResultWriter::new(
                open_output(output.as_ref())?,
                format.into(),
                annotations,
                positions,
            )?;
            let outcome = searcher.run(input, &mut writer, &CancellationToken::new());
            // The output is closed even when the search fails
            let closed = writer.finish().and_then(|mut out| Ok(out.flush()?));
            outcome?;
            closed?;
        }
        Commands::Stats { db } => {
            let index = ProteomeIndex::open(&db)?;
            let stats = index.stats()?;
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &stats)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}

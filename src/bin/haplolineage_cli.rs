use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use haplolineage::{
    build_abundance_report, AbundanceRequest, AbundanceScale, ImportMode, ImportOptions, Rank,
    ReportDialect, SampleCollection, TaxonomyLayout,
};

#[derive(Parser, Debug)]
#[command(name = "haplolineage")]
#[command(version)]
#[command(about = "Haplotype lineage and per-rank abundance from metabarcoding pipeline outputs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import every sample (or the listed ones) of a pipeline output directory
    Import {
        directory: PathBuf,

        /// Collection file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Import exactly these sample ids instead of discovering them
        #[arg(short, long, num_args = 1..)]
        samples: Option<Vec<String>>,

        /// Add to an existing collection file instead of starting empty
        #[arg(long)]
        append: bool,

        /// Replace samples already in the collection
        #[arg(long)]
        replace: bool,

        #[arg(long)]
        overwrite: bool,

        /// Reports use the historical otu/Otu<k> dialect
        #[arg(long)]
        otu: bool,

        /// Parse samples one after another
        #[arg(long)]
        sequential: bool,

        /// Column holding the species field of the taxonomy table
        #[arg(long, default_value_t = 1)]
        taxonomy_offset: usize,
    },
    /// Merge two collections, keeping the first one's samples on id clashes
    Merge {
        first: PathBuf,
        second: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        overwrite: bool,
    },
    /// Check lineage invariants of every sample
    Check { collection: PathBuf },
    /// Write a zero-filled long-form abundance table
    Abundance {
        collection: PathBuf,

        #[arg(short, long, default_value = "genus")]
        rank: String,

        #[arg(short, long, default_value = "species")]
        unit: String,

        /// Per-sample percentages instead of reads
        #[arg(long)]
        percent: bool,

        #[arg(long, default_value_t = 0)]
        min_occurrence: usize,

        /// Tab-separated sample metadata to join onto every row
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .expect("Invalid spinner template"),
    );
    spinner.set_message(msg.to_string());
    spinner
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            directory,
            output,
            samples,
            append,
            replace,
            overwrite,
            otu,
            sequential,
            taxonomy_offset,
        } => {
            SampleCollection::check_save_target(&output, overwrite || append)?;
            let mut collection = if append && output.exists() {
                SampleCollection::open(&output)?
            } else {
                SampleCollection::new()
            };
            let options = ImportOptions {
                dialect: if otu {
                    ReportDialect::Otu
                } else {
                    ReportDialect::Zotu
                },
                taxonomy: TaxonomyLayout {
                    block_offset: taxonomy_offset,
                },
                sequential,
                ..ImportOptions::default()
            };
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::SkipExisting
            };

            let sp = spinner("green", &format!("Importing samples from {}...", directory.display()));
            let report =
                collection.import_data(&directory, samples.as_deref(), &options, mode)?;
            sp.finish_with_message(format!(
                "Imported {} sample(s), skipped {}, {} warning(s).",
                report.imported.len(),
                report.skipped.len(),
                report.warnings.len()
            ));

            let sp = spinner("yellow", "Writing collection...");
            collection.save(&output, overwrite || append)?;
            sp.finish_with_message(format!("Collection written to {}.", output.display()));
        }
        Commands::Merge {
            first,
            second,
            output,
            overwrite,
        } => {
            SampleCollection::check_save_target(&output, overwrite)?;
            let mut merged = SampleCollection::open(&first)?;
            let warnings = merged.merge(SampleCollection::open(&second)?);
            merged.save(&output, overwrite)?;
            eprintln!(
                "Merged into {} sample(s), {} duplicate id(s) kept from {}.",
                merged.len(),
                warnings.len(),
                first.display()
            );
        }
        Commands::Check { collection } => {
            let collection = SampleCollection::open(&collection)?;
            let mut failing = 0;
            for sample in collection.samples() {
                let issues = sample.check_lineage();
                if issues.is_empty() {
                    continue;
                }
                failing += 1;
                for issue in issues {
                    println!("{}\t{:?}", sample.sample_id(), issue);
                }
            }
            eprintln!(
                "{} of {} sample(s) violate lineage invariants.",
                failing,
                collection.len()
            );
            if failing > 0 {
                std::process::exit(1);
            }
        }
        Commands::Abundance {
            collection,
            rank,
            unit,
            percent,
            min_occurrence,
            metadata,
            output,
        } => {
            let mut collection = SampleCollection::open(&collection)?;
            if let Some(path) = &metadata {
                collection.load_metadata_table(path)?;
            }
            let request = AbundanceRequest {
                target_rank: rank.parse::<Rank>()?,
                unit_rank: unit.parse::<Rank>()?,
                scale: if percent {
                    AbundanceScale::Percent
                } else {
                    AbundanceScale::Reads
                },
                min_occurrence,
                with_metadata: metadata.is_some(),
            };

            let sp = spinner("cyan", "Aggregating abundance...");
            let report = build_abundance_report(&collection, &request)?;
            sp.finish_with_message(format!("{} row(s).", report.rows.len()));

            let text = report.get_long_form_text();
            match output {
                Some(path) => fs::write(&path, text)?,
                None => print!("{text}"),
            }
        }
    }
    Ok(())
}

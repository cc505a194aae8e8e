use clap::Parser;
use chrono::Datelike;
use lazy_static::lazy_static;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use crate::pedigree_dp::{DEFAULT_MAX_STATE_BITS, MAX_SUPPORTED_STATE_BITS};
use crate::phaser::PhaseConfig;

lazy_static! {
    /// Stores the full version string we plan to use.
    /// # Examples
    /// * `0.3.0-6bb9635-dirty` - while on a dirty branch
    /// * `0.3.0-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));
}

#[derive(Clone, Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about,
    after_help = format!("Copyright (C) 2004-{}     Pacific Biosciences of California, Inc.
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year()))]
pub struct Settings {
    /// Input read allele table (read_name, sample, chrom, position, allele, quality)
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub read_filenames: Vec<PathBuf>,

    /// Input genotype table (chrom, position, sample, genotype, optional probabilities)
    #[clap(required = true)]
    #[clap(short = 'g')]
    #[clap(long = "genotypes")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub genotype_filename: PathBuf,

    /// Input pedigree in PED format (default: every sample is phased on its own)
    #[clap(long = "ped")]
    #[clap(value_name = "PED")]
    #[clap(help_heading = Some("Input/Output"))]
    pub ped_filename: Option<PathBuf>,

    /// Input genetic map table (chrom, position, centimorgans)
    #[clap(long = "genmap")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub genmap_filename: Option<PathBuf>,

    /// Output phased blocks file (csv/tsv)
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-blocks")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub blocks_filename: PathBuf,

    /// Output read assignment file (optional, csv/tsv)
    #[clap(long = "read-list")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub read_list_filename: Option<PathBuf>,

    /// Output recombination events file (optional, csv/tsv)
    #[clap(long = "recombination-list")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub recombination_filename: Option<PathBuf>,

    /// Output algorithmic statistics file (optional, csv/tsv)
    #[clap(long = "stats-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub stats_filename: Option<PathBuf>,

    /// Number of threads to use for phasing
    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Sets a maximum number of selected reads covering any variant, per sample
    #[clap(long = "max-coverage")]
    #[clap(value_name = "READS")]
    #[clap(default_value = "15")]
    #[clap(help_heading = Some("Read Selection"))]
    pub max_coverage: u32,

    /// Sets a minimum number of observed variants required for a read to get selected
    #[clap(long = "min-read-variants")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "2")]
    #[clap(help_heading = Some("Read Selection"))]
    pub min_read_variants: usize,

    /// Disables splitting a family into separate regions where no read spans two variants
    #[clap(long = "no-region-split")]
    #[clap(help_heading = Some("Region Generation"))]
    pub disable_region_split: bool,

    /// Allows the phasing to change genotypes, at a cost derived from genotype likelihoods
    #[clap(long = "distrust-genotypes")]
    #[clap(help_heading = Some("Phasing"))]
    pub distrust_genotypes: bool,

    /// Sets the genotype quality assumed for calls without likelihoods when genotypes are distrusted
    #[clap(long = "default-gq")]
    #[clap(value_name = "GQ")]
    #[clap(default_value = "30")]
    #[clap(help_heading = Some("Phasing"))]
    pub default_genotype_quality: f64,

    /// Places homozygous variants into blocks as well
    #[clap(long = "include-homozygous")]
    #[clap(help_heading = Some("Phasing"))]
    pub include_homozygous: bool,

    /// Connects blocks across a family using transmitted phase
    #[clap(long = "genetic-haplotyping")]
    #[clap(help_heading = Some("Phasing"))]
    pub genetic_haplotyping: bool,

    /// Sets a uniform recombination rate in cM/Mb, used for chromosomes without a genetic map
    #[clap(long = "recombination-rate")]
    #[clap(value_name = "RATE")]
    #[clap(default_value = "1.26")]
    #[clap(help_heading = Some("Phasing"))]
    pub recombination_rate: f64,

    /// Sets a maximum number of state bits (active reads + 2 per trio) for the phasing
    #[clap(long = "max-state-bits")]
    #[clap(value_name = "BITS")]
    #[clap(default_value_t = DEFAULT_MAX_STATE_BITS)]
    #[clap(help_heading = Some("Phasing"))]
    pub max_state_bits: u32,
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
fn check_required_filename(filename: &Path, label: &str) {
    if !filename.exists() {
        error!("{} does not exist: \"{}\"", label, filename.display());
        std::process::exit(exitcode::NOINPUT);
    } else {
        info!("{}: \"{}\"", label, filename.display());
    }
}

impl Settings {
    /// Wrapper function to build a phasing configuration from our CLI settings
    pub fn phase_config(&self) -> PhaseConfig {
        PhaseConfig {
            max_coverage: self.max_coverage,
            min_read_variants: self.min_read_variants,
            distrust_genotypes: self.distrust_genotypes,
            default_genotype_quality: self.default_genotype_quality,
            include_homozygous: self.include_homozygous,
            genetic_haplotyping: self.genetic_haplotyping,
            max_state_bits: self.max_state_bits
        }
    }
}

pub fn get_raw_settings() -> Settings {
    Settings::parse()
}

/// Do some additional checks here, we may increase these as we go.
/// Also can modify settings if needed since we're passing it around.
/// # Arguments
/// * `settings` - the raw settings, nothing has been checked other than what clap does for us.
pub fn check_settings(mut settings: Settings) -> Settings {
    //check for any of our required files
    for filename in settings.read_filenames.iter() {
        check_required_filename(filename, "Read file");
    }
    check_required_filename(&settings.genotype_filename, "Genotype file");

    // check optional files
    if let Some(ped_filename) = settings.ped_filename.as_ref() {
        check_required_filename(ped_filename, "Pedigree file");
    }
    if let Some(genmap_filename) = settings.genmap_filename.as_ref() {
        check_required_filename(genmap_filename, "Genetic map file");
    }

    // 0 doesn't make sense, so lets just error proof it up to 1
    if settings.min_read_variants == 0 {
        settings.min_read_variants = 1;
    }
    if settings.threads == 0 {
        settings.threads = 1;
    }

    if settings.max_coverage == 0 {
        error!("--max-coverage must be at least 1");
        std::process::exit(exitcode::USAGE);
    }
    // a lone sample already needs 2 bits for its founder haplotypes
    if settings.max_state_bits < 2 || settings.max_state_bits > MAX_SUPPORTED_STATE_BITS {
        error!("--max-state-bits must be in the range [2, {}]", MAX_SUPPORTED_STATE_BITS);
        std::process::exit(exitcode::USAGE);
    }
    if !settings.recombination_rate.is_finite() || settings.recombination_rate <= 0.0 {
        error!("--recombination-rate must be a positive number");
        std::process::exit(exitcode::USAGE);
    }
    if !settings.default_genotype_quality.is_finite() || settings.default_genotype_quality < 0.0 {
        error!("--default-gq must be a non-negative number");
        std::process::exit(exitcode::USAGE);
    }

    // dump stuff to the logger
    info!("Read selection:");
    info!("\tMaximum coverage: {}", settings.max_coverage);
    info!("\tMinimum read variants: {}", settings.min_read_variants);
    if settings.max_coverage > 20 {
        warn!("\tMaximum coverage above 20 may exceed the phasing state limit in dense regions.");
    }

    info!("Region generation:");
    info!("\tDisjoint region split: {}", if settings.disable_region_split { "DISABLED" } else { "ENABLED" });

    info!("Phasing:");
    info!("\tGenotype distrust: {}", if settings.distrust_genotypes { "ENABLED" } else { "DISABLED" });
    if settings.distrust_genotypes {
        info!("\tDefault genotype quality: {}", settings.default_genotype_quality);
    }
    info!("\tInclude homozygous: {}", if settings.include_homozygous { "ENABLED" } else { "DISABLED" });
    info!("\tGenetic haplotyping: {}", if settings.genetic_haplotyping { "ENABLED" } else { "DISABLED" });
    if settings.genetic_haplotyping && settings.ped_filename.is_none() {
        warn!("\tGenetic haplotyping has no effect without a pedigree file.");
    }
    info!("\tRecombination rate: {} cM/Mb", settings.recombination_rate);
    if settings.genmap_filename.is_some() {
        info!("\tRecombination rate is only used for chromosomes missing from the genetic map.");
    }
    info!("\tMaximum state bits: {}", settings.max_state_bits);

    info!("Processing threads: {}", settings.threads);

    //send the settings back
    settings
}

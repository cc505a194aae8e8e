
use crate::pedigree_dp::DpStatistics;
use crate::phaser::PhaseResult;

use serde::Serialize;
use std::fs::File;
use std::ops::AddAssign;
use std::path::Path;

/// Contains statistics on the reads of a region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadStats {
    /// The number of reads loaded
    num_reads: u64,
    /// The number of reads with too few observations to be selected
    uninformative_reads: u64,
    /// The number of reads used by the phasing
    selected_reads: u64,
    /// The number of reads assigned a haplotype
    tagged_reads: u64
}

impl ReadStats {
    /// Creates a new `ReadStats` struct and does some sanity checks.
    /// # Arguments
    /// * `num_reads` - the number of reads loaded
    /// * `uninformative_reads` - the number of reads below the observation minimum
    /// * `selected_reads` - the number of reads that were phased
    /// * `tagged_reads` - the number of reads with a haplotype assignment
    /// # Panics
    /// * if `uninformative_reads + selected_reads > num_reads`, because uninformative reads are never selected
    /// * if `tagged_reads > num_reads`
    pub fn new(num_reads: u64, uninformative_reads: u64, selected_reads: u64, tagged_reads: u64) -> ReadStats {
        assert!(uninformative_reads + selected_reads <= num_reads);
        assert!(tagged_reads <= num_reads);
        ReadStats {
            num_reads,
            uninformative_reads,
            selected_reads,
            tagged_reads
        }
    }

    // getters
    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }

    pub fn uninformative_reads(&self) -> u64 {
        self.uninformative_reads
    }

    pub fn selected_reads(&self) -> u64 {
        self.selected_reads
    }

    pub fn tagged_reads(&self) -> u64 {
        self.tagged_reads
    }
}

impl AddAssign for ReadStats {
    fn add_assign(&mut self, rhs: Self) {
        self.num_reads += rhs.num_reads;
        self.uninformative_reads += rhs.uninformative_reads;
        self.selected_reads += rhs.selected_reads;
        self.tagged_reads += rhs.tagged_reads;
    }
}

/// Contains any statistics from the phasing problem solver that may be relevant
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseStats {
    /// The total cost of the optimal solution
    optimal_cost: Option<u64>,
    /// The number of (sample, position) pairs placed in a block
    phased_variants: Option<u64>,
    /// The number of (sample, position) pairs where the solution changed the input genotype
    genotype_changes: Option<u64>,
    /// The number of distinct blocks over all samples
    num_blocks: Option<u64>,
    /// The number of positions in the largest block
    largest_block: Option<u64>,
    /// The number of detected recombination events
    recombination_events: Option<u64>,
    /// The most reads active at one position
    max_active_reads: Option<u64>,
    /// The largest state width, in bits
    max_state_bits: Option<u32>,
    /// The number of states scored by the DP
    states_evaluated: Option<u64>,
    /// The coverage cap the region was solved with
    max_coverage: Option<u32>,
    /// CPU seconds spent on the region
    cpu_seconds: Option<f32>
}

impl PhaseStats {
    /// Creates phase stats for a pedigree DP solution
    /// # Arguments
    /// * `optimal_cost` - the cost of the final solution
    /// * `phased_variants` - the number of sample positions placed in a block
    /// * `genotype_changes` - the number of sample positions where the solution disagrees with the input genotype
    /// * `num_blocks` - the number of blocks over all samples
    /// * `largest_block` - the number of positions in the largest block
    /// * `recombination_events` - the number of reported recombinations
    /// * `dp_statistics` - the solver counters
    /// * `max_coverage` - the coverage cap used for read selection
    /// * `cpu_seconds` - CPU time spent on the region
    /// # Panics
    /// * if `largest_block > phased_variants`, because every block position is also a phased variant
    #[allow(clippy::too_many_arguments)]
    pub fn dp_new(
        optimal_cost: u64, phased_variants: u64, genotype_changes: u64, num_blocks: u64, largest_block: u64,
        recombination_events: u64, dp_statistics: &DpStatistics, max_coverage: u32, cpu_seconds: f32
    ) -> PhaseStats {
        assert!(largest_block <= phased_variants);
        PhaseStats {
            optimal_cost: Some(optimal_cost),
            phased_variants: Some(phased_variants),
            genotype_changes: Some(genotype_changes),
            num_blocks: Some(num_blocks),
            largest_block: Some(largest_block),
            recombination_events: Some(recombination_events),
            max_active_reads: Some(dp_statistics.max_active_reads as u64),
            max_state_bits: Some(dp_statistics.max_state_bits),
            states_evaluated: Some(dp_statistics.states_evaluated),
            max_coverage: Some(max_coverage),
            cpu_seconds: Some(cpu_seconds)
        }
    }

    pub fn optimal_cost(&self) -> Option<u64> {
        self.optimal_cost
    }

    pub fn phased_variants(&self) -> Option<u64> {
        self.phased_variants
    }

    pub fn max_coverage(&self) -> Option<u32> {
        self.max_coverage
    }
}

/// This is a wrapper for writing out any stats to a file
pub struct StatsWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

/// Contains all the data written to each row of our stats file
#[derive(Serialize)]
struct CsvRow {
    /// The index of the region
    region_index: usize,
    /// the family index for the region
    family_index: usize,
    /// the chromosome of the region
    chrom: String,
    /// the first observed position
    start: u64,
    /// the last observed position
    end: u64,
    /// the number of positions observed by reads
    num_positions: u64,
    /// the number of family members
    num_samples: u64,
    /// the number of reads in the region
    num_reads: Option<u64>,
    /// the number of reads below the observation minimum
    uninformative_reads: Option<u64>,
    /// the number of reads used by the phasing
    selected_reads: Option<u64>,
    /// the number of reads with a haplotype assignment
    tagged_reads: Option<u64>,
    /// The total cost of the solution
    optimal_cost: Option<u64>,
    /// The number of phased sample positions
    phased_variants: Option<u64>,
    /// The number of changed genotypes
    genotype_changes: Option<u64>,
    /// The number of blocks
    num_blocks: Option<u64>,
    /// The size of the largest block
    largest_block: Option<u64>,
    /// The number of recombination events
    recombination_events: Option<u64>,
    /// The most reads active at one position
    max_active_reads: Option<u64>,
    /// The largest state width, in bits
    max_state_bits: Option<u32>,
    /// The number of DP states scored
    states_evaluated: Option<u64>,
    /// The coverage cap used
    max_coverage: Option<u32>,
    /// CPU seconds spent
    cpu_seconds: Option<f32>
}

impl StatsWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write all stats to
    pub fn new(filename: &Path) -> csv::Result<StatsWriter> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(StatsWriter {
            csv_writer
        })
    }

    /// Will write stats to a CSV file for us
    /// # Arguments
    /// * `phase_result` - the phasing results, which wraps region metadata, the read statistics, and the phasing statistics
    pub fn write_stats(&mut self, phase_result: &PhaseResult) -> csv::Result<()> {
        let read_stats: Option<&ReadStats> = phase_result.read_statistics.as_ref();
        let phase_stats: Option<&PhaseStats> = phase_result.statistics.as_ref();
        let region = &phase_result.region;

        let row: CsvRow = CsvRow {
            region_index: region.region_index(),
            family_index: region.family_index(),
            chrom: region.chrom().to_string(),
            start: region.start(),
            end: region.end(),
            num_positions: phase_result.positions.len() as u64,
            num_samples: phase_result.samples.len() as u64,
            num_reads: read_stats.map(|rs| rs.num_reads),
            uninformative_reads: read_stats.map(|rs| rs.uninformative_reads),
            selected_reads: read_stats.map(|rs| rs.selected_reads),
            tagged_reads: read_stats.map(|rs| rs.tagged_reads),
            optimal_cost: phase_stats.and_then(|ps| ps.optimal_cost),
            phased_variants: phase_stats.and_then(|ps| ps.phased_variants),
            genotype_changes: phase_stats.and_then(|ps| ps.genotype_changes),
            num_blocks: phase_stats.and_then(|ps| ps.num_blocks),
            largest_block: phase_stats.and_then(|ps| ps.largest_block),
            recombination_events: phase_stats.and_then(|ps| ps.recombination_events),
            max_active_reads: phase_stats.and_then(|ps| ps.max_active_reads),
            max_state_bits: phase_stats.and_then(|ps| ps.max_state_bits),
            states_evaluated: phase_stats.and_then(|ps| ps.states_evaluated),
            max_coverage: phase_stats.and_then(|ps| ps.max_coverage),
            cpu_seconds: phase_stats.and_then(|ps| ps.cpu_seconds)
        };

        self.csv_writer.serialize(&row)?;
        self.csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assign() {
        let mut read_stats: ReadStats = Default::default();
        let rhs = ReadStats::new(10, 2, 6, 7);

        read_stats += rhs.clone();
        assert_eq!(read_stats, rhs);
        read_stats += rhs;
        assert_eq!(read_stats.num_reads(), 20);
        assert_eq!(read_stats.uninformative_reads(), 4);
        assert_eq!(read_stats.selected_reads(), 12);
        assert_eq!(read_stats.tagged_reads(), 14);
    }

    #[test]
    #[should_panic]
    fn test_bad_read_stats() {
        ReadStats::new(5, 3, 3, 0);
    }

    #[test]
    fn test_dp_new() {
        let dp_statistics = DpStatistics {
            num_columns: 5,
            max_active_reads: 3,
            max_state_bits: 5,
            states_evaluated: 80
        };
        let stats = PhaseStats::dp_new(40, 7, 1, 2, 5, 0, &dp_statistics, 15, 0.5);
        assert_eq!(stats.optimal_cost(), Some(40));
        assert_eq!(stats.phased_variants(), Some(7));
        assert_eq!(stats.max_coverage(), Some(15));
        assert_eq!(stats.max_active_reads, Some(3));
    }
}

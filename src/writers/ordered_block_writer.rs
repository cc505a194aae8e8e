use crate::data_types::read_set::Allele;
use crate::phaser::PhaseResult;

use log::{debug, trace};
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;

/// One (sample, position) row of the blocks file
#[derive(Serialize)]
struct BlockRow<'a> {
    /// the sample name
    sample_name: &'a str,
    /// the chromosome of the position
    chrom: &'a str,
    /// the variant position
    position: u64,
    /// "a|b" when phased, "a/b" otherwise
    genotype: String,
    /// the block id, empty when unphased
    phase_set: Option<u64>
}

/// One row of the recombination file
#[derive(Serialize)]
struct RecombinationRow<'a> {
    /// the child with the recombination
    child: &'a str,
    /// the chromosome of the event
    chrom: &'a str,
    /// last position before the change
    position1: u64,
    /// first position after the change
    position2: u64,
    transmitted_hap_mother1: u8,
    transmitted_hap_mother2: u8,
    transmitted_hap_father1: u8,
    transmitted_hap_father2: u8,
    /// the cost the phasing paid for the change
    recombination_cost: u64
}

/// Structure that maintains order of regions while writing solutions.
pub struct OrderedBlockWriter {
    /// the blocks file we are writing to
    blocks_writer: csv::Writer<File>,
    /// the optional recombination file we are writing to
    recombination_writer: Option<csv::Writer<File>>,
    /// the data that may be cached because we are waiting on earlier results
    map_store: HashMap<usize, PhaseResult>,
    /// the index of data we are waiting for
    current_index: usize
}

/// Builds a tab-delimited writer, or comma-delimited if the extension is ".csv"
fn table_writer(filename: &Path) -> csv::Result<csv::Writer<File>> {
    // modify the delimiter to "," if it ends with .csv
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(filename)
}

/// Formats an allele pair, e.g. "0|1" when phased
fn format_genotype(alleles: &[Allele; 2], phased: bool) -> String {
    let allele_str = |a: Allele| -> &'static str {
        match a {
            Allele::Reference => "0",
            Allele::Alternate => "1",
            Allele::Unphaseable | Allele::Undetermined => "."
        }
    };
    let separator: &str = if phased { "|" } else { "/" };
    format!("{}{}{}", allele_str(alleles[0]), separator, allele_str(alleles[1]))
}

impl OrderedBlockWriter {
    /// Creates a new `OrderedBlockWriter`.
    /// # Arguments
    /// * `blocks_filename` - the per-position blocks file to create
    /// * `recombination_filename` - optional, the recombination events file to create
    pub fn new(blocks_filename: &Path, recombination_filename: Option<&Path>) -> csv::Result<OrderedBlockWriter> {
        let blocks_writer = table_writer(blocks_filename)?;
        let recombination_writer = match recombination_filename {
            Some(filename) => Some(table_writer(filename)?),
            None => None
        };
        Ok(OrderedBlockWriter {
            blocks_writer,
            recombination_writer,
            map_store: Default::default(),
            current_index: 0
        })
    }

    /// Returns the region result that the writer is currently waiting to receive.
    pub fn get_wait_block(&self) -> usize {
        self.current_index
    }

    /// Returns the number of results stored while waiting on earlier regions
    pub fn pending_results(&self) -> usize {
        self.map_store.len()
    }

    /// Adds a region result to our queue for writing.
    /// # Arguments
    /// * `phase_result` - a phasing result that will be written in the correct order with other regions
    pub fn write_phase_block(&mut self, phase_result: PhaseResult) -> Result<(), Box<dyn std::error::Error>> {
        let region_index: usize = phase_result.region.region_index();
        if region_index < self.current_index {
            return Err(Box::new(io::Error::new(io::ErrorKind::Other, "Region index is smaller than next expected index")));
        }
        match self.map_store.insert(region_index, phase_result) {
            None => {},
            Some(_) => {
                return Err(Box::new(io::Error::new(io::ErrorKind::Other, "Region index was already present in the map_store")));
            }
        };
        self.drain_map_store()
    }

    /// This will drain region solutions in the correct order if they have been received.
    /// It drains as far as it can given the current results and then stops to wait for more data.
    fn drain_map_store(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(phase_result) = self.map_store.remove(&self.current_index) {
            trace!("Writing region {}", self.current_index);
            self.write_result(&phase_result)?;
            self.current_index += 1;
        }
        self.blocks_writer.flush()?;
        if let Some(recombination_writer) = self.recombination_writer.as_mut() {
            recombination_writer.flush()?;
        }
        debug!("Block writer waiting on region {}, {} results pending", self.current_index, self.map_store.len());
        Ok(())
    }

    /// Writes a single result, order is handled by the caller
    fn write_result(&mut self, phase_result: &PhaseResult) -> csv::Result<()> {
        let chrom: &str = phase_result.region.chrom();
        for sample in phase_result.samples.iter() {
            for (i, &position) in phase_result.positions.iter().enumerate() {
                let phase_set: Option<u64> = sample.phase_sets[i];
                let row = BlockRow {
                    sample_name: &sample.sample_name,
                    chrom,
                    position,
                    genotype: format_genotype(&sample.alleles[i], phase_set.is_some()),
                    phase_set
                };
                self.blocks_writer.serialize(&row)?;
            }
        }

        if let Some(recombination_writer) = self.recombination_writer.as_mut() {
            let names: HashMap<u32, &str> = phase_result.samples.iter()
                .map(|s| (s.sample_id, s.sample_name.as_str()))
                .collect();
            for event in phase_result.recombination_events.iter() {
                let row = RecombinationRow {
                    child: names.get(&event.child_id).cloned().unwrap_or_default(),
                    chrom,
                    position1: event.position1,
                    position2: event.position2,
                    transmitted_hap_mother1: event.transmitted_hap_mother1,
                    transmitted_hap_mother2: event.transmitted_hap_mother2,
                    transmitted_hap_father1: event.transmitted_hap_father1,
                    transmitted_hap_father2: event.transmitted_hap_father2,
                    recombination_cost: event.recombination_cost
                };
                recombination_writer.serialize(&row)?;
            }
        }
        Ok(())
    }
}

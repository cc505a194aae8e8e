use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::phaser::HaplotagResult;

/// This is a wrapper for writing out the read assignments to a file
pub struct ReadListWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

/// Contains all the data written to each row of our read list
#[derive(Serialize)]
struct ReadListRow<'a> {
    /// the read name
    read_name: &'a str,
    /// the index of the input file the read came from
    source_id: u32,
    /// the sample name of the read
    sample_name: &'a str,
    /// the chromosome of the region
    chrom: &'a str,
    /// the index of the region the read was phased in
    region_index: usize,
    /// Phase set ID - the block the read was tagged in, empty if untagged
    phase_block_id: Option<u64>,
    /// the haplotype the read is assigned to, 1 or 2, empty if untagged
    haplotag: Option<u8>,
    /// the number of observed variants
    num_variants: usize,
    /// the first observed position
    first_position: u64,
    /// the last observed position
    last_position: u64,
    /// true if the read was used for phasing
    selected: bool
}

impl ReadListWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write all read assignments to
    pub fn new(filename: &Path) -> csv::Result<ReadListWriter> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(ReadListWriter {
            csv_writer
        })
    }

    /// Writes the read assignments from a given region.
    /// # Arguments
    /// * `haplotag_result` - the HaplotagResult from phasing, in-order is not required
    /// # Errors
    /// * if the csv_writer has any errors
    pub fn write_block(&mut self, haplotag_result: &HaplotagResult) -> Result<(), Box<dyn std::error::Error>> {
        let region_index: usize = haplotag_result.region.region_index();
        let chrom: &str = haplotag_result.region.chrom();
        for tag in haplotag_result.reads.iter() {
            let sample_name: &str = haplotag_result.sample_names.get(&tag.sample_id)
                .map(|s| s.as_str())
                .unwrap_or_default();
            let row = ReadListRow {
                read_name: &tag.read_name,
                source_id: tag.source_id,
                sample_name,
                chrom,
                region_index,
                phase_block_id: tag.block_id,
                haplotag: tag.haplotype.map(|h| h + 1),
                num_variants: tag.num_variants,
                first_position: tag.first_position,
                last_position: tag.last_position,
                selected: tag.selected
            };
            self.csv_writer.serialize(&row)?;
        }
        self.csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_gen::PhaseRegion;
    use crate::phaser::ReadTag;

    #[test]
    fn test_write_block() {
        let out_dir = std::env::temp_dir().join(format!("pedphase_read_list_{}", std::process::id()));
        std::fs::create_dir_all(&out_dir).unwrap();
        let filename = out_dir.join("reads.tsv");

        let tag = ReadTag {
            read_name: "read_1".to_string(),
            source_id: 1,
            sample_id: 0,
            block_id: Some(100),
            haplotype: Some(0),
            num_variants: 3,
            first_position: 100,
            last_position: 300,
            selected: true
        };
        let untagged = ReadTag {
            read_name: "read_2".to_string(),
            block_id: None,
            haplotype: None,
            selected: false,
            ..tag.clone()
        };
        let haplotag_result = HaplotagResult {
            region: PhaseRegion::new(4, 0, "chr2".to_string(), 0),
            sample_names: [(0, "mother".to_string())].into_iter().collect(),
            reads: vec![tag, untagged]
        };

        let mut writer = ReadListWriter::new(&filename).unwrap();
        writer.write_block(&haplotag_result).unwrap();
        std::mem::drop(writer);

        let contents = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "read_1\t1\tmother\tchr2\t4\t100\t1\t3\t100\t300\ttrue");
        assert_eq!(lines[2], "read_2\t1\tmother\tchr2\t4\t\t\t3\t100\t300\tfalse");
        std::fs::remove_dir_all(&out_dir).unwrap();
    }
}


use crate::data_types::pedigree::{Genotype, GenotypeCall, GenotypeLikelihoods};
use crate::data_types::read_set::{Allele, Read, VariantObservation};
use crate::data_types::sample_ids::NumericSampleIds;
use crate::recombination::GeneticMap;

use flate2::bufread::MultiGzDecoder;
use log::{debug, warn};
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;
use simple_error::bail;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Genotype calls by chromosome, then position, then numeric sample id
pub type GenotypeTable = HashMap<String, BTreeMap<u64, HashMap<u32, GenotypeCall>>>;

/// Opens a plain-text file, decompressing it if the extension is ".gz"
/// # Arguments
/// * `filename` - the file to open
fn open_text(filename: &Path) -> Result<Box<dyn BufRead>, Box<dyn std::error::Error>> {
    let file: std::fs::File = std::fs::File::open(filename)?;
    let file_reader = BufReader::new(file);
    if filename.extension().unwrap_or_default() == "gz" {
        debug!("Detected gzip extension, loading {:?} with MultiGzDecoder...", filename);
        let gz_decoder = MultiGzDecoder::new(file_reader);
        Ok(Box::new(BufReader::new(gz_decoder)))
    } else {
        debug!("Loading {:?} as plain-text file...", filename);
        Ok(Box::new(file_reader))
    }
}

/// Opens a table with a header line. Files ending in ".csv" (or ".csv.gz") are comma-delimited, everything else is tab-delimited.
/// Lines starting with '#' are skipped.
fn open_table(filename: &Path) -> Result<csv::Reader<Box<dyn BufRead>>, Box<dyn std::error::Error>> {
    let uncompressed: &Path = if filename.extension().unwrap_or_default() == "gz" {
        Path::new(filename.file_stem().unwrap_or_default())
    } else {
        filename
    };
    let is_csv: bool = uncompressed.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(open_text(filename)?))
}

/// One allele observation in a read table
#[derive(Deserialize)]
struct ReadRow {
    read_name: String,
    sample: String,
    chrom: String,
    position: u64,
    allele: u8,
    quality: u32
}

/// Observations of one read on one chromosome, collected while loading
struct ReadGroup {
    chrom: String,
    read_name: String,
    sample_id: u32,
    observations: Vec<VariantObservation>
}

/// All reads from one input table, split by chromosome
#[derive(Debug, Default)]
pub struct ReadSource {
    /// chromosomes in order of first appearance
    chromosomes: Vec<String>,
    /// reads per chromosome, sorted by (first position, sample id)
    reads: HashMap<String, Vec<Read>>
}

impl ReadSource {
    pub fn chromosomes(&self) -> &[String] {
        &self.chromosomes
    }

    pub fn num_reads(&self) -> usize {
        self.reads.values().map(|r| r.len()).sum()
    }

    /// Removes and returns the reads of a chromosome, empty if the chromosome was not present
    pub fn take_reads(&mut self, chrom: &str) -> Vec<Read> {
        self.reads.remove(chrom).unwrap_or_default()
    }
}

/// Loads all reads from a read table.
/// Rows of the same read on the same chromosome are combined into one `Read`, in any row order.
/// # Arguments
/// * `filename` - the table with columns `read_name, sample, chrom, position, allele, quality`
/// * `source_id` - the index of this input, stored on every read
/// * `sample_ids` - the sample registry, new sample names are assigned ids
/// # Errors
/// * if the file cannot be parsed
/// * if a read name is assigned to more than one sample
/// * if an allele is not 0, 1, or 2
/// * if a read observes the same position twice
pub fn load_reads(filename: &Path, source_id: u32, sample_ids: &mut NumericSampleIds) -> Result<ReadSource, Box<dyn std::error::Error>> {
    let mut reader = open_table(filename)?;
    let mut groups: Vec<ReadGroup> = vec![];
    let mut group_index: HashMap<(String, String), usize> = Default::default();
    let mut read_samples: HashMap<String, u32> = Default::default();

    for row_result in reader.deserialize() {
        let row: ReadRow = row_result?;
        let sample_id: u32 = sample_ids.id_of(&row.sample);
        match read_samples.get(&row.read_name) {
            Some(&previous) if previous != sample_id => {
                bail!("Read {:?} in {:?} is assigned to samples {:?} and {:?}", row.read_name, filename, sample_ids.name_of(previous).unwrap_or_default(), row.sample);
            },
            Some(_) => {},
            None => {
                read_samples.insert(row.read_name.clone(), sample_id);
            }
        };

        let allele: Allele = match Allele::from_repr(row.allele) {
            Some(a) if a != Allele::Undetermined => a,
            _ => bail!("Read {:?} in {:?} has allele {} at position {}, expected 0, 1, or 2", row.read_name, filename, row.allele, row.position)
        };

        let key = (row.chrom, row.read_name);
        let index: usize = match group_index.get(&key) {
            Some(&i) => i,
            None => {
                groups.push(ReadGroup {
                    chrom: key.0.clone(),
                    read_name: key.1.clone(),
                    sample_id,
                    observations: vec![]
                });
                group_index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[index].observations.push(VariantObservation::new(row.position, allele, row.quality));
    }

    let mut read_source: ReadSource = Default::default();
    for mut group in groups.into_iter() {
        group.observations.sort_by_key(|v| v.position);
        let read = Read::new(group.read_name, source_id, group.sample_id, group.observations)?;
        if !read_source.reads.contains_key(&group.chrom) {
            read_source.chromosomes.push(group.chrom.clone());
        }
        read_source.reads.entry(group.chrom).or_default().push(read);
    }
    for reads in read_source.reads.values_mut() {
        reads.sort_by_key(|r| (r.first_position(), r.sample_id()));
    }

    debug!("Loaded {} reads on {} chromosomes from {:?}", read_source.num_reads(), read_source.chromosomes.len(), filename);
    Ok(read_source)
}

/// Merges read lists that are each sorted by (first position, sample id) into one list with the same order.
/// Ties go to the lower source index.
/// # Arguments
/// * `sources` - one sorted list per input
pub fn merge_read_sources(sources: Vec<Vec<Read>>) -> Vec<Read> {
    let total_reads: usize = sources.iter().map(|s| s.len()).sum();
    let mut read_iterators: Vec<std::iter::Peekable<std::vec::IntoIter<Read>>> = sources.into_iter()
        .map(|s| s.into_iter().peekable())
        .collect();

    // initialize the queue with the first read from each source
    let mut read_queue: PriorityQueue<usize, (Reverse<u64>, Reverse<u32>, Reverse<usize>)> = PriorityQueue::new();
    for (source_index, read_iter) in read_iterators.iter_mut().enumerate() {
        if let Some(read) = read_iter.peek() {
            read_queue.push(source_index, (Reverse(read.first_position()), Reverse(read.sample_id()), Reverse(source_index)));
        }
    }

    let mut merged: Vec<Read> = Vec::with_capacity(total_reads);
    while let Some((source_index, _priority)) = read_queue.pop() {
        let read_iter = &mut read_iterators[source_index];
        merged.extend(read_iter.next());
        if let Some(read) = read_iter.peek() {
            read_queue.push(source_index, (Reverse(read.first_position()), Reverse(read.sample_id()), Reverse(source_index)));
        }
    }
    assert_eq!(merged.len(), total_reads);
    merged
}

/// One genotype call in a genotype table
#[derive(Deserialize)]
struct GenotypeRow {
    chrom: String,
    position: u64,
    sample: String,
    genotype: String,
    #[serde(default)]
    prob_hom_ref: Option<f64>,
    #[serde(default)]
    prob_het: Option<f64>,
    #[serde(default)]
    prob_hom_alt: Option<f64>
}

/// Parses a genotype written as "0/1", "1|0", etc., or as an alternate allele count "0", "1", "2".
/// Returns None for anything else, including missing alleles.
pub fn parse_genotype(value: &str) -> Option<Genotype> {
    let parse_allele = |a: &str| -> Option<usize> {
        match a {
            "0" => Some(0),
            "1" => Some(1),
            _ => None
        }
    };

    let alleles: Vec<&str> = value.trim().split(|c| c == '/' || c == '|').collect();
    match alleles.as_slice() {
        [count] => count.parse::<usize>().ok().and_then(Genotype::from_alt_count),
        [a0, a1] => Genotype::from_alt_count(parse_allele(a0)? + parse_allele(a1)?),
        _ => None
    }
}

/// Loads a genotype table.
/// # Arguments
/// * `filename` - the table with columns `chrom, position, sample, genotype` and optionally `prob_hom_ref, prob_het, prob_hom_alt`
/// * `sample_ids` - the sample registry, new sample names are assigned ids
/// # Errors
/// * if the file cannot be parsed
/// * if a genotype cannot be parsed
/// * if only some of the probability columns are filled, or a probability is negative or not finite
/// * if a sample has two calls at the same position
pub fn load_genotypes(filename: &Path, sample_ids: &mut NumericSampleIds) -> Result<GenotypeTable, Box<dyn std::error::Error>> {
    let mut reader = open_table(filename)?;
    let mut genotype_table: GenotypeTable = Default::default();
    let mut num_calls: usize = 0;
    for row_result in reader.deserialize() {
        let row: GenotypeRow = row_result?;
        let genotype: Genotype = match parse_genotype(&row.genotype) {
            Some(g) => g,
            None => bail!("Unable to parse genotype {:?} for {:?} at {}:{}", row.genotype, row.sample, row.chrom, row.position)
        };

        let likelihoods: Option<GenotypeLikelihoods> = match (row.prob_hom_ref, row.prob_het, row.prob_hom_alt) {
            (None, None, None) => None,
            (Some(p0), Some(p1), Some(p2)) => {
                if [p0, p1, p2].iter().any(|p| !p.is_finite() || *p < 0.0) {
                    bail!("Invalid genotype probabilities for {:?} at {}:{}: {}, {}, {}", row.sample, row.chrom, row.position, p0, p1, p2);
                }
                Some(GenotypeLikelihoods::new(p0, p1, p2))
            },
            _ => bail!("Incomplete genotype probabilities for {:?} at {}:{}", row.sample, row.chrom, row.position)
        };

        let sample_id: u32 = sample_ids.id_of(&row.sample);
        let site_calls = genotype_table.entry(row.chrom.clone()).or_default()
            .entry(row.position).or_default();
        if site_calls.insert(sample_id, GenotypeCall { genotype, likelihoods }).is_some() {
            bail!("Duplicate genotype for {:?} at {}:{}", row.sample, row.chrom, row.position);
        }
        num_calls += 1;
    }

    debug!("Loaded {} genotype calls on {} chromosomes from {:?}", num_calls, genotype_table.len(), filename);
    Ok(genotype_table)
}

/// One individual from a PED file
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PedRecord {
    pub family_id: String,
    pub individual: String,
    /// None if the father is unknown ("0")
    pub father: Option<String>,
    /// None if the mother is unknown ("0")
    pub mother: Option<String>
}

/// Loads a whitespace-delimited PED file: family, individual, father, mother, and any further columns which are ignored.
/// # Arguments
/// * `filename` - the PED file
/// # Errors
/// * if the file cannot be read
/// * if a line has fewer than four columns
pub fn load_ped(filename: &Path) -> Result<Vec<PedRecord>, Box<dyn std::error::Error>> {
    let parse_parent = |p: &str| -> Option<String> {
        if p == "0" { None } else { Some(p.to_string()) }
    };

    let mut records: Vec<PedRecord> = vec![];
    for (line_index, line_result) in open_text(filename)?.lines().enumerate() {
        let line: String = line_result?;
        let trimmed: &str = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 4 {
            bail!("Line {} of {:?} has {} columns, expected at least 4", line_index + 1, filename, fields.len());
        }
        records.push(PedRecord {
            family_id: fields[0].to_string(),
            individual: fields[1].to_string(),
            father: parse_parent(fields[2]),
            mother: parse_parent(fields[3])
        });
    }
    debug!("Loaded {} individuals from {:?}", records.len(), filename);
    Ok(records)
}

/// Returns the (mother, father, child) trios of every record with both parents known.
/// Records with a single known parent cannot form a trio and are skipped with a warning.
pub fn ped_trios(records: &[PedRecord]) -> Vec<(String, String, String)> {
    let mut trios = vec![];
    for record in records.iter() {
        match (&record.mother, &record.father) {
            (Some(mother), Some(father)) => {
                trios.push((mother.clone(), father.clone(), record.individual.clone()));
            },
            (None, None) => {},
            _ => {
                warn!("Individual {:?} has only one known parent, it will be phased without a trio", record.individual);
            }
        };
    }
    trios
}

/// One anchor of a genetic map table
#[derive(Deserialize)]
struct GeneticMapRow {
    chrom: String,
    position: u64,
    #[serde(alias = "cM")]
    centimorgans: f64
}

/// Loads a genetic map table with one map per chromosome.
/// # Arguments
/// * `filename` - the table with columns `chrom, position, centimorgans`, sorted by position within each chromosome
/// # Errors
/// * if the file cannot be parsed
/// * if any chromosome's anchors fail `GeneticMap::new()`
pub fn load_genetic_map(filename: &Path) -> Result<HashMap<String, GeneticMap>, Box<dyn std::error::Error>> {
    let mut reader = open_table(filename)?;
    let mut anchors: HashMap<String, Vec<(u64, f64)>> = Default::default();
    for row_result in reader.deserialize() {
        let row: GeneticMapRow = row_result?;
        anchors.entry(row.chrom).or_default().push((row.position, row.centimorgans));
    }

    let mut genetic_maps: HashMap<String, GeneticMap> = Default::default();
    for (chrom, chrom_anchors) in anchors.into_iter() {
        match GeneticMap::new(chrom_anchors) {
            Ok(gm) => {
                genetic_maps.insert(chrom, gm);
            },
            Err(e) => bail!("Error in genetic map for {:?}: {}", chrom, e)
        };
    }
    debug!("Loaded genetic maps for {} chromosomes from {:?}", genetic_maps.len(), filename);
    Ok(genetic_maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_reads() {
        let mut sample_ids = NumericSampleIds::new();
        let mut read_source = load_reads(&PathBuf::from("./test_data/reads_a.tsv"), 0, &mut sample_ids).unwrap();
        assert_eq!(read_source.chromosomes(), &["chr1".to_string(), "chr2".to_string()]);
        assert_eq!(read_source.num_reads(), 4);
        assert_eq!(sample_ids.get("mother"), Some(0));
        assert_eq!(sample_ids.get("child"), Some(1));

        let chr1 = read_source.take_reads("chr1");
        let names: Vec<&str> = chr1.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["m1", "c1", "m2"]);
        // rows of m1 are out of order in the file
        let positions: Vec<u64> = chr1[0].variants().iter().map(|v| v.position).collect();
        assert_eq!(positions, vec![100, 200, 300]);
        assert_eq!(chr1[0].variants()[1].allele, Allele::Alternate);
        assert_eq!(chr1[0].variants()[2].allele, Allele::Unphaseable);
        assert_eq!(chr1[0].variants()[0].confidence, 30);
        assert!(chr1.iter().all(|r| r.source_id() == 0));
        assert!(read_source.take_reads("chr1").is_empty());
        assert!(read_source.take_reads("chr3").is_empty());
    }

    #[test]
    fn test_load_gzip_reads() {
        let mut sample_ids = NumericSampleIds::new();
        sample_ids.id_of("mother");
        let mut read_source = load_reads(&PathBuf::from("./test_data/reads_b.tsv.gz"), 1, &mut sample_ids).unwrap();
        let chr1 = read_source.take_reads("chr1");
        assert_eq!(chr1.len(), 2);
        assert!(chr1.iter().all(|r| r.source_id() == 1));
        assert_eq!(chr1[0].sample_id(), 0);
        assert_eq!(sample_ids.get("father"), Some(1));
    }

    #[test]
    fn test_mixed_sample_read() {
        let mut sample_ids = NumericSampleIds::new();
        assert!(load_reads(&PathBuf::from("./test_data/mixed_sample_reads.tsv"), 0, &mut sample_ids).is_err());
    }

    #[test]
    fn test_merge_read_sources() {
        let mut sample_ids = NumericSampleIds::new();
        let mut source_a = load_reads(&PathBuf::from("./test_data/reads_a.tsv"), 0, &mut sample_ids).unwrap();
        let mut source_b = load_reads(&PathBuf::from("./test_data/reads_b.tsv.gz"), 1, &mut sample_ids).unwrap();
        let merged = merge_read_sources(vec![source_a.take_reads("chr1"), source_b.take_reads("chr1")]);
        let names: Vec<(&str, u32)> = merged.iter().map(|r| (r.name(), r.source_id())).collect();
        // m1 and m3 tie on position and sample, the first source wins
        assert_eq!(names, vec![("m1", 0), ("m3", 1), ("f1", 1), ("c1", 0), ("m2", 0)]);
        assert!(merge_read_sources(vec![]).is_empty());
    }

    #[test]
    fn test_parse_genotype() {
        assert_eq!(parse_genotype("0/0"), Some(Genotype::HomozygousReference));
        assert_eq!(parse_genotype("1|0"), Some(Genotype::Heterozygous));
        assert_eq!(parse_genotype("0/1"), Some(Genotype::Heterozygous));
        assert_eq!(parse_genotype("1/1"), Some(Genotype::HomozygousAlternate));
        assert_eq!(parse_genotype("2"), Some(Genotype::HomozygousAlternate));
        assert_eq!(parse_genotype("./."), None);
        assert_eq!(parse_genotype("1/2"), None);
        assert_eq!(parse_genotype("3"), None);
        assert_eq!(parse_genotype("0/1/1"), None);
    }

    #[test]
    fn test_load_genotypes() {
        let mut sample_ids = NumericSampleIds::new();
        let genotypes = load_genotypes(&PathBuf::from("./test_data/genotypes.tsv"), &mut sample_ids).unwrap();
        let chr1 = &genotypes["chr1"];
        assert_eq!(chr1.len(), 3);

        let mother = sample_ids.get("mother").unwrap();
        let child = sample_ids.get("child").unwrap();
        let call = chr1[&100][&mother];
        assert_eq!(call.genotype, Genotype::Heterozygous);
        assert!(call.likelihoods.is_none());

        let call = chr1[&200][&child];
        assert_eq!(call.genotype, Genotype::HomozygousAlternate);
        assert_eq!(call.likelihoods.unwrap().phred_costs()[2], 0);
        assert!(!chr1[&300].contains_key(&child));
    }

    #[test]
    fn test_load_ped() {
        let records = load_ped(&PathBuf::from("./test_data/family.ped")).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[2], PedRecord {
            family_id: "fam1".to_string(),
            individual: "child".to_string(),
            father: Some("father".to_string()),
            mother: Some("mother".to_string())
        });

        // the last child only has a known mother
        let trios = ped_trios(&records);
        assert_eq!(trios, vec![("mother".to_string(), "father".to_string(), "child".to_string())]);
    }

    #[test]
    fn test_load_genetic_map() {
        let genetic_maps = load_genetic_map(&PathBuf::from("./test_data/genetic_map.tsv")).unwrap();
        assert_eq!(genetic_maps.len(), 2);
        assert_eq!(genetic_maps["chr1"].len(), 3);
        assert!((genetic_maps["chr1"].centimorgans_at(150) - 0.5).abs() < 1e-9);
        assert_eq!(genetic_maps["chr2"].len(), 1);
    }
}

use crate::data_types::pedigree::{Pedigree, PedigreeError};
use crate::data_types::read_set::Read;
use crate::data_types::sample_ids::NumericSampleIds;

use log::debug;
use rustc_hash::FxHashSet as HashSet;

/// A group of individuals connected through trios, always phased together
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Family {
    /// member names, in registration order
    pub members: Vec<String>,
    /// numeric sample ids of the members, aligned with `members`
    pub member_ids: Vec<u32>,
    /// (mother, father, child) names of the trios inside the family
    pub trios: Vec<(String, String, String)>
}

/// Splits individuals into families that are connected through trios.
/// Individuals outside any trio become single-member families.
/// # Arguments
/// * `sample_ids` - the sample registry, new names are assigned ids
/// * `individuals` - every individual to phase; repeated names are ignored
/// * `trios` - (mother, father, child) names, every member must be in `individuals`
/// # Errors
/// * if a trio is invalid, see `Pedigree::add_relationship()`
/// * if the trios contain a cycle
pub fn build_families(
    sample_ids: &mut NumericSampleIds, individuals: &[String], trios: &[(String, String, String)]
) -> Result<Vec<Family>, PedigreeError> {
    let mut pedigree = Pedigree::new();
    let mut seen: HashSet<&str> = Default::default();
    for name in individuals.iter() {
        if seen.insert(name.as_str()) {
            pedigree.add_individual(sample_ids, name, vec![], vec![])?;
        }
    }
    for (mother, father, child) in trios.iter() {
        pedigree.add_relationship(sample_ids, mother, father, child)?;
    }
    pedigree.topological_order()?;

    let mut families: Vec<Family> = vec![];
    for member_ids in pedigree.families().into_iter() {
        let id_set: HashSet<u32> = member_ids.iter().cloned().collect();
        let members: Vec<String> = member_ids.iter()
            .filter_map(|&id| pedigree.individual(id).map(|i| i.name().to_string()))
            .collect();
        let family_trios: Vec<(String, String, String)> = trios.iter()
            .filter(|(_, _, child)| sample_ids.get(child).map(|id| id_set.contains(&id)).unwrap_or(false))
            .cloned()
            .collect();
        families.push(Family {
            members,
            member_ids,
            trios: family_trios
        });
    }
    debug!("Built {} families from {} individuals and {} trios", families.len(), pedigree.len(), trios.len());
    Ok(families)
}

/// Defines a subset of the total problem space that is a single phasing job: one family on one stretch of one chromosome.
/// Each region has at least one read, and no read of the family on that chromosome crosses a region boundary.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PhaseRegion {
    // NOTE: order matters here because we're deriving the comparisons
    /// An index of the region, important for maintaining output order downstream.
    region_index: usize,
    /// The chromosome index in input order
    chrom_index: usize,
    /// The chromosome of the region.
    chrom: String,
    /// The index of the family being phased
    family_index: usize,
    /// The first observed position in the region, inclusive.
    start: u64,
    /// The last observed position in the region, inclusive.
    end: u64,
    /// The number of family reads in the region.
    num_reads: usize
}

impl std::fmt::Debug for PhaseRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseRegion")
            .field("region_index", &self.region_index)
            .field("coordinates", &format!("{}:{}-{}", self.chrom, self.start, self.end))
            .field("family_index", &self.family_index)
            .field("num_reads", &self.num_reads)
            .finish()
    }
}

impl PhaseRegion {
    /// Creates a region with no reads yet
    /// # Arguments
    /// * `region_index` - the index of this region
    /// * `chrom_index` - the chromosome index, for ordering
    /// * `chrom` - the chromosome of the region
    /// * `family_index` - the family that is phased in this region
    pub fn new(region_index: usize, chrom_index: usize, chrom: String, family_index: usize) -> PhaseRegion {
        PhaseRegion {
            region_index,
            chrom_index,
            chrom,
            family_index,
            start: 0,
            end: 0,
            num_reads: 0
        }
    }

    pub fn region_index(&self) -> usize {
        self.region_index
    }

    pub fn chrom_index(&self) -> usize {
        self.chrom_index
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn family_index(&self) -> usize {
        self.family_index
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn num_reads(&self) -> usize {
        self.num_reads
    }

    /// Returns the number of contained base pairs in the region.
    pub fn bp_len(&self) -> u64 {
        if self.num_reads == 0 { 0 } else { self.end - self.start + 1 }
    }

    /// Extends the region with a read spanning `first..=last`
    pub fn add_read_span(&mut self, first: u64, last: u64) {
        if self.num_reads == 0 || first < self.start {
            self.start = first;
        }
        if self.num_reads == 0 || last > self.end {
            self.end = last;
        }
        self.num_reads += 1;
    }

    /// Checks if the inclusive range `first..=last` touches the region
    pub fn is_overlapping(&self, first: u64, last: u64) -> bool {
        self.num_reads > 0 && first <= self.end && last >= self.start
    }

    /// Checks if a read starts inside this region
    pub fn contains_start(&self, position: u64) -> bool {
        self.num_reads > 0 && self.start <= position && position <= self.end
    }
}

/// Generates all phasing jobs for one chromosome.
/// Families without reads on the chromosome get no region.
/// # Arguments
/// * `first_index` - the index assigned to the first generated region
/// * `chrom_index` - the index of the chromosome, for ordering
/// * `chrom` - the chromosome name
/// * `reads` - all reads on the chromosome, sorted by first position
/// * `families` - numeric sample ids for each family
/// * `split_disjoint` - if true, each family is split wherever no read spans the gap between two positions
pub fn generate_chromosome_regions(
    first_index: usize, chrom_index: usize, chrom: &str, reads: &[Read], families: &[Vec<u32>], split_disjoint: bool
) -> Vec<PhaseRegion> {
    let mut regions: Vec<PhaseRegion> = vec![];
    for (family_index, family) in families.iter().enumerate() {
        let members: HashSet<u32> = family.iter().cloned().collect();
        let mut current: Option<PhaseRegion> = None;
        for read in reads.iter().filter(|r| members.contains(&r.sample_id())) {
            let (first, last) = (read.first_position(), read.last_position());
            if let Some(region) = current.as_mut() {
                if !split_disjoint || region.is_overlapping(first, last) {
                    region.add_read_span(first, last);
                    continue;
                }
                regions.extend(current.take());
            }
            let mut region = PhaseRegion::new(first_index + regions.len(), chrom_index, chrom.to_string(), family_index);
            region.add_read_span(first, last);
            current = Some(region);
        }
        regions.extend(current);
    }
    debug!("Generated {} regions for {}", regions.len(), chrom);
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::read_set::{Allele, VariantObservation};

    fn build_read(sample_id: u32, first: u64, last: u64) -> Read {
        let variants = vec![
            VariantObservation::new(first, Allele::Reference, 10),
            VariantObservation::new(last, Allele::Alternate, 10)
        ];
        Read::new(format!("r_{sample_id}_{first}"), 0, sample_id, variants).unwrap()
    }

    #[test]
    fn test_build_families() {
        let mut sample_ids = NumericSampleIds::new();
        let individuals: Vec<String> = ["mother", "father", "child", "loner", "grandchild", "partner", "child"]
            .iter().map(|s| s.to_string()).collect();
        let trios = vec![
            ("mother".to_string(), "father".to_string(), "child".to_string()),
            ("child".to_string(), "partner".to_string(), "grandchild".to_string())
        ];
        let families = build_families(&mut sample_ids, &individuals, &trios).unwrap();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].members, vec!["mother", "father", "child", "grandchild", "partner"]);
        assert_eq!(families[0].member_ids, vec![0, 1, 2, 4, 5]);
        assert_eq!(families[0].trios, trios);
        assert_eq!(families[1].members, vec!["loner"]);
        assert!(families[1].trios.is_empty());

        // an unknown parent is an error
        let bad_trios = vec![("mother".to_string(), "nobody".to_string(), "loner".to_string())];
        let mut sample_ids = NumericSampleIds::new();
        assert_eq!(
            build_families(&mut sample_ids, &individuals, &bad_trios),
            Err(PedigreeError::UnknownIndividual { name: "nobody".to_string() })
        );
    }

    #[test]
    fn test_phase_region() {
        let mut region = PhaseRegion::new(0, 0, "chr1".to_string(), 0);
        assert_eq!(region.bp_len(), 0);
        assert!(!region.is_overlapping(0, 100));
        region.add_read_span(100, 200);
        region.add_read_span(50, 150);
        assert_eq!((region.start(), region.end(), region.num_reads()), (50, 200, 2));
        assert_eq!(region.bp_len(), 151);
        assert!(region.is_overlapping(200, 300));
        assert!(!region.is_overlapping(201, 300));
        assert!(region.contains_start(50));
        assert!(!region.contains_start(201));
    }

    #[test]
    fn test_generate_regions() {
        let reads = vec![
            build_read(0, 100, 200),
            build_read(2, 150, 250),
            build_read(1, 180, 190),
            build_read(0, 300, 400),
            build_read(3, 500, 600)
        ];
        let families = vec![vec![0, 1, 2], vec![3], vec![4]];

        let whole = generate_chromosome_regions(0, 0, "chr1", &reads, &families, false);
        assert_eq!(whole.len(), 2);
        assert_eq!((whole[0].start(), whole[0].end(), whole[0].num_reads()), (100, 400, 4));
        assert_eq!(whole[1].family_index(), 1);
        assert_eq!(whole[1].region_index(), 1);

        let split = generate_chromosome_regions(5, 1, "chr2", &reads, &families, true);
        assert_eq!(split.len(), 3);
        assert_eq!((split[0].start(), split[0].end(), split[0].num_reads()), (100, 250, 3));
        assert_eq!((split[1].start(), split[1].end(), split[1].num_reads()), (300, 400, 1));
        assert_eq!(split[2].family_index(), 1);
        let indices: Vec<usize> = split.iter().map(|r| r.region_index()).collect();
        assert_eq!(indices, vec![5, 6, 7]);
        assert!(split.iter().all(|r| r.chrom() == "chr2" && r.chrom_index() == 1));
    }
}

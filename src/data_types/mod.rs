
/// Individuals, trios, and genotype priors
pub mod pedigree;
/// Contains the Read observation types and the ReadSet collection
pub mod read_set;
/// Registry mapping sample names to dense numeric ids
pub mod sample_ids;

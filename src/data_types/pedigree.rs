
use crate::data_types::sample_ids::NumericSampleIds;

use rustc_hash::FxHashMap as HashMap;

/// Maximum cost charged for an unlikely genotype in distrust mode
pub const MAX_GENOTYPE_COST: u32 = 200;

/// Diploid biallelic genotype at a site
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Genotype {
    HomozygousReference=0,
    Heterozygous,
    HomozygousAlternate
}

impl Genotype {
    /// Converts a count of alternate alleles (0, 1, or 2) into a genotype
    pub fn from_alt_count(alt_count: usize) -> Option<Genotype> {
        match alt_count {
            0 => Some(Genotype::HomozygousReference),
            1 => Some(Genotype::Heterozygous),
            2 => Some(Genotype::HomozygousAlternate),
            _ => None
        }
    }

    /// Number of alternate alleles in this genotype
    pub fn alt_count(&self) -> usize {
        *self as usize
    }

    pub fn is_heterozygous(&self) -> bool {
        *self == Genotype::Heterozygous
    }

    /// The alleles a parent with this genotype can transmit
    fn transmittable(&self) -> &'static [usize] {
        match self {
            Genotype::HomozygousReference => &[0],
            Genotype::Heterozygous => &[0, 1],
            Genotype::HomozygousAlternate => &[1]
        }
    }
}

/// Genotype likelihood triple for a single site, stored as probabilities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenotypeLikelihoods {
    /// P(hom-ref), P(het), P(hom-alt); not required to sum to one
    probabilities: [f64; 3]
}

impl GenotypeLikelihoods {
    /// Creates likelihoods from raw probabilities.
    /// # Panics
    /// * if any probability is negative or not finite
    pub fn new(hom_ref: f64, het: f64, hom_alt: f64) -> GenotypeLikelihoods {
        let probabilities = [hom_ref, het, hom_alt];
        assert!(probabilities.iter().all(|p| p.is_finite() && *p >= 0.0));
        GenotypeLikelihoods {
            probabilities
        }
    }

    /// Creates likelihoods from phred-scaled values, e.g. a PL field
    pub fn from_phred(hom_ref: f64, het: f64, hom_alt: f64) -> GenotypeLikelihoods {
        let to_prob = |q: f64| 10.0_f64.powf(-q / 10.0);
        GenotypeLikelihoods::new(to_prob(hom_ref), to_prob(het), to_prob(hom_alt))
    }

    /// Builds a prior around a called genotype where every other genotype has phred-scaled likelihood `genotype_quality`
    pub fn from_genotype_quality(genotype: Genotype, genotype_quality: f64) -> GenotypeLikelihoods {
        let mut phred = [genotype_quality; 3];
        phred[genotype.alt_count()] = 0.0;
        GenotypeLikelihoods::from_phred(phred[0], phred[1], phred[2])
    }

    pub fn probabilities(&self) -> &[f64; 3] {
        &self.probabilities
    }

    /// Returns phred-scaled costs for each genotype relative to the most likely one.
    /// The most likely genotype costs 0, impossible genotypes cost `MAX_GENOTYPE_COST`.
    pub fn phred_costs(&self) -> [u32; 3] {
        let max_prob = self.probabilities.iter().cloned().fold(0.0, f64::max);
        if max_prob <= 0.0 {
            // nothing is supported, so nothing is preferred
            return [0; 3];
        }

        let mut costs = [0; 3];
        for (cost, &p) in costs.iter_mut().zip(self.probabilities.iter()) {
            *cost = if p <= 0.0 {
                MAX_GENOTYPE_COST
            } else {
                let phred = -10.0 * (p / max_prob).log10();
                (phred.round() as u32).min(MAX_GENOTYPE_COST)
            };
        }
        costs
    }
}

/// A called genotype for one sample at one site, optionally with likelihoods
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenotypeCall {
    pub genotype: Genotype,
    pub likelihoods: Option<GenotypeLikelihoods>
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PedigreeError {
    #[error("individual {name:?} was already added to the pedigree")]
    DuplicateIndividual { name: String },
    #[error("individual {name:?} is not registered in the pedigree")]
    UnknownIndividual { name: String },
    #[error("individual {name:?} has {genotypes} genotypes but {likelihoods} genotype likelihoods")]
    LengthMismatch { name: String, genotypes: usize, likelihoods: usize },
    #[error("individual {name:?} is already the child in another trio")]
    ChildInMultipleTrios { name: String },
    #[error("individual {name:?} appears more than once in the same trio")]
    RepeatedTrioMember { name: String },
    #[error("pedigree contains a cycle of parent/child relationships")]
    CyclicPedigree
}

/// A member of the pedigree with genotype data aligned to the phased positions.
#[derive(Clone, Debug, PartialEq)]
pub struct Individual {
    /// the sample name
    name: String,
    /// the numeric sample id
    id: u32,
    /// one genotype per position
    genotypes: Vec<Genotype>,
    /// one optional likelihood triple per position; `None` means the genotype is trusted as given
    likelihoods: Vec<Option<GenotypeLikelihoods>>
}

impl Individual {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn genotypes(&self) -> &[Genotype] {
        &self.genotypes
    }

    pub fn likelihoods(&self) -> &[Option<GenotypeLikelihoods>] {
        &self.likelihoods
    }
}

/// A mother/father/child relationship, by numeric sample id
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Trio {
    pub mother: u32,
    pub father: u32,
    pub child: u32
}

/// Individuals plus the trios relating them.
#[derive(Clone, Debug, Default)]
pub struct Pedigree {
    /// individuals in insertion order
    individuals: Vec<Individual>,
    /// numeric sample id to index in `individuals`
    id_to_index: HashMap<u32, usize>,
    /// all registered trios
    trios: Vec<Trio>
}

impl Pedigree {
    pub fn new() -> Pedigree {
        Default::default()
    }

    /// Registers an individual with its per-position genotypes.
    /// # Arguments
    /// * `sample_ids` - the sample registry, the name is assigned an id if it does not have one
    /// * `name` - the sample name
    /// * `genotypes` - one genotype per position
    /// * `likelihoods` - one optional likelihood triple per position
    /// # Errors
    /// * if the individual was already added
    /// * if `genotypes` and `likelihoods` differ in length
    pub fn add_individual(
        &mut self, sample_ids: &mut NumericSampleIds, name: &str,
        genotypes: Vec<Genotype>, likelihoods: Vec<Option<GenotypeLikelihoods>>
    ) -> Result<u32, PedigreeError> {
        if genotypes.len() != likelihoods.len() {
            return Err(PedigreeError::LengthMismatch {
                name: name.to_string(),
                genotypes: genotypes.len(),
                likelihoods: likelihoods.len()
            });
        }

        let id = sample_ids.id_of(name);
        if self.id_to_index.contains_key(&id) {
            return Err(PedigreeError::DuplicateIndividual { name: name.to_string() });
        }

        self.id_to_index.insert(id, self.individuals.len());
        self.individuals.push(Individual {
            name: name.to_string(),
            id,
            genotypes,
            likelihoods
        });
        Ok(id)
    }

    /// Registers a trio, all three individuals must already be in the pedigree.
    /// # Errors
    /// * if any member is not registered
    /// * if the same individual is used twice
    /// * if the child already belongs to a trio
    pub fn add_relationship(&mut self, sample_ids: &NumericSampleIds, mother: &str, father: &str, child: &str) -> Result<(), PedigreeError> {
        let lookup = |name: &str| -> Result<u32, PedigreeError> {
            match sample_ids.get(name) {
                Some(id) if self.id_to_index.contains_key(&id) => Ok(id),
                _ => Err(PedigreeError::UnknownIndividual { name: name.to_string() })
            }
        };
        let mother_id = lookup(mother)?;
        let father_id = lookup(father)?;
        let child_id = lookup(child)?;

        if mother_id == father_id || mother_id == child_id {
            return Err(PedigreeError::RepeatedTrioMember { name: mother.to_string() });
        }
        if father_id == child_id {
            return Err(PedigreeError::RepeatedTrioMember { name: father.to_string() });
        }
        if self.trios.iter().any(|t| t.child == child_id) {
            return Err(PedigreeError::ChildInMultipleTrios { name: child.to_string() });
        }

        self.trios.push(Trio {
            mother: mother_id,
            father: father_id,
            child: child_id
        });
        Ok(())
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn trios(&self) -> &[Trio] {
        &self.trios
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Returns the index into `individuals()` for a numeric sample id
    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.id_to_index.get(&id).cloned()
    }

    pub fn individual(&self, id: u32) -> Option<&Individual> {
        self.index_of(id).map(|i| &self.individuals[i])
    }

    /// Returns each trio as [mother, father, child] indices into `individuals()`
    pub fn trio_indices(&self) -> Vec<[usize; 3]> {
        // members are checked when the trio is added
        self.trios.iter()
            .map(|t| [self.id_to_index[&t.mother], self.id_to_index[&t.father], self.id_to_index[&t.child]])
            .collect()
    }

    /// Groups individuals that are connected through trios.
    /// Groups are ordered by their first member, members keep insertion order.
    pub fn families(&self) -> Vec<Vec<u32>> {
        let mut labels: Vec<usize> = (0..self.individuals.len()).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for trio in self.trios.iter() {
                let members = [trio.mother, trio.father, trio.child].map(|id| self.id_to_index[&id]);
                let min_label = members.iter().map(|&m| labels[m]).min().unwrap();
                for &m in members.iter() {
                    if labels[m] != min_label {
                        let old_label = labels[m];
                        for l in labels.iter_mut() {
                            if *l == old_label {
                                *l = min_label;
                            }
                        }
                        changed = true;
                    }
                }
            }
        }

        let mut family_order: Vec<usize> = vec![];
        let mut families: HashMap<usize, Vec<u32>> = Default::default();
        for (index, &label) in labels.iter().enumerate() {
            families.entry(label).or_insert_with(|| {
                family_order.push(label);
                vec![]
            }).push(self.individuals[index].id);
        }
        family_order.into_iter()
            .map(|label| families.remove(&label).unwrap_or_default())
            .collect()
    }

    /// Returns individual indices ordered so that parents always precede their children.
    /// Ties are broken by insertion order.
    /// # Errors
    /// * if the relationships contain a cycle
    pub fn topological_order(&self) -> Result<Vec<usize>, PedigreeError> {
        let num_individuals = self.individuals.len();
        let mut parents: Vec<Vec<usize>> = vec![vec![]; num_individuals];
        for trio in self.trios.iter() {
            let child = self.id_to_index[&trio.child];
            parents[child].push(self.id_to_index[&trio.mother]);
            parents[child].push(self.id_to_index[&trio.father]);
        }

        let mut placed: Vec<bool> = vec![false; num_individuals];
        let mut order: Vec<usize> = Vec::with_capacity(num_individuals);
        while order.len() < num_individuals {
            let next = (0..num_individuals)
                .find(|&i| !placed[i] && parents[i].iter().all(|&p| placed[p]));
            match next {
                Some(i) => {
                    placed[i] = true;
                    order.push(i);
                },
                None => return Err(PedigreeError::CyclicPedigree)
            }
        }
        Ok(order)
    }
}

/// Returns true if the child genotype cannot be produced by one allele from each parent.
pub fn mendelian_conflict(mother: Genotype, father: Genotype, child: Genotype) -> bool {
    let child_count = child.alt_count();
    !mother.transmittable().iter()
        .any(|m| father.transmittable().iter().any(|f| m + f == child_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hets(n: usize) -> (Vec<Genotype>, Vec<Option<GenotypeLikelihoods>>) {
        (vec![Genotype::Heterozygous; n], vec![None; n])
    }

    #[test]
    fn test_genotype_likelihoods() {
        let gl = GenotypeLikelihoods::new(0.01, 0.98, 0.01);
        assert_eq!(gl.phred_costs(), [20, 0, 20]);

        let gl = GenotypeLikelihoods::from_phred(0.0, 30.0, 60.0);
        assert_eq!(gl.phred_costs(), [0, 30, 60]);

        let gl = GenotypeLikelihoods::new(0.0, 0.5, 0.5);
        assert_eq!(gl.phred_costs(), [MAX_GENOTYPE_COST, 0, 0]);

        assert_eq!(GenotypeLikelihoods::from_genotype_quality(Genotype::Heterozygous, 30.0).phred_costs(), [30, 0, 30]);
        assert_eq!(GenotypeLikelihoods::new(1.0, 1.0, 1.0).phred_costs(), [0, 0, 0]);
        assert_eq!(GenotypeLikelihoods::new(0.0, 0.0, 0.0).phred_costs(), [0, 0, 0]);
    }

    #[test]
    fn test_add_individual_and_relationship() {
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        let (g, l) = hets(3);
        assert_eq!(pedigree.add_individual(&mut ids, "mother", g.clone(), l.clone()), Ok(0));
        assert_eq!(pedigree.add_individual(&mut ids, "father", g.clone(), l.clone()), Ok(1));

        // child is not registered yet
        assert_eq!(
            pedigree.add_relationship(&ids, "mother", "father", "child"),
            Err(PedigreeError::UnknownIndividual { name: "child".to_string() })
        );
        assert_eq!(pedigree.add_individual(&mut ids, "child", g.clone(), l.clone()), Ok(2));
        assert_eq!(pedigree.add_relationship(&ids, "mother", "father", "child"), Ok(()));
        assert_eq!(pedigree.trios(), &[Trio { mother: 0, father: 1, child: 2 }]);

        // a child only gets one set of parents
        assert_eq!(
            pedigree.add_relationship(&ids, "father", "mother", "child"),
            Err(PedigreeError::ChildInMultipleTrios { name: "child".to_string() })
        );
        assert_eq!(
            pedigree.add_individual(&mut ids, "mother", g, l),
            Err(PedigreeError::DuplicateIndividual { name: "mother".to_string() })
        );

        let bad = pedigree.add_individual(&mut ids, "other", vec![Genotype::Heterozygous], vec![]);
        assert_eq!(bad, Err(PedigreeError::LengthMismatch { name: "other".to_string(), genotypes: 1, likelihoods: 0 }));

        assert_eq!(pedigree.individual(2).unwrap().name(), "child");
        assert!(pedigree.individual(2).unwrap().genotypes().iter().all(|g| g.is_heterozygous()));
    }

    #[test]
    fn test_families_and_order() {
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        for name in ["child", "loner", "mother", "father", "grandchild", "partner"] {
            let (g, l) = hets(1);
            pedigree.add_individual(&mut ids, name, g, l).unwrap();
        }
        pedigree.add_relationship(&ids, "mother", "father", "child").unwrap();
        pedigree.add_relationship(&ids, "child", "partner", "grandchild").unwrap();

        let families = pedigree.families();
        assert_eq!(families, vec![vec![0, 2, 3, 4, 5], vec![1]]);

        // parents must precede children
        let order = pedigree.topological_order().unwrap();
        assert_eq!(order, vec![1, 2, 3, 0, 5, 4]);
    }

    #[test]
    fn test_cyclic_pedigree() {
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        for name in ["a", "b", "c"] {
            let (g, l) = hets(1);
            pedigree.add_individual(&mut ids, name, g, l).unwrap();
        }
        pedigree.add_relationship(&ids, "a", "b", "c").unwrap();
        pedigree.add_relationship(&ids, "c", "b", "a").unwrap();
        assert_eq!(pedigree.topological_order(), Err(PedigreeError::CyclicPedigree));
    }

    #[test]
    fn test_mendelian_conflict() {
        use Genotype::*;
        assert!(!mendelian_conflict(Heterozygous, Heterozygous, HomozygousAlternate));
        assert!(!mendelian_conflict(HomozygousReference, HomozygousAlternate, Heterozygous));
        assert!(mendelian_conflict(HomozygousReference, HomozygousReference, Heterozygous));
        assert!(mendelian_conflict(HomozygousAlternate, Heterozygous, HomozygousReference));
        assert!(mendelian_conflict(HomozygousReference, HomozygousAlternate, HomozygousAlternate));
    }
}

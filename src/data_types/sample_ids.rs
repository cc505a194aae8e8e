
use rustc_hash::FxHashMap as HashMap;

/// Registry mapping sample names to dense numeric ids.
/// Ids are handed out in order of first appearance starting from 0, so they can index arrays directly.
#[derive(Clone, Debug, Default)]
pub struct NumericSampleIds {
    /// lookup from name to id
    name_to_id: HashMap<String, u32>,
    /// names in id order
    names: Vec<String>
}

impl NumericSampleIds {
    pub fn new() -> NumericSampleIds {
        Default::default()
    }

    /// Returns the id for a sample name, minting a new one if the name has not been seen.
    /// # Arguments
    /// * `name` - the sample name
    pub fn id_of(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.name_to_id.get(name) {
            id
        } else {
            let id = self.names.len() as u32;
            self.name_to_id.insert(name.to_string(), id);
            self.names.push(name.to_string());
            id
        }
    }

    /// Returns the id for a sample name without minting one
    pub fn get(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).cloned()
    }

    /// Returns the name that was registered for an id
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_str())
    }

    /// The number of registered samples
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_sample_ids() {
        let mut ids = NumericSampleIds::new();
        assert!(ids.is_empty());
        assert_eq!(ids.id_of("mother"), 0);
        assert_eq!(ids.id_of("father"), 1);
        assert_eq!(ids.id_of("mother"), 0);
        assert_eq!(ids.id_of("child"), 2);
        assert_eq!(ids.len(), 3);

        assert_eq!(ids.get("father"), Some(1));
        assert_eq!(ids.get("uncle"), None);
        assert_eq!(ids.name_of(2), Some("child"));
        assert_eq!(ids.name_of(3), None);

        // lookups never mint
        assert_eq!(ids.len(), 3);
    }
}

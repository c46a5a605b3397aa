use std::cmp::Ordering;
use std::sync::Arc;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::enzyme::{Enzyme, TERMINUS};
use crate::mass::Tolerance;
use crate::modification::ModificationSymbols;
use crate::peptide::Peptide;
use crate::Error;

/// A candidate peptide as stored on disk
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeptideEntry {
    /// Modified sequence, e.g. `PEPM[+15.9949]K`
    pub sequence: String,
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub prev_aa: Option<char>,
    #[serde(default)]
    pub next_aa: Option<char>,
}

/// Candidate peptides, sorted by monoisotopic mass
#[derive(Clone, Debug, Default)]
pub struct PeptideDatabase {
    peptides: Vec<Arc<Peptide>>,
}

impl PeptideDatabase {
    pub fn new(peptides: Vec<Peptide>) -> Self {
        let mut peptides = peptides.into_iter().map(Arc::new).collect::<Vec<_>>();
        peptides.sort_by(|a, b| a.monoisotopic.total_cmp(&b.monoisotopic));
        Self { peptides }
    }

    /// Build a database from on-disk entries, applying static modifications
    /// and computing missed cleavages. Protein accessions are interned so
    /// that peptides from the same protein share one allocation
    pub fn from_entries(
        entries: Vec<PeptideEntry>,
        static_mods: &[(u8, f32)],
        enzyme: Option<&Enzyme>,
    ) -> Result<Self, Error> {
        let mut accessions: FnvHashMap<String, Arc<str>> = FnvHashMap::default();
        let mut peptides = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut peptide: Peptide = entry.sequence.parse()?;
            for (residue, mass) in static_mods {
                peptide.static_mod(*residue, *mass);
            }
            let proteins = entry
                .proteins
                .into_iter()
                .map(|accession| {
                    accessions
                        .entry(accession)
                        .or_insert_with_key(|k| Arc::from(k.as_str()))
                        .clone()
                })
                .collect();
            let flank = |c: Option<char>| c.map(|c| c as u8).unwrap_or(TERMINUS);
            peptides.push(peptide.with_context(
                proteins,
                flank(entry.prev_aa),
                flank(entry.next_aa),
                enzyme,
            ));
        }
        log::trace!(
            "{} peptides from {} proteins",
            peptides.len(),
            accessions.len()
        );
        Ok(Self::new(peptides))
    }

    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Peptide>> {
        self.peptides.iter()
    }

    /// Peptides whose monoisotopic mass falls within `tolerance` of `mass`,
    /// in ascending mass order
    pub fn candidates(&self, mass: f32, tolerance: Tolerance) -> &[Arc<Peptide>] {
        let (lo, hi) = tolerance.bounds(mass);
        let (i, j) = binary_search_slice(
            &self.peptides,
            |peptide, query| peptide.monoisotopic.total_cmp(query),
            lo,
            hi,
        );
        // `binary_search_slice` may include one element beyond each bound
        let window = &self.peptides[i..j];
        let start = window
            .iter()
            .position(|p| p.monoisotopic >= lo)
            .unwrap_or(window.len());
        let end = window
            .iter()
            .rposition(|p| p.monoisotopic <= hi)
            .map(|idx| idx + 1)
            .unwrap_or(start)
            .max(start);
        &window[start..end]
    }

    /// Assign modification symbols in database order
    pub fn observe_modifications(&self, symbols: &mut ModificationSymbols) {
        for peptide in &self.peptides {
            symbols.observe_peptide(peptide);
        }
    }
}

#[inline]
/// Return the widest `left` and `right` indices into a `slice` (sorted by the
/// function `key`) such that all values between `low` and `high` are
/// contained in `slice[left..right]`
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binary_search_slice_smoke() {
        // Make sure that our query returns the maximal set of indices
        let data = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];
        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 1.75, 3.5);
        assert_eq!(bounds, (1, 6));
        assert!(data[bounds.0] <= 1.75);
        assert_eq!(&data[bounds.0..bounds.1], &[1.5, 2.0, 2.5, 3.0, 3.5]);

        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 0.0, 5.0);
        assert_eq!(bounds, (0, data.len()));
    }

    fn entry(sequence: &str, proteins: &[&str]) -> PeptideEntry {
        PeptideEntry {
            sequence: sequence.into(),
            proteins: proteins.iter().map(|s| s.to_string()).collect(),
            prev_aa: Some('K'),
            next_aa: None,
        }
    }

    #[test]
    fn candidate_window() {
        let db = PeptideDatabase::from_entries(
            vec![
                entry("LEQSMR", &["sp|A"]),
                entry("EQALLK", &["sp|A", "sp|B"]),
                entry("AQLTQLK", &["sp|B"]),
                entry("MEWKLEQSMR", &["sp|A"]),
            ],
            &[],
            Some(&Enzyme::trypsin()),
        )
        .unwrap();
        assert_eq!(db.len(), 4);

        let masses = db.iter().map(|p| p.monoisotopic).collect::<Vec<_>>();
        assert!(masses.windows(2).all(|w| w[0] <= w[1]));

        let target = db.iter().find(|p| p.stripped() == "AQLTQLK").unwrap().clone();
        let hits = db.candidates(target.monoisotopic, Tolerance::Da(-0.5, 0.5));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].stripped(), "AQLTQLK");

        assert!(db.candidates(100.0, Tolerance::Da(-1.0, 1.0)).is_empty());
        assert_eq!(db.candidates(1000.0, Tolerance::Da(-1000.0, 1000.0)).len(), 4);

        let shared = db.iter().find(|p| p.stripped() == "EQALLK").unwrap();
        assert_eq!(shared.proteins.len(), 2);
        assert_eq!(shared.prev_aa, b'K');
        assert_eq!(shared.next_aa, TERMINUS);

        let missed = db.iter().find(|p| p.stripped() == "MEWKLEQSMR").unwrap();
        assert_eq!(missed.missed_cleavages, 1);
    }

    #[test]
    fn static_mods_and_errors() {
        let db = PeptideDatabase::from_entries(
            vec![entry("PEPCK", &[])],
            &[(b'C', 57.0215)],
            None,
        )
        .unwrap();
        let peptide = db.iter().next().unwrap();
        assert_eq!(peptide.to_string(), "PEPC[+57.0215]K");
        let mut symbols = ModificationSymbols::default();
        db.observe_modifications(&mut symbols);
        assert_eq!(symbols.symbol(57.0215), Some('*'));

        let err = PeptideDatabase::from_entries(vec![entry("PEPXK", &[])], &[], None);
        assert!(matches!(err, Err(Error::InvalidSequence(_))));
    }
}

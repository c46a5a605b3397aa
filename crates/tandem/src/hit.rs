use std::sync::Arc;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::collection::MatchCollection;
use crate::psm::{Match, ScoreType};
use crate::Error;

/// A protein-level result: aggregate score and number of distinct
/// supporting peptides
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    protein: Arc<str>,
    score: f32,
    peptides: usize,
}

impl Hit {
    pub fn new(protein: Arc<str>, score: f32, peptides: usize) -> Self {
        Hit {
            protein,
            score,
            peptides,
        }
    }

    pub fn protein(&self) -> &str {
        &self.protein
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn peptides(&self) -> usize {
        self.peptides
    }
}

/// Strategy for combining per-peptide scores into a protein score
pub trait ProteinScorer: Send + Sync {
    /// Fold the score of one more supporting peptide into `acc`
    fn accumulate(&self, ty: ScoreType, acc: Option<f32>, peptide_score: f32) -> f32;

    /// Whether scores of type `ty` can be aggregated by this strategy
    fn supports(&self, _ty: ScoreType) -> bool {
        true
    }
}

/// Protein score is the score of its best peptide
pub struct BestPeptide;

/// Protein score is the sum of its peptide scores
pub struct SummedScore;

impl ProteinScorer for BestPeptide {
    fn accumulate(&self, ty: ScoreType, acc: Option<f32>, peptide_score: f32) -> f32 {
        match acc {
            Some(acc) if ty.compare(acc, peptide_score).is_le() => acc,
            _ => peptide_score,
        }
    }
}

impl ProteinScorer for SummedScore {
    fn accumulate(&self, _ty: ScoreType, acc: Option<f32>, peptide_score: f32) -> f32 {
        acc.unwrap_or_default() + peptide_score
    }

    /// Summing q-values has no meaning
    fn supports(&self, ty: ScoreType) -> bool {
        ty.higher_is_better()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinScoring {
    #[default]
    BestPeptide,
    SummedScore,
}

impl ProteinScoring {
    pub fn build(self) -> Box<dyn ProteinScorer> {
        match self {
            ProteinScoring::BestPeptide => Box::new(BestPeptide),
            ProteinScoring::SummedScore => Box::new(SummedScore),
        }
    }
}

/// Bounded set of protein hits, best score first
#[derive(Clone, Debug, Default)]
pub struct HitCollection {
    hits: Vec<Hit>,
    capacity: usize,
}

impl HitCollection {
    /// Assemble protein hits from target matches in `collection`.
    ///
    /// Each peptide sequence contributes only its best score for `ty`, so
    /// modified forms of a sequence count once. Decoy matches are skipped
    pub fn from_matches(
        collection: &MatchCollection,
        ty: ScoreType,
        scorer: &dyn ProteinScorer,
        capacity: usize,
    ) -> Result<Self, Error> {
        if !scorer.supports(ty) {
            return Err(Error::UnsupportedScore(ty));
        }

        let mut best: FnvHashMap<String, (f32, &Match)> = FnvHashMap::default();
        for m in collection.iter().filter(|m| !m.decoy) {
            let score = m.score(ty)?;
            let entry = best.entry(m.sequence()).or_insert((score, m));
            if ty.compare(score, entry.0).is_lt() {
                *entry = (score, m);
            }
        }

        // Iterate peptides in a fixed order so that summed scores are
        // reproducible
        let mut peptides = best.into_iter().collect::<Vec<_>>();
        peptides.sort_by(|a, b| a.0.cmp(&b.0));

        let mut proteins: FnvHashMap<Arc<str>, (f32, usize)> = FnvHashMap::default();
        for (_, (score, m)) in peptides {
            for protein in &m.peptide.proteins {
                let entry = proteins.entry(protein.clone()).or_insert((f32::NAN, 0));
                let acc = match entry.1 {
                    0 => None,
                    _ => Some(entry.0),
                };
                *entry = (scorer.accumulate(ty, acc, score), entry.1 + 1);
            }
        }

        if proteins.len() > capacity {
            return Err(Error::CapacityExceeded { capacity });
        }

        let mut hits = proteins
            .into_iter()
            .map(|(protein, (score, peptides))| Hit::new(protein, score, peptides))
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| {
            ty.compare(a.score, b.score)
                .then_with(|| a.protein.cmp(&b.protein))
        });

        Ok(HitCollection { hits, capacity })
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A fresh iterator, best hit first
    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }
}

impl<'a> IntoIterator for &'a HitCollection {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::Overflow;
    use crate::peptide::Peptide;
    use crate::spectrum::{Spectrum, ZState};

    fn add(c: &mut MatchCollection, seq: &str, proteins: &[&str], score: f32, decoy: bool) {
        let mut peptide: Peptide = seq.parse().unwrap();
        peptide.decoy = decoy;
        peptide.proteins = proteins.iter().map(|&p| Arc::from(p)).collect();
        let mut m = Match::new(
            Arc::new(peptide),
            Arc::new(Spectrum::default()),
            ZState::from_mz(500.0, 2),
        );
        m.set_score(ScoreType::XCorr, score);
        c.add(m).unwrap();
    }

    fn example() -> MatchCollection {
        let mut c = MatchCollection::new(100, Overflow::Fail);
        add(&mut c, "PEPTIDEK", &["A", "B"], 2.0, false);
        add(&mut c, "PEPTIDEK", &["A", "B"], 3.0, false);
        add(&mut c, "LESSK", &["B"], 1.5, false);
        add(&mut c, "MASSR", &["C"], 0.5, false);
        add(&mut c, "KEDITPEP", &["rev_A"], 10.0, true);
        c
    }

    #[test]
    fn best_peptide() {
        let hits = HitCollection::from_matches(&example(), ScoreType::XCorr, &BestPeptide, 10)
            .unwrap();
        let summary = hits
            .iter()
            .map(|h| (h.protein().to_string(), h.score(), h.peptides()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("A".into(), 3.0, 1),
                ("B".into(), 3.0, 2),
                ("C".into(), 0.5, 1)
            ]
        );
        // Iteration restarts from the beginning each time
        assert_eq!(hits.iter().count(), 3);
        assert_eq!((&hits).into_iter().count(), 3);
    }

    #[test]
    fn summed_score() {
        let hits = HitCollection::from_matches(
            &example(),
            ScoreType::XCorr,
            ProteinScoring::SummedScore.build().as_ref(),
            10,
        )
        .unwrap();
        let first = hits.iter().next().unwrap();
        assert_eq!(first.protein(), "B");
        assert_eq!(first.score(), 4.5);
    }

    #[test]
    fn modified_forms_count_once() {
        let mut c = MatchCollection::new(10, Overflow::Fail);
        add(&mut c, "PEPMK", &["A"], 2.0, false);
        add(&mut c, "PEPM[+15.9949]K", &["A"], 3.0, false);
        for scorer in [ProteinScoring::BestPeptide, ProteinScoring::SummedScore] {
            let hits =
                HitCollection::from_matches(&c, ScoreType::XCorr, scorer.build().as_ref(), 10)
                    .unwrap();
            let hit = hits.iter().next().unwrap();
            assert_eq!((hit.score(), hit.peptides()), (3.0, 1));
        }
    }

    #[test]
    fn lower_is_better_scores() {
        let mut c = MatchCollection::new(10, Overflow::Fail);
        for (seq, q) in [("PEPTIDEK", 0.2), ("LESSK", 0.01), ("MASSR", 0.05)] {
            let mut peptide: Peptide = seq.parse().unwrap();
            peptide.proteins = vec![Arc::from(if seq == "MASSR" { "B" } else { "A" })];
            let mut m = Match::new(
                Arc::new(peptide),
                Arc::new(Spectrum::default()),
                ZState::from_mz(500.0, 2),
            );
            m.set_score(ScoreType::DecoyXCorrQValue, q);
            c.add(m).unwrap();
        }

        let hits =
            HitCollection::from_matches(&c, ScoreType::DecoyXCorrQValue, &BestPeptide, 10)
                .unwrap();
        let summary = hits
            .iter()
            .map(|h| (h.protein().to_string(), h.score(), h.peptides()))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![("A".into(), 0.01, 2), ("B".into(), 0.05, 1)]);

        assert_eq!(
            HitCollection::from_matches(&c, ScoreType::DecoyXCorrQValue, &SummedScore, 10)
                .unwrap_err(),
            Error::UnsupportedScore(ScoreType::DecoyXCorrQValue)
        );
    }

    #[test]
    fn capacity_and_unscored() {
        assert_eq!(
            HitCollection::from_matches(&example(), ScoreType::XCorr, &BestPeptide, 2)
                .unwrap_err(),
            Error::CapacityExceeded { capacity: 2 }
        );
        assert_eq!(
            HitCollection::from_matches(&example(), ScoreType::Sp, &BestPeptide, 10)
                .unwrap_err(),
            Error::ScoreNotComputed(ScoreType::Sp)
        );
        let empty = MatchCollection::new(1, Overflow::Fail);
        assert!(HitCollection::from_matches(&empty, ScoreType::XCorr, &BestPeptide, 0)
            .unwrap()
            .is_empty());
    }
}

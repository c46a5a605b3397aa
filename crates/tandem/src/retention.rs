use serde::{Deserialize, Serialize};

use crate::psm::Match;

/// Predicts peptide retention time, in arbitrary units
pub trait RetentionPredictor: Send + Sync {
    fn predict(&self, m: &Match) -> f32;

    /// Signed difference of largest magnitude between the predictions for
    /// any two matches, later minus earlier. Zero for fewer than two matches
    fn max_difference(&self, matches: &[&Match]) -> f32 {
        let predictions = matches.iter().map(|m| self.predict(m)).collect::<Vec<_>>();
        let mut max_diff = 0.0f32;
        for (i, a) in predictions.iter().enumerate() {
            for b in &predictions[i + 1..] {
                let diff = b - a;
                if diff.abs() > max_diff.abs() {
                    max_diff = diff;
                }
            }
        }
        max_diff
    }
}

/// Always predicts zero
pub struct NullPredictor;

impl RetentionPredictor for NullPredictor {
    fn predict(&self, _: &Match) -> f32 {
        0.0
    }
}

/// Sum of per-residue hydrophobicity retention coefficients
pub struct HydrophobicityPredictor;

impl HydrophobicityPredictor {
    fn coefficient(residue: u8) -> f32 {
        match residue {
            b'W' => 11.0,
            b'F' => 10.5,
            b'L' => 9.6,
            b'I' => 8.4,
            b'M' => 5.8,
            b'V' => 5.0,
            b'Y' => 4.0,
            b'A' => 0.8,
            b'E' => 0.0,
            b'P' => -0.2,
            b'T' => -0.3,
            b'D' => -0.5,
            b'C' | b'S' => -0.8,
            b'Q' | b'G' => -0.9,
            b'N' => -1.2,
            b'R' | b'H' => -1.3,
            b'K' => -1.9,
            _ => 0.0,
        }
    }
}

impl RetentionPredictor for HydrophobicityPredictor {
    fn predict(&self, m: &Match) -> f32 {
        m.peptide
            .sequence
            .iter()
            .map(|r| Self::coefficient(r.aa()))
            .sum()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionModel {
    #[default]
    Null,
    Hydrophobicity,
}

impl RetentionModel {
    pub fn build(self) -> Box<dyn RetentionPredictor> {
        match self {
            RetentionModel::Null => Box::new(NullPredictor),
            RetentionModel::Hydrophobicity => Box::new(HydrophobicityPredictor),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::peptide::Peptide;
    use crate::spectrum::{Spectrum, ZState};

    fn m(seq: &str) -> Match {
        let peptide: Peptide = seq.parse().unwrap();
        Match::new(
            Arc::new(peptide),
            Arc::new(Spectrum::default()),
            ZState::from_mz(400.0, 2),
        )
    }

    #[test]
    fn max_difference() {
        let predictor = RetentionModel::Hydrophobicity.build();
        let (a, b, c) = (m("WFK"), m("GGK"), m("LLK"));
        assert!((predictor.predict(&a) - 19.6).abs() < 1e-4);

        // GGK - WFK is the largest swing and keeps its sign
        let diff = predictor.max_difference(&[&a, &b, &c]);
        assert!((diff - (-3.7 - 19.6)).abs() < 1e-4, "{}", diff);
        assert_eq!(predictor.max_difference(&[&a]), 0.0);

        let null = RetentionModel::default().build();
        assert_eq!(null.max_difference(&[&a, &b, &c]), 0.0);
    }
}

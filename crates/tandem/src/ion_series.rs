use serde::{Deserialize, Serialize};

use crate::mass::{Mass, CO, PROTON};
use crate::peptide::Peptide;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    A,
    B,
    Y,
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug)]
pub struct Ion {
    pub kind: Kind,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f32,
}

impl Ion {
    /// m/z of this fragment at a given charge
    pub fn mz(&self, charge: u8) -> f32 {
        let z = charge.max(1) as f32;
        (self.monoisotopic_mass + z * PROTON) / z
    }
}

/// Generate fragment ions for a candidate peptide, shortest fragment first
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f32,
    peptide: &'p Peptide,
    idx: usize,
}

impl<'p> IonSeries<'p> {
    pub fn new(peptide: &'p Peptide, kind: Kind) -> Self {
        let nterm = peptide.nterm.unwrap_or_default();
        let cumulative_mass = match kind {
            Kind::A => nterm - CO,
            Kind::B => nterm,
            Kind::Y => peptide.monoisotopic - nterm,
        };
        Self {
            kind,
            cumulative_mass,
            peptide,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    // Memoize cumulative mass of the peptide fragment, each step adds
    // (or removes) a single residue
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.peptide.sequence.len() {
            return None;
        }
        let r = self.peptide.sequence.get(self.idx)?;

        self.cumulative_mass += match self.kind {
            Kind::A | Kind::B => r.monoisotopic(),
            Kind::Y => -r.monoisotopic(),
        };
        self.idx += 1;

        Some(Ion {
            kind: self.kind,
            monoisotopic_mass: self.cumulative_mass,
        })
    }
}

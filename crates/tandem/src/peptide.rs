use std::{fmt::Write, str::FromStr, sync::Arc};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    collection::shuffle_range,
    enzyme::{Enzyme, TERMINUS},
    mass::{Mass, Residue, H2O, VALID_AA},
    modification::ModificationSymbols,
    Error,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Peptide {
    pub decoy: bool,
    pub sequence: Vec<Residue>,
    pub nterm: Option<f32>,
    pub monoisotopic: f32,
    pub missed_cleavages: u8,
    /// Accessions of every protein containing this sequence
    pub proteins: Vec<Arc<str>>,
    /// Residue preceding the peptide in its first protein, or [`TERMINUS`]
    pub prev_aa: u8,
    /// Residue following the peptide in its first protein, or [`TERMINUS`]
    pub next_aa: u8,
}

/// Strategy used to derive null (decoy) peptides from targets
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decoy {
    #[default]
    Shuffle,
    Reverse,
}

impl Peptide {
    fn set_nterm_mod(&mut self, m: f32) {
        if self.nterm.is_none() {
            self.nterm = Some(m);
            self.monoisotopic += m;
        }
    }

    pub fn label(&self) -> i32 {
        match self.decoy {
            true => -1,
            false => 1,
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Unmodified amino acid sequence
    pub fn residues(&self) -> Vec<u8> {
        self.sequence.iter().map(Residue::aa).collect()
    }

    /// Unmodified amino acid sequence as a string
    pub fn stripped(&self) -> String {
        self.sequence.iter().map(|r| r.aa() as char).collect()
    }

    /// Total number of modifications, including any N-terminal modification
    pub fn modification_count(&self) -> usize {
        self.nterm.iter().count()
            + self
                .sequence
                .iter()
                .map(|r| r.modifications().len())
                .sum::<usize>()
    }

    /// Apply a static modification to a peptide in-place. `^` denotes the
    /// peptide N-terminus
    pub fn static_mod(&mut self, residue: u8, mass: f32) {
        if residue == b'^' {
            return self.set_nterm_mod(mass);
        }

        for resi in self.sequence.iter_mut() {
            // Don't stack onto an already modified amino acid
            if let Residue::Just(c) = resi {
                if *c == residue {
                    self.monoisotopic += mass;
                    resi.modify(mass);
                }
            }
        }
    }

    /// Attach protein context and recompute missed cleavages
    pub fn with_context(
        mut self,
        proteins: Vec<Arc<str>>,
        prev_aa: u8,
        next_aa: u8,
        enzyme: Option<&Enzyme>,
    ) -> Self {
        self.proteins = proteins;
        self.prev_aa = prev_aa;
        self.next_aa = next_aa;
        self.missed_cleavages = enzyme
            .map(|e| e.internal_cleavages(&self.residues()))
            .unwrap_or_default()
            .min(u8::MAX as usize) as u8;
        self
    }

    /// Generate a null peptide by permuting the interior residues. The
    /// N- and C-terminal residues (and their modifications) stay in place,
    /// so the precursor mass is unchanged
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Peptide {
        let mut decoy = self.clone();
        decoy.decoy = true;
        let n = decoy.sequence.len();
        if n > 3 {
            shuffle_range(&mut decoy.sequence, 1, n - 1, rng)
                .expect("interior of a peptide is a valid range");
        }
        decoy
    }

    /// Generate a null peptide by reversing the interior residues
    pub fn reversed(&self) -> Peptide {
        let mut decoy = self.clone();
        decoy.decoy = true;
        let n = decoy.sequence.len();
        if n > 2 {
            decoy.sequence[1..n - 1].reverse();
        }
        decoy
    }

    pub fn decoy<R: Rng + ?Sized>(&self, kind: Decoy, rng: &mut R) -> Peptide {
        match kind {
            Decoy::Shuffle => self.shuffled(rng),
            Decoy::Reverse => self.reversed(),
        }
    }

    fn residue_masses(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        let nterm = match index {
            0 => self.nterm,
            _ => None,
        };
        nterm
            .into_iter()
            .chain(self.sequence[index].modifications().iter().copied())
    }

    /// Sequence with each modification rendered as its assigned symbol,
    /// e.g. `PEPM*K`. N-terminal modifications attach to the first residue.
    /// Masses without a symbol are printed in brackets
    pub fn sequence_with_symbols(&self, symbols: &ModificationSymbols) -> String {
        let mut s = String::with_capacity(self.sequence.len() * 2);
        for (idx, residue) in self.sequence.iter().enumerate() {
            s.push(residue.aa() as char);
            for m in self.residue_masses(idx) {
                match symbols.symbol(m) {
                    Some(symbol) => s.push(symbol),
                    None => {
                        let _ = write!(s, "[{:.2}]", m);
                    }
                }
            }
        }
        s
    }

    /// Sequence with modification masses in brackets, e.g. `PEPM[15.99]K`.
    /// With `merge`, stacked modifications are summed into a single value
    pub fn sequence_with_masses(&self, merge: bool, precision: usize) -> String {
        let mut s = String::with_capacity(self.sequence.len() * 2);
        for (idx, residue) in self.sequence.iter().enumerate() {
            s.push(residue.aa() as char);
            let masses = self.residue_masses(idx).collect::<Vec<_>>();
            if masses.is_empty() {
                continue;
            }
            s.push('[');
            if merge {
                let _ = write!(s, "{:.*}", precision, masses.iter().sum::<f32>());
            } else {
                for (i, m) in masses.iter().enumerate() {
                    if i > 0 {
                        s.push(',');
                    }
                    let _ = write!(s, "{:.*}", precision, m);
                }
            }
            s.push(']');
        }
        s
    }

    /// SQT-style sequence, `X.SEQ.X`, using flanking residues
    pub fn sequence_sqt(&self, symbols: &ModificationSymbols) -> String {
        format!(
            "{}.{}.{}",
            self.prev_aa as char,
            self.sequence_with_symbols(symbols),
            self.next_aa as char
        )
    }
}

impl FromStr for Peptide {
    type Err = Error;

    /// Parse a (possibly modified) sequence, e.g. `[+42.0106]-PEPM[+15.9949]K`.
    /// Multiple modifications on one residue may be written as repeated
    /// brackets or as a comma-separated list
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidSequence(s.to_string());
        let bytes = s.as_bytes();
        let mut idx = 0;

        let parse_bracket = |idx: &mut usize| -> Result<Vec<f32>, Error> {
            let close = bytes[*idx..]
                .iter()
                .position(|&b| b == b']')
                .ok_or_else(invalid)?;
            let inner = &s[*idx + 1..*idx + close];
            *idx += close + 1;
            inner
                .split(',')
                .map(|m| m.trim().parse::<f32>().map_err(|_| invalid()))
                .collect()
        };

        let mut nterm = None;
        if bytes.first() == Some(&b'[') {
            let masses = parse_bracket(&mut idx)?;
            if bytes.get(idx) != Some(&b'-') {
                return Err(invalid());
            }
            idx += 1;
            nterm = Some(masses.iter().sum::<f32>());
        }

        let mut sequence: Vec<Residue> = Vec::with_capacity(bytes.len());
        while idx < bytes.len() {
            match bytes[idx] {
                b'[' => {
                    let residue = sequence.last_mut().ok_or_else(invalid)?;
                    for m in parse_bracket(&mut idx)? {
                        residue.modify(m);
                    }
                }
                c if VALID_AA.contains(&c) => {
                    sequence.push(Residue::Just(c));
                    idx += 1;
                }
                _ => return Err(invalid()),
            }
        }

        if sequence.is_empty() {
            return Err(invalid());
        }

        let monoisotopic = H2O
            + nterm.unwrap_or_default()
            + sequence.iter().map(Mass::monoisotopic).sum::<f32>();

        Ok(Peptide {
            decoy: false,
            sequence,
            nterm,
            monoisotopic,
            missed_cleavages: 0,
            proteins: Vec::new(),
            prev_aa: TERMINUS,
            next_aa: TERMINUS,
        })
    }
}

impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.nterm {
            if m.is_sign_positive() {
                write!(f, "[+{}]-", m)?;
            } else {
                write!(f, "[{}]-", m)?;
            }
        }
        for residue in &self.sequence {
            write!(f, "{}", residue)?;
        }
        Ok(())
    }
}

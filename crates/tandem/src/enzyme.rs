use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mass::VALID_AA;

/// Residue used in place of a flanking amino acid at a protein terminus
pub const TERMINUS: u8 = b'-';

/// User-facing description of an enzyme, deserialized from the
/// configuration file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnzymeParameters {
    /// Amino acids to cleave at, e.g. "KR". An empty string means no enzyme
    pub cleave_at: String,
    /// Skip cleaving if the site is followed by this amino acid
    pub restrict: Option<char>,
    /// Cleave at the c-terminal side of `cleave_at`
    pub c_terminal: Option<bool>,
}

impl Default for EnzymeParameters {
    fn default() -> Self {
        Self {
            cleave_at: "KR".into(),
            restrict: Some('P'),
            c_terminal: None,
        }
    }
}

impl EnzymeParameters {
    pub fn build(&self) -> Option<Enzyme> {
        Enzyme::new(
            &self.cleave_at,
            self.restrict,
            self.c_terminal.unwrap_or(true),
        )
    }
}

#[derive(Clone, Debug)]
pub struct Enzyme {
    // Skip cleaving if the site is followed matching this AA
    pub skip_suffix: Option<char>,
    // Regex for matching cleavage sites
    regex: Regex,
    // Cleave at c-terminal?
    pub c_terminal: bool,
}

impl Enzyme {
    pub fn new(cleave: &str, skip_suffix: Option<char>, c_terminal: bool) -> Option<Self> {
        assert!(
            cleave.chars().all(|x| VALID_AA.contains(&(x as u8))),
            "Enzyme cleavage sequence contains non-amino acid characters: {}",
            cleave
        );

        assert!(
            skip_suffix
                .map(|x| VALID_AA.contains(&(x as u8)))
                .unwrap_or(true),
            "Enzyme cleavage restriction is non-amino acid character: {:?}",
            skip_suffix,
        );

        match cleave {
            "" => None,
            _ => Some(Enzyme {
                regex: Regex::new(&format!("[{}]", cleave)).ok()?,
                skip_suffix,
                c_terminal,
            }),
        }
    }

    pub fn trypsin() -> Self {
        Enzyme {
            regex: Regex::new("[KR]").expect("valid regex"),
            skip_suffix: Some('P'),
            c_terminal: true,
        }
    }

    fn cleaves(&self, residue: u8) -> bool {
        let mut buf = [0u8; 4];
        self.regex.is_match((residue as char).encode_utf8(&mut buf))
    }

    /// Is the bond between `left` and `right` a cleavage site for this enzyme?
    /// Protein termini ([`TERMINUS`]) always count as cleavage sites.
    pub fn is_site(&self, left: u8, right: u8) -> bool {
        if left == TERMINUS || right == TERMINUS {
            return true;
        }
        match self.c_terminal {
            true => {
                self.cleaves(left)
                    && self
                        .skip_suffix
                        .map(|skip| skip as u8 != right)
                        .unwrap_or(true)
            }
            false => self.cleaves(right),
        }
    }

    /// Number of cleavage sites inside of `sequence`, i.e. missed cleavages
    pub fn internal_cleavages(&self, sequence: &[u8]) -> usize {
        sequence
            .windows(2)
            .filter(|pair| self.is_site(pair[0], pair[1]))
            .count()
    }

    /// Returns whether the N- and C-terminal boundaries of a peptide are
    /// enzymatic, given the flanking residues in the parent protein
    pub fn terminal_cleavages(&self, prev: u8, sequence: &[u8], next: u8) -> (bool, bool) {
        let (first, last) = match (sequence.first(), sequence.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return (false, false),
        };
        (self.is_site(prev, first), self.is_site(last, next))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trypsin_sites() {
        let tryp = Enzyme::trypsin();
        assert!(tryp.is_site(b'K', b'A'));
        assert!(tryp.is_site(b'R', b'G'));
        assert!(!tryp.is_site(b'K', b'P'));
        assert!(!tryp.is_site(b'A', b'K'));
        assert!(tryp.is_site(TERMINUS, b'M'));
        assert!(tryp.is_site(b'A', TERMINUS));
    }

    #[test]
    fn missed_cleavages() {
        let tryp = Enzyme::trypsin();
        assert_eq!(tryp.internal_cleavages(b"MADEEK"), 0);
        assert_eq!(tryp.internal_cleavages(b"MADEEKLPPGWEK"), 1);
        assert_eq!(tryp.internal_cleavages(b"LPPGWEKRMSR"), 2);
        assert_eq!(tryp.internal_cleavages(b"VYYFNHITNASQWERPSGN"), 0);
    }

    #[test]
    fn terminal_cleavages() {
        let tryp = Enzyme::trypsin();
        assert_eq!(tryp.terminal_cleavages(b'K', b"LPPGWEK", b'R'), (true, true));
        assert_eq!(tryp.terminal_cleavages(b'A', b"LPPGWEK", b'P'), (false, false));
        assert_eq!(tryp.terminal_cleavages(TERMINUS, b"MADEEK", b'L'), (true, true));
        assert_eq!(tryp.terminal_cleavages(b'K', b"", b'R'), (false, false));
    }

    #[test]
    fn from_parameters() {
        assert!(EnzymeParameters::default().build().is_some());
        let none = EnzymeParameters {
            cleave_at: "".into(),
            restrict: None,
            c_terminal: None,
        };
        assert!(none.build().is_none());

        let aspn = Enzyme::new("D", None, false).unwrap();
        assert!(aspn.is_site(b'A', b'D'));
        assert!(!aspn.is_site(b'D', b'A'));
    }
}

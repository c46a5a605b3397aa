use std::collections::HashMap;

use crate::mass::VALID_AA;
use crate::peptide::Peptide;

/// Characters used to annotate modified residues, assigned in order
pub const SYMBOLS: [char; 11] = ['*', '#', '@', '^', '~', '%', '$', '&', '!', '?', '+'];

/// Modification masses are compared at a resolution of 1e-4 Da
fn mass_key(mass: f32) -> i64 {
    (mass as f64 * 10_000.0).round() as i64
}

/// Assignment of annotation symbols to distinct modification masses.
///
/// Symbols are handed out in order of first occurrence, so two tables built
/// from the same sequence of observations always render identical strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModificationSymbols {
    assigned: Vec<(i64, f32, char)>,
}

impl ModificationSymbols {
    pub fn from_masses<I: IntoIterator<Item = f32>>(masses: I) -> Self {
        let mut symbols = Self::default();
        for mass in masses {
            symbols.observe(mass);
        }
        symbols
    }

    /// Register `mass`, returning its symbol. Returns `None` once all
    /// symbols have been handed out
    pub fn observe(&mut self, mass: f32) -> Option<char> {
        if let Some(symbol) = self.symbol(mass) {
            return Some(symbol);
        }
        match SYMBOLS.get(self.assigned.len()) {
            Some(&symbol) => {
                self.assigned.push((mass_key(mass), mass, symbol));
                Some(symbol)
            }
            None => {
                log::warn!(
                    "more than {} distinct modification masses, {} will be printed as a mass",
                    SYMBOLS.len(),
                    mass
                );
                None
            }
        }
    }

    /// Register every modification carried by `peptide`, N-terminus first
    pub fn observe_peptide(&mut self, peptide: &Peptide) {
        if let Some(m) = peptide.nterm {
            self.observe(m);
        }
        for residue in &peptide.sequence {
            for m in residue.modifications() {
                self.observe(*m);
            }
        }
    }

    pub fn symbol(&self, mass: f32) -> Option<char> {
        let key = mass_key(mass);
        self.assigned
            .iter()
            .find(|(k, _, _)| *k == key)
            .map(|(_, _, symbol)| *symbol)
    }

    /// Iterate over (symbol, mass) pairs in assignment order
    pub fn iter(&self) -> impl Iterator<Item = (char, f32)> + '_ {
        self.assigned.iter().map(|(_, mass, symbol)| (*symbol, *mass))
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

/// Parse user-supplied modifications, keyed by residue (or `^` for the
/// peptide N-terminus). Invalid entries are logged and skipped. The output
/// is sorted so that symbol assignment does not depend on map ordering
pub fn validate_mods(input: Option<HashMap<String, f32>>) -> Vec<(u8, f32)> {
    let mut output = Vec::new();
    if let Some(input) = input {
        for (s, mass) in input {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (None, _) => log::error!("Invalid modification string: empty"),
                (Some(_), Some(_)) => {
                    log::error!("Invalid modification string: {} is too long", s)
                }
                (Some(c), None) if c == '^' || VALID_AA.contains(&(c as u8)) => {
                    output.push((c as u8, mass))
                }
                (Some(c), None) => {
                    log::error!("Invalid modification string: unrecognized residue ({})", c)
                }
            }
        }
    }
    output.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
    output
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_occurrence_order() {
        let mut symbols = ModificationSymbols::default();
        assert_eq!(symbols.observe(15.9949), Some('*'));
        assert_eq!(symbols.observe(79.96633), Some('#'));
        assert_eq!(symbols.observe(15.99492), Some('*'));
        assert_eq!(symbols.symbol(79.96633), Some('#'));
        assert_eq!(symbols.symbol(42.0), None);
        assert_eq!(symbols.len(), 2);
    }

    #[test]
    fn exhausted_symbols() {
        let mut symbols = ModificationSymbols::from_masses((0..SYMBOLS.len()).map(|x| x as f32));
        assert_eq!(symbols.len(), SYMBOLS.len());
        assert_eq!(symbols.observe(100.0), None);
        assert_eq!(symbols.symbol(10.0), Some('+'));
    }

    #[test]
    fn parse_modifications() {
        let mut input = HashMap::new();
        input.insert("M".to_string(), 15.9949);
        input.insert("^".to_string(), 42.0106);
        input.insert("Z".to_string(), 1.0);
        input.insert("MM".to_string(), 1.0);
        input.insert("C".to_string(), 57.0215);
        assert_eq!(
            validate_mods(Some(input)),
            vec![(b'C', 57.0215), (b'M', 15.9949), (b'^', 42.0106)]
        );
        assert!(validate_mods(None).is_empty());
    }
}

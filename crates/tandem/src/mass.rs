use std::{fmt::Write, ops::Mul};

use serde::{Deserialize, Serialize};

pub const H2O: f32 = 18.010565;
pub const PROTON: f32 = 1.0072764;
pub const NEUTRON: f32 = 1.00335;
pub const NH3: f32 = 17.026548;
pub const CO: f32 = 27.994915;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f32, f32),
    Da(f32, f32),
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) for for a monoisotopic
    /// mass and a given tolerance
    pub fn bounds(&self, center: f32) -> (f32, f32) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    pub fn contains(&self, center: f32, rhs: f32) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }
}

impl Mul<f32> for Tolerance {
    type Output = Tolerance;

    fn mul(self, rhs: f32) -> Self::Output {
        match self {
            Tolerance::Ppm(lo, hi) => Tolerance::Ppm(lo * rhs, hi * rhs),
            Tolerance::Da(lo, hi) => Tolerance::Da(lo * rhs, hi * rhs),
        }
    }
}

pub trait Mass {
    fn monoisotopic(&self) -> f32;
}

/// An amino acid residue, possibly carrying one or more mass modifications.
#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize)]
pub enum Residue {
    // Standard amino acid residue
    Just(u8),
    // Amino acid residue with mass modifications, in order of application
    Mod(u8, Vec<f32>),
}

impl Residue {
    pub fn aa(&self) -> u8 {
        match self {
            Residue::Just(c) | Residue::Mod(c, _) => *c,
        }
    }

    pub fn modifications(&self) -> &[f32] {
        match self {
            Residue::Just(_) => &[],
            Residue::Mod(_, mods) => mods,
        }
    }

    /// Attach an additional modification mass to this residue
    pub fn modify(&mut self, mass: f32) {
        match self {
            Residue::Just(c) => *self = Residue::Mod(*c, vec![mass]),
            Residue::Mod(_, mods) => mods.push(mass),
        }
    }
}

impl Mass for Residue {
    fn monoisotopic(&self) -> f32 {
        match self {
            Residue::Just(c) => c.monoisotopic(),
            Residue::Mod(c, m) => c.monoisotopic() + m.iter().sum::<f32>(),
        }
    }
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> f32 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

impl std::fmt::Display for Residue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Residue::Just(c) => f.write_char(*c as char),
            Residue::Mod(c, mods) => {
                f.write_char(*c as char)?;
                for m in mods {
                    if m.is_sign_positive() {
                        write!(f, "[+{}]", m)?;
                    } else {
                        write!(f, "[{}]", m)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Mass, Residue, Tolerance, VALID_AA};

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic() > 0.0);
        }
    }

    #[test]
    fn tolerances() {
        assert_eq!(
            Tolerance::Ppm(-10.0, 20.0).bounds(1000.0),
            (999.99, 1000.02)
        );
        assert_eq!(
            Tolerance::Ppm(-50.0, 50.0).bounds(1000.0),
            (999.95, 1000.05)
        );
        assert_eq!(Tolerance::Da(-0.5, 0.5).bounds(100.0), (99.5, 100.5));
        assert!(Tolerance::Da(-1.0, 1.0).contains(500.0, 500.9));
        assert!(!Tolerance::Da(-1.0, 1.0).contains(500.0, 501.1));
    }

    #[test]
    fn stacked_modifications() {
        let mut residue = Residue::Just(b'M');
        residue.modify(15.9949);
        residue.modify(1.0);
        assert_eq!(residue.modifications(), &[15.9949, 1.0]);
        assert!((residue.monoisotopic() - (131.0405 + 16.9949)).abs() < 1e-4);
        assert_eq!(residue.to_string(), "M[+15.9949][+1]");
    }
}

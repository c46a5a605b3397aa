use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::database::binary_search_slice;
use crate::mass::{Tolerance, PROTON};

/// Charge states searched when a spectrum does not report any
pub const DEFAULT_CHARGES: [u8; 2] = [2, 3];

#[derive(PartialEq, PartialOrd, Copy, Clone, Default, Debug, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f32,
    pub intensity: f32,
}

/// An MS2 spectrum, as loaded from disk
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Spectrum {
    pub first_scan: u32,
    #[serde(default)]
    pub last_scan: Option<u32>,
    pub precursor_mz: f32,
    /// Candidate precursor charges. Empty means unknown
    #[serde(default)]
    pub charges: Vec<u8>,
    /// Retention time, in minutes
    #[serde(default)]
    pub retention_time: Option<f32>,
    /// MS peaks, sorted by m/z in ascending order after [`Spectrum::sort_peaks`]
    pub peaks: Vec<Peak>,
}

/// A precursor charge hypothesis for a spectrum
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ZState {
    pub charge: u8,
    /// Neutral precursor mass, `(m/z - proton) * charge`
    pub neutral_mass: f32,
}

impl ZState {
    pub fn from_mz(mz: f32, charge: u8) -> Self {
        ZState {
            charge,
            neutral_mass: (mz - PROTON) * charge as f32,
        }
    }

    /// Singly protonated precursor mass, [M+H]+
    pub fn singly_charged_mass(&self) -> f32 {
        self.neutral_mass + PROTON
    }

    pub fn mz(&self) -> f32 {
        self.neutral_mass / self.charge.max(1) as f32 + PROTON
    }
}

impl Spectrum {
    pub fn last_scan(&self) -> u32 {
        self.last_scan.unwrap_or(self.first_scan)
    }

    pub fn sort_peaks(&mut self) {
        self.peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
    }

    pub fn max_mz(&self) -> f32 {
        self.peaks.iter().map(|p| p.mz).fold(0.0, f32::max)
    }

    pub fn max_intensity(&self) -> f32 {
        self.peaks.iter().map(|p| p.intensity).fold(0.0, f32::max)
    }

    pub fn total_intensity(&self) -> f32 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    /// Charge states to search for this spectrum
    pub fn zstates(&self) -> Vec<ZState> {
        let charges: &[u8] = match self.charges.is_empty() {
            true => &DEFAULT_CHARGES,
            false => &self.charges,
        };
        charges
            .iter()
            .map(|&z| ZState::from_mz(self.precursor_mz, z))
            .collect()
    }
}

/// Iterate over every (spectrum, charge state) pair, in file order.
///
/// Spectra with fewer than `min_peaks` peaks are skipped. If `charge` is set,
/// only that charge state is produced
pub struct SpectrumCharges<'s> {
    spectra: &'s [Arc<Spectrum>],
    min_peaks: usize,
    charge: Option<u8>,
    idx: usize,
    pending: std::vec::IntoIter<ZState>,
}

impl<'s> SpectrumCharges<'s> {
    pub fn new(spectra: &'s [Arc<Spectrum>], min_peaks: usize, charge: Option<u8>) -> Self {
        Self {
            spectra,
            min_peaks,
            charge,
            idx: 0,
            pending: Vec::new().into_iter(),
        }
    }
}

impl<'s> Iterator for SpectrumCharges<'s> {
    type Item = (Arc<Spectrum>, ZState);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(z) = self.pending.next() {
                // `idx` has already been advanced past the current spectrum
                let spectrum = &self.spectra[self.idx - 1];
                return Some((spectrum.clone(), z));
            }
            let spectrum = self.spectra.get(self.idx)?;
            self.idx += 1;
            if spectrum.peaks.len() < self.min_peaks {
                log::debug!(
                    "skipping scan {}: {} peaks",
                    spectrum.first_scan,
                    spectrum.peaks.len()
                );
                continue;
            }
            let mut zstates = spectrum.zstates();
            if let Some(charge) = self.charge {
                zstates.retain(|z| z.charge == charge);
            }
            self.pending = zstates.into_iter();
        }
    }
}

/// Select the most intense peak within `tolerance` of `mz`. `peaks` must be
/// sorted by m/z
pub fn select_most_intense_peak(peaks: &[Peak], mz: f32, tolerance: Tolerance) -> Option<&Peak> {
    let (lo, hi) = tolerance.bounds(mz);
    let (i, j) = binary_search_slice(peaks, |peak, query| peak.mz.total_cmp(query), lo, hi);

    let mut best_peak = None;
    let mut max_int = 0.0;
    for peak in peaks[i..j]
        .iter()
        .filter(|peak| peak.mz >= lo && peak.mz <= hi)
    {
        if peak.intensity >= max_int {
            max_int = peak.intensity;
            best_peak = Some(peak);
        }
    }
    best_peak
}

#[cfg(test)]
mod test {
    use super::*;

    fn spectrum(scan: u32, charges: Vec<u8>, npeaks: usize) -> Arc<Spectrum> {
        Arc::new(Spectrum {
            first_scan: scan,
            precursor_mz: 500.0,
            charges,
            peaks: (0..npeaks)
                .map(|i| Peak {
                    mz: 100.0 + i as f32,
                    intensity: 1.0,
                })
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn zstates() {
        let z = ZState::from_mz(500.0, 2);
        assert!((z.neutral_mass - 2.0 * (500.0 - PROTON)).abs() < 1e-4);
        assert!((z.mz() - 500.0).abs() < 1e-4);
        assert!((z.singly_charged_mass() - (z.neutral_mass + PROTON)).abs() < 1e-4);

        let s = spectrum(1, vec![], 10);
        let charges = s.zstates().iter().map(|z| z.charge).collect::<Vec<_>>();
        assert_eq!(charges, vec![2, 3]);
        assert_eq!(s.last_scan(), 1);
    }

    #[test]
    fn spectrum_charges() {
        let spectra = vec![
            spectrum(1, vec![2], 10),
            spectrum(2, vec![], 2),
            spectrum(3, vec![], 10),
            spectrum(4, vec![1, 2, 3], 10),
        ];

        let pairs = SpectrumCharges::new(&spectra, 5, None)
            .map(|(s, z)| (s.first_scan, z.charge))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(1, 2), (3, 2), (3, 3), (4, 1), (4, 2), (4, 3)]);

        let pairs = SpectrumCharges::new(&spectra, 0, Some(3))
            .map(|(s, z)| (s.first_scan, z.charge))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(2, 3), (3, 3), (4, 3)]);

        assert_eq!(SpectrumCharges::new(&[], 0, None).count(), 0);
    }

    #[test]
    fn most_intense() {
        let peaks = vec![
            Peak { mz: 100.0, intensity: 5.0 },
            Peak { mz: 100.2, intensity: 8.0 },
            Peak { mz: 100.4, intensity: 2.0 },
            Peak { mz: 101.0, intensity: 50.0 },
        ];
        let best = select_most_intense_peak(&peaks, 100.2, Tolerance::Da(-0.3, 0.3));
        assert_eq!(best, Some(&peaks[1]));
        assert_eq!(
            select_most_intense_peak(&peaks, 200.0, Tolerance::Da(-0.3, 0.3)),
            None
        );
    }
}

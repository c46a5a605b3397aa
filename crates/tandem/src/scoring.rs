use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::collection::{MatchCollection, Overflow};
use crate::database::PeptideDatabase;
use crate::ion_series::{IonSeries, Kind};
use crate::mass::{Tolerance, H2O, NH3};
use crate::peptide::{Decoy, Peptide};
use crate::psm::{Match, ScoreType};
use crate::spectrum::{select_most_intense_peak, Peak, Spectrum, SpectrumCharges, ZState};
use crate::Error;

/// Width of an XCorr m/z bin
pub const BIN_WIDTH: f32 = 1.0005079;
/// Offset of bin boundaries, so that bins are centered on peptide masses
pub const BIN_OFFSET: f32 = 0.40;
/// Half-width (in bins) of the background subtracted from observed spectra
pub const MAX_XCORR_OFFSET: usize = 75;

const NUM_REGIONS: usize = 10;
const MAX_REGION_INTENSITY: f32 = 50.0;
/// Observed peaks below this fraction of the most intense peak are discarded
const MIN_PEAK_FRACTION: f32 = 0.05;

const PRIMARY_ION: f32 = 50.0;
const FLANKING_ION: f32 = 25.0;
const MINOR_ION: f32 = 10.0;

/// Sp bonus per consecutively matched fragment ion
const SP_CONSECUTIVE_BONUS: f32 = 0.075;
/// Number of most intense peaks considered for Sp
const SP_MAX_PEAKS: usize = 200;

#[inline]
pub fn bin(mz: f32) -> usize {
    let b = mz / BIN_WIDTH + 1.0 - BIN_OFFSET;
    if b <= 0.0 {
        0
    } else {
        b as usize
    }
}

/// Charge states searched for fragment ions, 1..=N
#[inline]
fn max_fragment_charge(precursor_charge: u8) -> u8 {
    precursor_charge.saturating_sub(1).max(1)
}

/// Subtract the mean intensity of the surrounding `max_offset` bins (on
/// each side) from every bin. Bin 0 never contributes to the background
pub fn cross_correlation_offset(bins: &[f32], max_offset: usize) -> Vec<f32> {
    let n = bins.len();
    let denominator = (max_offset * 2) as f32;
    (0..n)
        .map(|idx| {
            let lo = idx.saturating_sub(max_offset).max(1);
            let hi = (idx + max_offset).min(n.saturating_sub(1));
            let background = match lo <= hi {
                true => bins[lo..=hi].iter().sum::<f32>(),
                false => 0.0,
            };
            bins[idx] - background / denominator
        })
        .collect()
}

/// An observed spectrum binned and normalized for cross-correlation
pub struct XCorrSpectrum {
    bins: Vec<f32>,
}

impl XCorrSpectrum {
    /// Bin the spectrum up to 50 m/z beyond the singly charged precursor
    /// mass. Intensities are square-rooted, normalized to 50 within each of
    /// ten regions, and background-subtracted.
    pub fn new(spectrum: &Spectrum, zstate: ZState, remove_precursor: Option<f32>) -> Self {
        let max_mz = zstate.singly_charged_mass() + 50.0;
        let mut bins = vec![0.0f32; bin(max_mz) + 1];

        let precursor_mz = spectrum.precursor_mz;
        let mut max_intensity = 0.0f32;
        let mut max_bin = 0;
        for peak in &spectrum.peaks {
            if peak.mz > max_mz {
                continue;
            }
            if let Some(window) = remove_precursor {
                if (peak.mz - precursor_mz).abs() <= window {
                    continue;
                }
            }
            let b = bin(peak.mz);
            let intensity = peak.intensity.max(0.0).sqrt();
            bins[b] = bins[b].max(intensity);
            max_intensity = max_intensity.max(intensity);
            max_bin = max_bin.max(b);
        }

        let region_size = max_bin / NUM_REGIONS + 1;
        let mut region_max = [0.0f32; NUM_REGIONS + 1];
        for (b, intensity) in bins.iter_mut().enumerate() {
            if *intensity < MIN_PEAK_FRACTION * max_intensity {
                *intensity = 0.0;
            }
            let region = (b / region_size).min(NUM_REGIONS);
            region_max[region] = region_max[region].max(*intensity);
        }
        for (b, intensity) in bins.iter_mut().enumerate() {
            let region = (b / region_size).min(NUM_REGIONS);
            if region_max[region] > 0.0 {
                *intensity = MAX_REGION_INTENSITY * *intensity / region_max[region];
            }
        }

        XCorrSpectrum {
            bins: cross_correlation_offset(&bins, MAX_XCORR_OFFSET),
        }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Cross-correlation against the theoretical spectrum of `peptide`
    pub fn score(&self, peptide: &Peptide, charge: u8) -> f32 {
        let theoretical = theoretical_spectrum(peptide, charge, self.bins.len());
        let dot = theoretical
            .iter()
            .zip(self.bins.iter())
            .filter(|(t, _)| **t > 0.0)
            .map(|(t, o)| t * o)
            .sum::<f32>();
        dot / 10_000.0
    }
}

/// Theoretical b/y spectrum: primary ions at 50 with flanking bins at 25,
/// and neutral losses and a-ions at 10. Each bin keeps its largest value
pub fn theoretical_spectrum(peptide: &Peptide, charge: u8, num_bins: usize) -> Vec<f32> {
    let mut bins = vec![0.0f32; num_bins];
    let mut set = |mz: f32, intensity: f32| {
        let b = bin(mz);
        if b < num_bins {
            bins[b] = bins[b].max(intensity);
        }
    };

    for z in 1..=max_fragment_charge(charge) {
        let zf = z as f32;
        for kind in [Kind::B, Kind::Y] {
            for ion in IonSeries::new(peptide, kind) {
                let mz = ion.mz(z);
                set(mz, PRIMARY_ION);
                set(mz - BIN_WIDTH / zf, FLANKING_ION);
                set(mz + BIN_WIDTH / zf, FLANKING_ION);
                set(mz - NH3 / zf, MINOR_ION);
                if kind == Kind::B {
                    set(mz - H2O / zf, MINOR_ION);
                }
            }
        }
        for ion in IonSeries::new(peptide, Kind::A) {
            set(ion.mz(z), MINOR_ION);
        }
    }
    bins
}

/// Maintain information about continuous ion ladders for a series
#[derive(Default)]
struct Run {
    last: Option<usize>,
    length: usize,
    longest: usize,
    /// Number of matches that extended a ladder
    consecutive: usize,
}

impl Run {
    pub fn matched(&mut self, index: usize) {
        match self.last {
            Some(last) if last == index => return,
            Some(last) if last + 1 == index => {
                self.length += 1;
                self.consecutive += 1;
            }
            _ => self.length = 1,
        }
        self.longest = self.longest.max(self.length);
        self.last = Some(index);
    }
}

/// Result of preliminary scoring
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SpScore {
    pub sp: f32,
    pub matched: u32,
    pub possible: u32,
    pub longest: u32,
}

/// Observed peaks prepared for Sp: square-rooted, the most intense 200
/// kept, scaled to a maximum of 100, sorted by m/z
pub fn sp_peaks(spectrum: &Spectrum) -> Vec<Peak> {
    let mut peaks = spectrum
        .peaks
        .iter()
        .map(|p| Peak {
            mz: p.mz,
            intensity: p.intensity.max(0.0).sqrt(),
        })
        .collect::<Vec<_>>();
    peaks.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
    peaks.truncate(SP_MAX_PEAKS);
    let max = peaks.first().map(|p| p.intensity).unwrap_or_default();
    if max > 0.0 {
        for peak in peaks.iter_mut() {
            peak.intensity *= 100.0 / max;
        }
    }
    peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
    peaks
}

/// Preliminary score: summed intensity of matched b/y ions, weighted by the
/// number of matches and a bonus for consecutive ladders, over the number of
/// possible ions
pub fn score_sp(peaks: &[Peak], peptide: &Peptide, charge: u8, tolerance: Tolerance) -> SpScore {
    let mut matched = 0u32;
    let mut possible = 0u32;
    let mut consecutive = 0usize;
    let mut longest = 0usize;
    let mut summed = 0.0f32;

    for z in 1..=max_fragment_charge(charge) {
        for kind in [Kind::B, Kind::Y] {
            let mut run = Run::default();
            for (idx, ion) in IonSeries::new(peptide, kind).enumerate() {
                possible += 1;
                if let Some(peak) = select_most_intense_peak(peaks, ion.mz(z), tolerance) {
                    matched += 1;
                    summed += peak.intensity;
                    run.matched(idx);
                }
            }
            consecutive += run.consecutive;
            longest = longest.max(run.longest);
        }
    }

    let sp = match possible {
        0 => 0.0,
        _ => {
            summed * matched as f32 * (1.0 + SP_CONSECUTIVE_BONUS * consecutive as f32)
                / possible as f32
        }
    };
    SpScore {
        sp,
        matched,
        possible,
        longest: longest as u32,
    }
}

/// Target and decoy matches for one spectrum under one charge hypothesis
#[derive(Clone, Debug)]
pub struct SpectrumMatches {
    pub spectrum: Arc<Spectrum>,
    pub zstate: ZState,
    pub target: MatchCollection,
    pub decoys: Vec<MatchCollection>,
}

pub struct Scorer<'db> {
    pub db: &'db PeptideDatabase,
    pub precursor_tol: Tolerance,
    pub fragment_tol: Tolerance,
    /// Number of candidates (ranked by Sp) that are scored with XCorr
    pub max_rank_preliminary: usize,
    /// Maximum number of matches held per collection
    pub capacity: usize,
    pub overflow: Overflow,
    /// Number of decoy collections generated per spectrum
    pub num_decoys: usize,
    pub decoy: Decoy,
    pub seed: u64,
    /// Skip spectra with fewer peaks than this
    pub min_peaks: usize,
    /// Only search this precursor charge
    pub charge: Option<u8>,
    /// Remove peaks within this many m/z of the precursor before XCorr
    pub remove_precursor: Option<f32>,
}

impl<'db> Scorer<'db> {
    pub fn new(db: &'db PeptideDatabase) -> Self {
        Scorer {
            db,
            precursor_tol: Tolerance::Da(-3.0, 3.0),
            fragment_tol: Tolerance::Da(-0.5, 0.5),
            max_rank_preliminary: 500,
            capacity: 100_000,
            overflow: Overflow::Fail,
            num_decoys: 1,
            decoy: Decoy::Shuffle,
            seed: 1,
            min_peaks: 20,
            charge: None,
            remove_precursor: None,
        }
    }

    /// Score `peptides` against one spectrum: Sp for all candidates, then
    /// XCorr for the best `max_rank_preliminary` by Sp. The collection is
    /// left ranked by Sp and XCorr, with delta-CN computed, sorted by XCorr
    pub fn score_candidates(
        &self,
        spectrum: &Arc<Spectrum>,
        zstate: ZState,
        peptides: Vec<Arc<Peptide>>,
        decoy: bool,
    ) -> Result<MatchCollection, Error> {
        let mut collection =
            MatchCollection::for_spectrum(zstate, decoy, self.capacity, self.overflow);
        collection.set_experiment_size(peptides.len());

        let peaks = sp_peaks(spectrum);
        for peptide in peptides {
            let sp = score_sp(&peaks, &peptide, zstate.charge, self.fragment_tol);
            let mut m = Match::new(peptide, spectrum.clone(), zstate);
            m.set_score(ScoreType::Sp, sp.sp);
            m.b_y_ion_matched = sp.matched;
            m.b_y_ion_possible = sp.possible;
            if !collection.add(m)? {
                break;
            }
        }

        collection.rank(ScoreType::Sp)?;
        collection.truncate(ScoreType::Sp, self.max_rank_preliminary)?;

        let xcorr = XCorrSpectrum::new(spectrum, zstate, self.remove_precursor);
        collection.score_with(ScoreType::XCorr, |m| xcorr.score(&m.peptide, zstate.charge));
        collection.rank(ScoreType::XCorr)?;
        collection.compute_delta_cn()?;
        Ok(collection)
    }

    /// Search a single spectrum and charge state against target peptides and
    /// `num_decoys` independently generated sets of decoy peptides. Decoy
    /// generation is seeded from the configured seed, scan and charge
    pub fn search(&self, spectrum: &Arc<Spectrum>, zstate: ZState) -> Result<SpectrumMatches, Error> {
        let candidates = self.db.candidates(zstate.neutral_mass, self.precursor_tol);
        log::trace!(
            "scan {} charge {}: {} candidates",
            spectrum.first_scan,
            zstate.charge,
            candidates.len()
        );

        let target = self.score_candidates(spectrum, zstate, candidates.to_vec(), false)?;

        let task_seed = self.seed ^ ((spectrum.first_scan as u64) << 8 | zstate.charge as u64);
        let mut rng = StdRng::seed_from_u64(task_seed);
        let decoys = (0..self.num_decoys)
            .map(|_| {
                let peptides = candidates
                    .iter()
                    .map(|p| Arc::new(p.decoy(self.decoy, &mut rng)))
                    .collect();
                self.score_candidates(spectrum, zstate, peptides, true)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SpectrumMatches {
            spectrum: spectrum.clone(),
            zstate,
            target,
            decoys,
        })
    }

    /// Search every (spectrum, charge) pair in parallel. Results are returned
    /// in file order
    pub fn search_all(&self, spectra: &[Arc<Spectrum>]) -> Result<Vec<SpectrumMatches>, Error> {
        let work = SpectrumCharges::new(spectra, self.min_peaks, self.charge).collect::<Vec<_>>();
        log::info!("searching {} spectrum/charge pairs", work.len());
        work.par_iter()
            .map(|(spectrum, zstate)| self.search(spectrum, *zstate))
            .collect()
    }
}

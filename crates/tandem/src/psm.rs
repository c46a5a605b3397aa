use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::enzyme::Enzyme;
use crate::modification::ModificationSymbols;
use crate::peptide::Peptide;
use crate::spectrum::{Spectrum, ZState};
use crate::Error;

/// Every kind of score a [`Match`] can carry
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Sp,
    XCorr,
    /// -log10 of the Bonferroni-corrected Weibull p-value of XCorr
    LogPBonfWeibullXCorr,
    PercolatorScore,
    PercolatorQValue,
    QRankerScore,
    QRankerQValue,
    DecoyXCorrQValue,
    DecoyPValueQValue,
}

impl ScoreType {
    pub const COUNT: usize = 9;

    pub const ALL: [ScoreType; ScoreType::COUNT] = [
        ScoreType::Sp,
        ScoreType::XCorr,
        ScoreType::LogPBonfWeibullXCorr,
        ScoreType::PercolatorScore,
        ScoreType::PercolatorQValue,
        ScoreType::QRankerScore,
        ScoreType::QRankerQValue,
        ScoreType::DecoyXCorrQValue,
        ScoreType::DecoyPValueQValue,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// q-values are the only scores where lower is better
    pub fn higher_is_better(self) -> bool {
        !matches!(
            self,
            ScoreType::PercolatorQValue
                | ScoreType::QRankerQValue
                | ScoreType::DecoyXCorrQValue
                | ScoreType::DecoyPValueQValue
        )
    }

    /// Score type under which decoy-derived q-values for `self` are stored
    pub fn decoy_qvalue(self) -> Option<ScoreType> {
        match self {
            ScoreType::XCorr => Some(ScoreType::DecoyXCorrQValue),
            ScoreType::LogPBonfWeibullXCorr => Some(ScoreType::DecoyPValueQValue),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScoreType::Sp => "sp score",
            ScoreType::XCorr => "xcorr score",
            ScoreType::LogPBonfWeibullXCorr => "p-value",
            ScoreType::PercolatorScore => "percolator score",
            ScoreType::PercolatorQValue => "percolator q-value",
            ScoreType::QRankerScore => "q-ranker score",
            ScoreType::QRankerQValue => "q-ranker q-value",
            ScoreType::DecoyXCorrQValue => "decoy q-value (xcorr)",
            ScoreType::DecoyPValueQValue => "decoy q-value (p-value)",
        }
    }

    /// Total order over raw scores, better score first. NaN sorts last
    pub fn compare(self, a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if self.higher_is_better() => b.total_cmp(&a),
            (false, false) => a.total_cmp(&b),
        }
    }

    /// Order matches by first scan ascending, then charge ascending, then
    /// better score first
    pub fn compare_spectrum(self, a: &Match, b: &Match) -> Ordering {
        a.spectrum
            .first_scan
            .cmp(&b.spectrum.first_scan)
            .then(a.zstate.charge.cmp(&b.zstate.charge))
            .then_with(|| self.compare(a.score_or_nan(self), b.score_or_nan(self)))
    }

    /// Map a score onto an axis where larger always means better
    pub(crate) fn normalized(self, score: f32) -> f32 {
        match self.higher_is_better() {
            true => score,
            false => -score,
        }
    }
}

impl std::fmt::Display for ScoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed table with one optional slot per [`ScoreType`]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScoreTable<T>([Option<T>; ScoreType::COUNT]);

impl<T: Copy> Default for ScoreTable<T> {
    fn default() -> Self {
        ScoreTable([None; ScoreType::COUNT])
    }
}

impl<T: Copy> ScoreTable<T> {
    pub fn get(&self, ty: ScoreType) -> Option<T> {
        self.0[ty.index()]
    }

    pub fn set(&mut self, ty: ScoreType, value: T) {
        self.0[ty.index()] = Some(value);
    }

    pub fn clear(&mut self, ty: ScoreType) {
        self.0[ty.index()] = None;
    }
}

pub const NUM_FEATURES: usize = 20;

/// Names of the percolator features, in the order they are emitted
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "XCorr", "DeltCN", "DeltLCN", "Sp", "lnrSp", "dM", "absdM", "Mass", "ionFrac", "lnSM", "enzN",
    "enzC", "enzInt", "pepLen", "charge1", "charge2", "charge3", "numMods", "lnrXCorr",
    "logPValue",
];

/// Collection-level context needed to compute features. Built by
/// [`crate::collection::MatchCollection::stats`] at export time
#[derive(Copy, Clone, Debug)]
pub struct CollectionStats<'e> {
    /// Whether every match carries a p-value
    pub has_pvalues: bool,
    pub enzyme: Option<&'e Enzyme>,
}

/// A scored (peptide, spectrum, charge state) association
#[derive(Clone, Debug)]
pub struct Match {
    pub peptide: Arc<Peptide>,
    pub spectrum: Arc<Spectrum>,
    pub zstate: ZState,
    scores: ScoreTable<f32>,
    ranks: ScoreTable<u32>,
    /// Normalized gap to the next best XCorr
    pub delta_cn: f32,
    pub ln_delta_cn: f32,
    /// ln of the number of candidates scored against this spectrum
    pub ln_experiment_size: f32,
    /// Null (decoy) peptide
    pub decoy: bool,
    pub b_y_ion_matched: u32,
    pub b_y_ion_possible: u32,
    /// Best scoring match for this peptide sequence within a merged collection
    pub best_per_peptide: bool,
}

impl Match {
    pub fn new(peptide: Arc<Peptide>, spectrum: Arc<Spectrum>, zstate: ZState) -> Self {
        let decoy = peptide.decoy;
        Match {
            peptide,
            spectrum,
            zstate,
            scores: ScoreTable::default(),
            ranks: ScoreTable::default(),
            delta_cn: 0.0,
            ln_delta_cn: 0.0,
            ln_experiment_size: 0.0,
            decoy,
            b_y_ion_matched: 0,
            b_y_ion_possible: 0,
            best_per_peptide: false,
        }
    }

    pub fn set_score(&mut self, ty: ScoreType, value: f32) {
        self.scores.set(ty, value);
    }

    pub fn score(&self, ty: ScoreType) -> Result<f32, Error> {
        self.scores.get(ty).ok_or(Error::ScoreNotComputed(ty))
    }

    pub fn has_score(&self, ty: ScoreType) -> bool {
        self.scores.get(ty).is_some()
    }

    pub(crate) fn score_or_nan(&self, ty: ScoreType) -> f32 {
        self.scores.get(ty).unwrap_or(f32::NAN)
    }

    pub fn set_rank(&mut self, ty: ScoreType, rank: u32) {
        self.ranks.set(ty, rank);
    }

    pub fn rank(&self, ty: ScoreType) -> Result<u32, Error> {
        self.ranks.get(ty).ok_or(Error::RankNotComputed(ty))
    }

    pub fn has_rank(&self, ty: ScoreType) -> bool {
        self.ranks.get(ty).is_some()
    }

    pub(crate) fn clear_rank(&mut self, ty: ScoreType) {
        self.ranks.clear(ty);
    }

    pub fn label(&self) -> i32 {
        match self.decoy {
            true => -1,
            false => 1,
        }
    }

    pub fn scan(&self) -> u32 {
        self.spectrum.first_scan
    }

    pub fn charge(&self) -> u8 {
        self.zstate.charge
    }

    /// Fraction of theoretical b/y ions that matched an observed peak
    pub fn b_y_ion_fraction(&self) -> f32 {
        match self.b_y_ion_possible {
            0 => 0.0,
            n => self.b_y_ion_matched as f32 / n as f32,
        }
    }

    /// Observed neutral mass minus calculated peptide mass, in Da
    pub fn mass_error(&self) -> f32 {
        self.zstate.neutral_mass - self.peptide.monoisotopic
    }

    /// Unmodified peptide sequence
    pub fn sequence(&self) -> String {
        self.peptide.stripped()
    }

    pub fn sequence_sqt(&self, symbols: &ModificationSymbols) -> String {
        self.peptide.sequence_sqt(symbols)
    }

    pub fn sequence_with_symbols(&self, symbols: &ModificationSymbols) -> String {
        self.peptide.sequence_with_symbols(symbols)
    }

    pub fn sequence_with_masses(&self, merge: bool, precision: usize) -> String {
        self.peptide.sequence_with_masses(merge, precision)
    }

    /// Fixed-order feature vector for percolator-style re-ranking. See
    /// [`FEATURE_NAMES`]. Requires Sp and XCorr scores and ranks
    pub fn percolator_features(
        &self,
        stats: &CollectionStats,
    ) -> Result<[f64; NUM_FEATURES], Error> {
        let xcorr = self.score(ScoreType::XCorr)? as f64;
        let sp = self.score(ScoreType::Sp)? as f64;
        let sp_rank = self.rank(ScoreType::Sp)? as f64;
        let xcorr_rank = self.rank(ScoreType::XCorr)? as f64;
        let log_pvalue = match stats.has_pvalues {
            true => self.score(ScoreType::LogPBonfWeibullXCorr)? as f64,
            false => 0.0,
        };

        let residues = self.peptide.residues();
        let (enz_n, enz_c) = match stats.enzyme {
            Some(enzyme) => enzyme.terminal_cleavages(
                self.peptide.prev_aa,
                &residues,
                self.peptide.next_aa,
            ),
            None => (false, false),
        };
        let enz_int = match stats.enzyme {
            Some(enzyme) => enzyme.internal_cleavages(&residues),
            None => 0,
        };
        let dm = self.mass_error() as f64;
        let charge = self.zstate.charge;

        Ok([
            xcorr,
            self.delta_cn as f64,
            self.ln_delta_cn as f64,
            sp,
            sp_rank.ln(),
            dm,
            dm.abs(),
            self.zstate.neutral_mass as f64,
            self.b_y_ion_fraction() as f64,
            self.ln_experiment_size as f64,
            enz_n as u8 as f64,
            enz_c as u8 as f64,
            enz_int as f64,
            residues.len() as f64,
            (charge == 1) as u8 as f64,
            (charge == 2) as u8 as f64,
            (charge >= 3) as u8 as f64,
            self.peptide.modification_count() as f64,
            xcorr_rank.ln(),
            log_pvalue,
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::Spectrum;

    fn dummy(sequence: &str, scan: u32, charge: u8) -> Match {
        let peptide: Peptide = sequence.parse().unwrap();
        let spectrum = Spectrum {
            first_scan: scan,
            precursor_mz: (peptide.monoisotopic + charge as f32 * crate::mass::PROTON)
                / charge as f32,
            ..Default::default()
        };
        let zstate = ZState::from_mz(spectrum.precursor_mz, charge);
        Match::new(Arc::new(peptide), Arc::new(spectrum), zstate)
    }

    #[test]
    fn unset_scores_and_ranks() {
        let mut m = dummy("PEPTIDEK", 1, 2);
        for ty in ScoreType::ALL {
            assert_eq!(m.score(ty).unwrap_err(), Error::ScoreNotComputed(ty));
            assert_eq!(m.rank(ty).unwrap_err(), Error::RankNotComputed(ty));
        }
        m.set_score(ScoreType::XCorr, 2.5);
        m.set_rank(ScoreType::XCorr, 1);
        assert_eq!(m.score(ScoreType::XCorr), Ok(2.5));
        assert_eq!(m.rank(ScoreType::XCorr), Ok(1));
        assert!(m.score(ScoreType::Sp).is_err());
    }

    #[test]
    fn comparators() {
        use std::cmp::Ordering::*;
        assert_eq!(ScoreType::XCorr.compare(3.0, 1.0), Less);
        assert_eq!(ScoreType::XCorr.compare(1.0, 3.0), Greater);
        assert_eq!(ScoreType::DecoyXCorrQValue.compare(0.01, 0.5), Less);
        assert_eq!(ScoreType::XCorr.compare(f32::NAN, 1.0), Greater);
        assert_eq!(ScoreType::DecoyXCorrQValue.compare(1.0, f32::NAN), Less);
        assert_eq!(ScoreType::Sp.compare(2.0, 2.0), Equal);

        let lower = ScoreType::ALL
            .iter()
            .filter(|ty| !ty.higher_is_better())
            .count();
        assert_eq!(lower, 4);
        assert_eq!(
            ScoreType::XCorr.decoy_qvalue(),
            Some(ScoreType::DecoyXCorrQValue)
        );
        assert_eq!(ScoreType::Sp.decoy_qvalue(), None);

        let mut a = dummy("PEPTIDEK", 2, 2);
        let mut b = dummy("PEPTIDEK", 1, 3);
        let mut c = dummy("PEPTIDEK", 1, 2);
        a.set_score(ScoreType::XCorr, 5.0);
        b.set_score(ScoreType::XCorr, 1.0);
        c.set_score(ScoreType::XCorr, 2.0);
        let mut matches = vec![a, b, c];
        matches.sort_by(|x, y| ScoreType::XCorr.compare_spectrum(x, y));
        let order = matches
            .iter()
            .map(|m| (m.scan(), m.charge()))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![(1, 2), (1, 3), (2, 2)]);
    }

    #[test]
    fn feature_vector() {
        let mut m = dummy("[+42.0106]-LPPGWEK", 10, 2);
        m.set_score(ScoreType::XCorr, 2.0);
        m.set_score(ScoreType::Sp, 100.0);
        m.set_rank(ScoreType::XCorr, 1);
        m.set_rank(ScoreType::Sp, 3);
        m.delta_cn = 0.25;
        m.ln_delta_cn = 0.25f32.ln();
        m.b_y_ion_matched = 6;
        m.b_y_ion_possible = 12;
        m.ln_experiment_size = 100f32.ln();

        let enzyme = Enzyme::trypsin();
        let stats = CollectionStats {
            has_pvalues: false,
            enzyme: Some(&enzyme),
        };
        let features = m.percolator_features(&stats).unwrap();
        assert_eq!(features.len(), FEATURE_NAMES.len());
        assert_eq!(features[0], 2.0);
        assert_eq!(features[1], 0.25);
        assert_eq!(features[3], 100.0);
        assert!((features[4] - 3f64.ln()).abs() < 1e-9);
        assert!(features[6] < 1e-2);
        assert_eq!(features[8], 0.5);
        assert!((features[9] - 100f64.ln()).abs() < 1e-5);
        // flanking residues are protein termini, which always count as sites
        assert_eq!(&features[10..13], &[1.0, 1.0, 0.0]);
        assert_eq!(features[13], 7.0);
        assert_eq!(&features[14..17], &[0.0, 1.0, 0.0]);
        assert_eq!(features[17], 1.0);
        assert_eq!(features[18], 0.0);
        assert_eq!(features[19], 0.0);

        // Repeated extraction is stable
        assert_eq!(features, m.percolator_features(&stats).unwrap());

        let with_p = CollectionStats {
            has_pvalues: true,
            ..stats
        };
        assert_eq!(
            m.percolator_features(&with_p).unwrap_err(),
            Error::ScoreNotComputed(ScoreType::LogPBonfWeibullXCorr)
        );
    }
}

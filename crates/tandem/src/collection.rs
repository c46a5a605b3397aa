use fnv::FnvHashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::enzyme::Enzyme;
use crate::psm::{CollectionStats, Match, ScoreType, NUM_FEATURES};
use crate::spectrum::ZState;
use crate::Error;

/// What to do when a collection is full
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overflow {
    /// Refuse the match with [`Error::CapacityExceeded`]
    #[default]
    Fail,
    /// Drop the match, logging a warning the first time
    Truncate,
}

/// One row of percolator input
#[derive(Clone, Debug, PartialEq)]
pub struct PinRecord {
    pub scan: u32,
    pub charge: u8,
    /// +1 for targets, -1 for decoys
    pub label: i32,
    pub features: [f64; NUM_FEATURES],
}

/// Uniformly permute `slice[start..end]` in place. Elements outside of the
/// range never move
pub fn shuffle_range<T, R: Rng + ?Sized>(
    slice: &mut [T],
    start: usize,
    end: usize,
    rng: &mut R,
) -> Result<(), Error> {
    if start > end || end > slice.len() {
        return Err(Error::InvalidRange {
            start,
            end,
            len: slice.len(),
        });
    }
    slice[start..end].shuffle(rng);
    Ok(())
}

/// Owns every [`Match`] for one (spectrum, charge) pair, or for many spectra
/// once merged.
///
/// At most one sort order is current. Ranks stay attached to their matches
/// after a re-sort, but positional queries ([`MatchCollection::match_at_rank`],
/// [`MatchCollection::top`]) are only answered for the current sort order
#[derive(Clone, Debug)]
pub struct MatchCollection {
    matches: Vec<Match>,
    capacity: usize,
    overflow: Overflow,
    warned: bool,
    sorted_by: Option<ScoreType>,
    decoy: bool,
    experiment_size: usize,
    zstate: Option<ZState>,
    merged: bool,
}

impl MatchCollection {
    pub fn new(capacity: usize, overflow: Overflow) -> Self {
        MatchCollection {
            matches: Vec::with_capacity(capacity.min(1024)),
            capacity,
            overflow,
            warned: false,
            sorted_by: None,
            decoy: false,
            experiment_size: 0,
            zstate: None,
            merged: false,
        }
    }

    /// Empty collection for a single spectrum under a charge hypothesis
    pub fn for_spectrum(zstate: ZState, decoy: bool, capacity: usize, overflow: Overflow) -> Self {
        MatchCollection {
            decoy,
            zstate: Some(zstate),
            ..Self::new(capacity, overflow)
        }
    }

    /// Combine the matches of many collections into one multi-spectrum
    /// collection. Experiment sizes are summed; each match keeps the
    /// ln(experiment size) of the spectrum it came from
    pub fn merge<'a, I>(collections: I, capacity: usize, overflow: Overflow) -> Result<Self, Error>
    where
        I: IntoIterator<Item = &'a MatchCollection>,
    {
        let mut merged = MatchCollection::new(capacity, overflow);
        merged.merged = true;
        let mut all_decoy = true;
        let mut any = false;
        for collection in collections {
            any = true;
            all_decoy &= collection.decoy;
            merged.experiment_size += collection.experiment_size;
            for m in &collection.matches {
                if !merged.add(m.clone())? {
                    break;
                }
            }
        }
        merged.decoy = any && all_decoy;
        Ok(merged)
    }

    /// Admit a match. Returns `Ok(false)` if the match was dropped because
    /// the collection is full and truncation is enabled
    pub fn add(&mut self, m: Match) -> Result<bool, Error> {
        if self.matches.len() >= self.capacity {
            return match self.overflow {
                Overflow::Fail => Err(Error::CapacityExceeded {
                    capacity: self.capacity,
                }),
                Overflow::Truncate => {
                    if !self.warned {
                        log::warn!(
                            "match collection is full ({} matches), further matches are dropped",
                            self.capacity
                        );
                        self.warned = true;
                    }
                    Ok(false)
                }
            };
        }
        self.matches.push(m);
        self.sorted_by = None;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.matches.iter()
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn get(&self, index: usize) -> Option<&Match> {
        self.matches.get(index)
    }

    pub fn is_decoy(&self) -> bool {
        self.decoy
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    pub fn zstate(&self) -> Option<ZState> {
        self.zstate
    }

    pub fn sorted_by(&self) -> Option<ScoreType> {
        self.sorted_by
    }

    pub fn experiment_size(&self) -> usize {
        self.experiment_size
    }

    pub fn set_experiment_size(&mut self, size: usize) {
        self.experiment_size = size;
    }

    /// Compute a score of type `ty` for every match. Existing ranks for `ty`
    /// are dropped
    pub fn score_with<F: FnMut(&Match) -> f32>(&mut self, ty: ScoreType, mut f: F) {
        self.score_with_index(ty, |_, m| f(m));
    }

    /// Set externally computed scores (e.g. from a re-ranking classifier),
    /// one per match in the current order
    pub fn assign_scores(&mut self, ty: ScoreType, scores: &[f32]) -> Result<(), Error> {
        if scores.len() != self.matches.len() {
            return Err(Error::LengthMismatch {
                expected: self.matches.len(),
                found: scores.len(),
            });
        }
        self.score_with_index(ty, |idx, _| scores[idx]);
        Ok(())
    }

    fn score_with_index<F: FnMut(usize, &Match) -> f32>(&mut self, ty: ScoreType, mut f: F) {
        for (idx, m) in self.matches.iter_mut().enumerate() {
            let score = f(idx, m);
            m.set_score(ty, score);
            m.clear_rank(ty);
        }
        if self.sorted_by == Some(ty) {
            self.sorted_by = None;
        }
    }

    fn ensure_scored(&self, ty: ScoreType) -> Result<(), Error> {
        match self.matches.iter().all(|m| m.has_score(ty)) {
            true => Ok(()),
            false => Err(Error::ScoreNotComputed(ty)),
        }
    }

    fn ensure_sorted(&self, ty: ScoreType) -> Result<(), Error> {
        if self.matches.is_empty() || self.sorted_by == Some(ty) {
            Ok(())
        } else {
            Err(Error::NotSorted { requested: ty })
        }
    }

    /// Stable sort, better score first
    pub fn sort(&mut self, ty: ScoreType) -> Result<(), Error> {
        self.ensure_scored(ty)?;
        if self.sorted_by != Some(ty) {
            self.matches
                .sort_by(|a, b| ty.compare(a.score_or_nan(ty), b.score_or_nan(ty)));
            self.sorted_by = Some(ty);
        }
        Ok(())
    }

    /// Stable sort by scan, then charge, then score. This is not a rank
    /// order, so positional queries fail afterwards until [`Self::sort`]
    pub fn sort_by_spectrum(&mut self, ty: ScoreType) -> Result<(), Error> {
        self.ensure_scored(ty)?;
        self.matches.sort_by(|a, b| ty.compare_spectrum(a, b));
        self.sorted_by = None;
        Ok(())
    }

    /// Sort by `ty` and assign dense ranks 1..=N in sorted order. Ties
    /// receive distinct ranks in stable order
    pub fn rank(&mut self, ty: ScoreType) -> Result<(), Error> {
        self.sort(ty)?;
        for (idx, m) in self.matches.iter_mut().enumerate() {
            m.set_rank(ty, idx as u32 + 1);
        }
        Ok(())
    }

    /// Sort and rank by `ty` independently within each spectrum and charge
    /// state. Used for merged collections, leaving them in spectrum order
    pub fn rank_per_spectrum(&mut self, ty: ScoreType) -> Result<(), Error> {
        self.sort_by_spectrum(ty)?;
        let mut rank = 0;
        let mut last = None;
        for m in self.matches.iter_mut() {
            let key = (m.spectrum.first_scan, m.zstate.charge);
            if last != Some(key) {
                rank = 0;
                last = Some(key);
            }
            rank += 1;
            m.set_rank(ty, rank);
        }
        Ok(())
    }

    /// Match holding `rank` for `ty`. The collection must currently be sorted
    /// by `ty`
    pub fn match_at_rank(&self, ty: ScoreType, rank: u32) -> Result<Option<&Match>, Error> {
        self.ensure_sorted(ty)?;
        match rank.checked_sub(1).and_then(|idx| self.matches.get(idx as usize)) {
            Some(m) if m.rank(ty)? == rank => Ok(Some(m)),
            _ => Ok(None),
        }
    }

    /// Matches ranked at most `n` for `ty`, best first. Matches beyond the
    /// cutoff stay in the collection
    pub fn top(&self, ty: ScoreType, n: usize) -> Result<impl Iterator<Item = &Match>, Error> {
        self.ensure_sorted(ty)?;
        self.matches.iter().try_for_each(|m| m.rank(ty).map(drop))?;
        Ok(self
            .matches
            .iter()
            .take_while(move |m| m.rank(ty).map(|r| r as usize <= n).unwrap_or(false)))
    }

    /// Keep only the `n` best matches for `ty`
    pub fn truncate(&mut self, ty: ScoreType, n: usize) -> Result<(), Error> {
        self.ensure_sorted(ty)?;
        self.matches.truncate(n);
        Ok(())
    }

    /// Shuffle `matches[start..end]`, invalidating the current sort order
    pub fn shuffle<R: Rng + ?Sized>(
        &mut self,
        start: usize,
        end: usize,
        rng: &mut R,
    ) -> Result<(), Error> {
        shuffle_range(&mut self.matches, start, end, rng)?;
        if start + 1 < end {
            self.sorted_by = None;
        }
        Ok(())
    }

    /// Compute delta-CN for every match: the gap between its XCorr and the
    /// next best, relative to its own XCorr. Also stores ln(delta-CN) and
    /// ln(experiment size). Leaves the collection sorted by XCorr
    pub fn compute_delta_cn(&mut self) -> Result<(), Error> {
        self.sort(ScoreType::XCorr)?;
        let ln_size = match self.experiment_size {
            0 => 0.0,
            n => (n as f32).ln(),
        };
        let xcorrs = self
            .matches
            .iter()
            .map(|m| m.score(ScoreType::XCorr))
            .collect::<Result<Vec<_>, _>>()?;
        for (idx, m) in self.matches.iter_mut().enumerate() {
            let current = xcorrs[idx];
            let next = xcorrs.get(idx + 1).copied().unwrap_or(current);
            m.delta_cn = match current > 0.0 {
                true => (current - next) / current,
                false => 0.0,
            };
            m.ln_delta_cn = match m.delta_cn > 0.0 {
                true => m.delta_cn.ln(),
                false => 0.0,
            };
            m.ln_experiment_size = ln_size;
        }
        Ok(())
    }

    /// Collection-wide statistics used to normalize features, computed now
    pub fn stats<'e>(&self, enzyme: Option<&'e Enzyme>) -> CollectionStats<'e> {
        CollectionStats {
            has_pvalues: !self.matches.is_empty()
                && self
                    .matches
                    .iter()
                    .all(|m| m.has_score(ScoreType::LogPBonfWeibullXCorr)),
            enzyme,
        }
    }

    /// Feature vectors for every match, in the current order
    pub fn percolator_features(&self, enzyme: Option<&Enzyme>) -> Result<Vec<PinRecord>, Error> {
        let stats = self.stats(enzyme);
        self.matches
            .iter()
            .map(|m| {
                Ok(PinRecord {
                    scan: m.scan(),
                    charge: m.charge(),
                    label: m.label(),
                    features: m.percolator_features(&stats)?,
                })
            })
            .collect()
    }

    /// Flag the best match (by `ty`) of each peptide sequence. Modified
    /// forms of a sequence compete with each other
    pub fn mark_best_per_peptide(&mut self, ty: ScoreType) -> Result<(), Error> {
        self.ensure_scored(ty)?;
        let mut best: FnvHashMap<String, usize> = FnvHashMap::default();
        for (idx, m) in self.matches.iter().enumerate() {
            let key = m.sequence();
            let score = m.score(ty)?;
            match best.get(&key) {
                Some(&prev) if ty.compare(self.matches[prev].score(ty)?, score).is_le() => {}
                _ => {
                    best.insert(key, idx);
                }
            }
        }
        for m in self.matches.iter_mut() {
            m.best_per_peptide = false;
        }
        for idx in best.into_values() {
            self.matches[idx].best_per_peptide = true;
        }
        Ok(())
    }

    /// Drop ranks for `ty`, e.g. after scores have been replaced
    pub fn clear_ranks(&mut self, ty: ScoreType) {
        for m in self.matches.iter_mut() {
            m.clear_rank(ty);
        }
    }
}

/// Estimate q-values for `target` from the score distribution of `decoys`.
///
/// For the target at rank r, FDR is the number of decoy scores at least as
/// good as the r-th target score (divided by the number of decoy
/// collections), over the number of targets at least as good, clipped to 1.
/// q-values are the running minimum of the FDR from the worst rank toward the
/// best, stored under [`ScoreType::decoy_qvalue`] and ranked.
///
/// Leaves `target` sorted by `ty`. Returns the number of targets passing 1% FDR
pub fn assign_decoy_qvalues(
    target: &mut MatchCollection,
    decoys: &[&MatchCollection],
    expected: usize,
    ty: ScoreType,
) -> Result<usize, Error> {
    if decoys.len() != expected {
        return Err(Error::DecoyCountMismatch {
            expected,
            found: decoys.len(),
        });
    }
    if decoys.is_empty() {
        return Err(Error::MissingDecoys);
    }
    let qty = ty.decoy_qvalue().ok_or(Error::UnsupportedScore(ty))?;

    target.sort(ty)?;

    let mut decoy_scores = Vec::new();
    for decoy in decoys {
        for m in decoy.iter() {
            decoy_scores.push(ty.normalized(m.score(ty)?));
        }
    }
    decoy_scores.sort_by(|a, b| a.total_cmp(b));

    let target_scores = target
        .iter()
        .map(|m| m.score(ty).map(|s| ty.normalized(s)))
        .collect::<Result<Vec<_>, _>>()?;
    let mut ascending = target_scores.clone();
    ascending.sort_by(|a, b| a.total_cmp(b));

    let at_least = |sorted: &[f32], score: f32| sorted.len() - sorted.partition_point(|&s| s < score);

    let n_decoy_sets = decoys.len() as f32;
    let mut qvalues = target_scores
        .iter()
        .map(|&score| {
            let d = at_least(&decoy_scores, score) as f32 / n_decoy_sets;
            let t = at_least(&ascending, score).max(1) as f32;
            (d / t).clamp(0.0, 1.0)
        })
        .collect::<Vec<_>>();

    // Running minimum from the worst rank toward the best
    let mut q_min = 1.0f32;
    for q in qvalues.iter_mut().rev() {
        q_min = q_min.min(*q);
        *q = q_min;
    }

    target.assign_scores(qty, &qvalues)?;
    // q-values are monotone in the current order, so this stable sort
    // preserves it
    target.rank(qty)?;
    target.sort(ty)?;

    Ok(qvalues.iter().filter(|&&q| q <= 0.01).count())
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use fnv::FnvHashSet;
use log::info;
use rayon::prelude::*;
use tandem_core::collection::{assign_decoy_qvalues, MatchCollection, Overflow};
use tandem_core::database::{PeptideDatabase, PeptideEntry};
use tandem_core::enzyme::Enzyme;
use tandem_core::hit::HitCollection;
use tandem_core::modification::ModificationSymbols;
use tandem_core::psm::{Match, ScoreType};
use tandem_core::scoring::{Scorer, SpectrumMatches};
use tandem_core::spectrum::{Spectrum, ZState};

use crate::input::{read_json, Search};
use crate::output::{Command, OutputFiles};

pub struct Runner {
    database: PeptideDatabase,
    spectra: Vec<Arc<Spectrum>>,
    enzyme: Option<Enzyme>,
    symbols: ModificationSymbols,
    num_proteins: usize,
    parameters: Search,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();
        let enzyme = parameters.enzyme.build();

        let entries: Vec<PeptideEntry> = read_json(&parameters.peptides)?;
        let database =
            PeptideDatabase::from_entries(entries, &parameters.residue_mods(), enzyme.as_ref())
                .with_context(|| {
                    format!("Failed to read peptides from `{}`", parameters.peptides)
                })?;

        let num_proteins = database
            .iter()
            .flat_map(|peptide| peptide.proteins.iter())
            .collect::<FnvHashSet<_>>()
            .len();
        info!(
            "loaded {} peptides from {} proteins in {:#?}",
            database.len(),
            num_proteins,
            start.elapsed()
        );

        // Symbols are assigned in database order, so output is identical
        // across runs over the same peptides
        let mut symbols = ModificationSymbols::default();
        database.observe_modifications(&mut symbols);
        for (symbol, mass) in symbols.iter() {
            log::debug!("modification {:+.4} is annotated as `{}`", mass, symbol);
        }

        let spectra = parameters
            .spectra_paths
            .par_iter()
            .map(|path| {
                let spectra: Vec<Spectrum> = read_json(path)?;
                log::trace!("read {} spectra from `{}`", spectra.len(), path);
                Ok(spectra)
            })
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .map(|mut spectrum| {
                spectrum.sort_peaks();
                Arc::new(spectrum)
            })
            .collect::<Vec<_>>();
        info!(
            "loaded {} spectra from {} file(s)",
            spectra.len(),
            parameters.spectra_paths.len()
        );

        Ok(Self {
            database,
            spectra,
            enzyme,
            symbols,
            num_proteins,
            parameters,
            start,
        })
    }

    fn scorer(&self) -> Scorer<'_> {
        let mut scorer = Scorer::new(&self.database);
        scorer.precursor_tol = self.parameters.precursor_tol;
        scorer.fragment_tol = self.parameters.fragment_tol;
        scorer.max_rank_preliminary = self.parameters.max_rank_preliminary;
        scorer.capacity = self.parameters.capacity;
        scorer.overflow = self.parameters.overflow;
        scorer.num_decoys = self.parameters.num_decoy_files;
        scorer.decoy = self.parameters.decoy;
        scorer.seed = self.parameters.seed;
        scorer.min_peaks = self.parameters.min_peaks;
        scorer.charge = self.parameters.charge;
        scorer.remove_precursor = self.parameters.remove_precursor;
        scorer
    }

    // Create a path for `file_name` in the output directory
    fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    /// Write the best `top_match` matches of every spectrum, targets and
    /// each decoy set to separate files
    fn write_search(&self, results: &[SpectrumMatches]) -> anyhow::Result<Vec<String>> {
        let mut files = OutputFiles::open(&self.parameters, Command::Search, &self.symbols);
        files.write_headers(&self.parameters, self.num_proteins)?;
        for result in results {
            files.write_matches(&result.target, &result.decoys, ScoreType::XCorr)?;
        }
        files.finish()
    }

    /// Merge the best target match of every spectrum into one collection and
    /// estimate its q-values from the best match of every decoy set.
    /// Returns the merged targets (sorted by XCorr) and merged decoys
    fn assign_confidence(
        &self,
        results: &[SpectrumMatches],
    ) -> anyhow::Result<(MatchCollection, MatchCollection)> {
        let num_decoys = self.parameters.num_decoy_files;
        let capacity = results.len().max(1);

        let best = |collection: &MatchCollection, zstate: ZState| {
            let mut top =
                MatchCollection::for_spectrum(zstate, collection.is_decoy(), 1, Overflow::Fail);
            top.set_experiment_size(collection.experiment_size());
            for m in collection.top(ScoreType::XCorr, 1)? {
                top.add(m.clone())?;
            }
            Ok::<_, tandem_core::Error>(top)
        };

        let targets = results
            .iter()
            .map(|r| best(&r.target, r.zstate))
            .collect::<Result<Vec<_>, _>>()?;
        let mut merged = MatchCollection::merge(targets.iter(), capacity, Overflow::Fail)?;

        let decoys = (0..num_decoys)
            .map(|idx| {
                let tops = results
                    .iter()
                    .map(|r| match r.decoys.get(idx) {
                        Some(decoy) => best(decoy, r.zstate),
                        None => Err(tandem_core::Error::DecoyCountMismatch {
                            expected: num_decoys,
                            found: r.decoys.len(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                MatchCollection::merge(tops.iter(), capacity, Overflow::Fail)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if num_decoys > 0 {
            let refs = decoys.iter().collect::<Vec<_>>();
            let passing = assign_decoy_qvalues(&mut merged, &refs, num_decoys, ScoreType::XCorr)?;
            info!(
                "discovered {} target peptide-spectrum matches at 1% FDR",
                passing
            );
        } else {
            merged.sort(ScoreType::XCorr)?;
        }
        merged.mark_best_per_peptide(ScoreType::XCorr)?;

        let mut all_decoys =
            MatchCollection::merge(decoys.iter(), capacity * num_decoys.max(1), Overflow::Fail)?;
        all_decoys.sort(ScoreType::XCorr)?;
        Ok((merged, all_decoys))
    }

    fn write_confidence(
        &self,
        merged: &MatchCollection,
        decoys: &MatchCollection,
    ) -> anyhow::Result<Vec<String>> {
        let mut files =
            OutputFiles::open(&self.parameters, Command::AssignConfidence, &self.symbols);
        files.write_headers(&self.parameters, self.num_proteins)?;
        let decoys = (files.num_files() > 1).then_some(decoys);
        files.write_merged(merged, decoys)?;

        if self.parameters.write_features {
            let mut records = merged.percolator_features(self.enzyme.as_ref())?;
            if let Some(decoys) = decoys {
                records.extend(decoys.percolator_features(self.enzyme.as_ref())?);
            }
            files.write_features(&records)?;
        }
        files.finish()
    }

    /// Matches that pass 1% FDR, or every match if q-values were not estimated
    fn confident<'a>(&self, merged: &'a MatchCollection) -> Vec<&'a Match> {
        merged
            .iter()
            .filter(|m| match m.score(ScoreType::DecoyXCorrQValue) {
                Ok(q) => q <= 0.01,
                Err(_) => self.parameters.num_decoy_files == 0,
            })
            .collect()
    }

    fn write_proteins(&self, hits: &HitCollection) -> anyhow::Result<Vec<String>> {
        let mut files = OutputFiles::open(&self.parameters, Command::Proteins, &self.symbols);
        files.write_headers(&self.parameters, self.num_proteins)?;
        files.write_ranked_proteins(hits)?;
        files.finish()
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let results = self.scorer().search_all(&self.spectra)?;
        info!(
            "scored {} spectrum/charge pairs in {:#?}",
            results.len(),
            self.start.elapsed()
        );

        log::trace!("writing search results");
        let paths = self.write_search(&results)?;
        self.parameters.output_paths.extend(paths);

        let (merged, decoys) = self.assign_confidence(&results)?;
        let paths = self.write_confidence(&merged, &decoys)?;
        self.parameters.output_paths.extend(paths);

        let confident = self.confident(&merged);
        let predictor = self.parameters.retention_model.build();
        info!(
            "largest predicted retention difference across {} confident matches: {:.2}",
            confident.len(),
            predictor.max_difference(&confident)
        );

        let protein_scorer = self.parameters.protein_scoring.build();
        let hits = HitCollection::from_matches(
            &merged,
            ScoreType::XCorr,
            protein_scorer.as_ref(),
            self.num_proteins,
        )?;
        info!("assembled {} protein hits", hits.len());
        let paths = self.write_proteins(&hits)?;
        self.parameters.output_paths.extend(paths);

        let path = self.make_path(match &self.parameters.fileroot {
            Some(root) => format!("{}.results.json", root),
            None => "results.json".into(),
        });
        if path.exists() && !self.parameters.overwrite {
            log::error!(
                "`{}` already exists, set `overwrite` to replace it",
                path.display()
            );
        } else {
            self.parameters.output_paths.push(path.display().to_string());
            let bytes = serde_json::to_vec_pretty(&self.parameters)?;
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write `{}`", path.display()))?;
        }
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let run_time = (Instant::now() - self.start).as_secs();
        info!("finished in {}s", run_time);
        Ok(self.parameters)
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use clap::ArgMatches;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tandem_core::{
    collection::Overflow,
    enzyme::EnzymeParameters,
    hit::ProteinScoring,
    mass::Tolerance,
    modification::validate_mods,
    peptide::Decoy,
    retention::RetentionModel,
};

pub fn read_json<S: AsRef<Path>, T: DeserializeOwned>(path: S) -> anyhow::Result<T> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open `{}`", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse `{}`", path.display()))
}

#[derive(Serialize, Clone, Debug)]
/// Actual search parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub peptides: String,
    pub spectra_paths: Vec<String>,
    pub enzyme: EnzymeParameters,
    pub static_mods: Vec<(char, f32)>,
    pub precursor_tol: Tolerance,
    pub fragment_tol: Tolerance,
    pub max_rank_preliminary: usize,
    pub top_match: usize,
    pub num_decoy_files: usize,
    pub decoy: Decoy,
    pub seed: u64,
    pub capacity: usize,
    pub overflow: Overflow,
    pub min_peaks: usize,
    pub charge: Option<u8>,
    pub remove_precursor: Option<f32>,
    pub mass_precision: usize,
    pub protein_scoring: ProteinScoring,
    pub retention_model: RetentionModel,
    pub fileroot: Option<String>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
    #[serde(skip_serializing)]
    pub overwrite: bool,
    #[serde(skip_serializing)]
    pub write_sqt: bool,
    #[serde(skip_serializing)]
    pub write_pepxml: bool,
    #[serde(skip_serializing)]
    pub write_features: bool,
}

impl Search {
    /// Static modifications in the form expected by the peptide database
    pub fn residue_mods(&self) -> Vec<(u8, f32)> {
        self.static_mods
            .iter()
            .map(|(residue, mass)| (*residue as u8, *mass))
            .collect()
    }
}

#[derive(Deserialize, Default)]
/// Input search parameters deserialized from JSON file
pub struct Input {
    peptides: Option<String>,
    spectra_paths: Option<Vec<String>>,
    enzyme: Option<EnzymeParameters>,
    static_mods: Option<HashMap<String, f32>>,
    precursor_tol: Option<Tolerance>,
    fragment_tol: Option<Tolerance>,
    max_rank_preliminary: Option<usize>,
    top_match: Option<usize>,
    num_decoy_files: Option<usize>,
    decoy: Option<Decoy>,
    seed: Option<u64>,
    capacity: Option<usize>,
    overflow: Option<Overflow>,
    min_peaks: Option<usize>,
    charge: Option<u8>,
    remove_precursor: Option<f32>,
    mass_precision: Option<usize>,
    protein_scoring: Option<ProteinScoring>,
    retention_model: Option<RetentionModel>,
    output_directory: Option<String>,
    fileroot: Option<String>,
    overwrite: Option<bool>,

    write_sqt: Option<bool>,
    write_pepxml: Option<bool>,
    write_features: Option<bool>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let mut input = match matches.get_one::<String>("parameters") {
            Some(path) => Input::load(path)
                .with_context(|| format!("Failed to read parameters from `{path}`"))?,
            None => Input::default(),
        };

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(peptides) = matches.get_one::<String>("peptides") {
            log::trace!("overriding `peptides` parameter.");
            input.peptides = Some(peptides.into());
        }
        if let Some(spectra_paths) = matches.get_many::<String>("spectra_paths") {
            log::trace!("overriding `spectra_paths` parameter.");
            input.spectra_paths = Some(spectra_paths.into_iter().map(|p| p.into()).collect());
        }
        if let Some(fileroot) = matches.get_one::<String>("fileroot") {
            log::trace!("overriding `fileroot` parameter.");
            input.fileroot = Some(fileroot.into());
        }
        if let Some(num_decoy_files) = matches.get_one::<usize>("num-decoy-files").copied() {
            log::trace!("overriding `num_decoy_files` parameter.");
            input.num_decoy_files = Some(num_decoy_files);
        }
        if let Some(seed) = matches.get_one::<u64>("seed").copied() {
            log::trace!("overriding `seed` parameter.");
            input.seed = Some(seed);
        }

        // Flags only ever switch an option on
        for (flag, field) in [
            ("overwrite", &mut input.overwrite),
            ("write-sqt", &mut input.write_sqt),
            ("write-pepxml", &mut input.write_pepxml),
            ("write-features", &mut input.write_features),
        ] {
            if matches.get_flag(flag) {
                *field = Some(true);
            }
        }

        ensure!(
            input.peptides.is_some(),
            "`peptides` must be set. For more information try '--help'"
        );
        ensure!(
            input.spectra_paths.as_ref().map_or(false, |p| !p.is_empty()),
            "`spectra_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<Path>>(path: S) -> anyhow::Result<Self> {
        read_json(path)
    }

    fn check_tolerances(tolerance: &Tolerance) {
        let (lo, hi) = match tolerance {
            Tolerance::Ppm(lo, hi) | Tolerance::Da(lo, hi) => (lo, hi),
        };
        if lo > hi {
            log::warn!("Tolerance lower bound exceeds upper bound: [{} - {}]", lo, hi);
        } else if hi.abs() > lo.abs() {
            log::warn!(
                "Tolerances are applied to experimental masses, not theoretical: [{} - {}]",
                lo,
                hi
            );
        }
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let precursor_tol = self.precursor_tol.unwrap_or(Tolerance::Da(-3.0, 3.0));
        let fragment_tol = self.fragment_tol.unwrap_or(Tolerance::Da(-0.5, 0.5));
        Self::check_tolerances(&fragment_tol);
        Self::check_tolerances(&precursor_tol);

        let enzyme = self.enzyme.unwrap_or_default();
        if enzyme.build().is_none() {
            log::warn!("No enzyme specified: enzymatic features will be reported as zero");
        }

        let static_mods = validate_mods(self.static_mods)
            .into_iter()
            .map(|(residue, mass)| (residue as char, mass))
            .collect();

        let top_match = self.top_match.unwrap_or(5);
        ensure!(top_match > 0, "`top_match` must be at least 1");
        let max_rank_preliminary = self.max_rank_preliminary.unwrap_or(500);
        if max_rank_preliminary < top_match {
            log::warn!(
                "`max_rank_preliminary` ({}) is smaller than `top_match` ({}): fewer matches will be reported",
                max_rank_preliminary,
                top_match
            );
        }

        let num_decoy_files = self.num_decoy_files.unwrap_or(1);
        if num_decoy_files == 0 {
            log::warn!("`num_decoy_files` is 0: q-values will not be estimated");
        }

        let capacity = self.capacity.unwrap_or(100_000);
        ensure!(capacity > 0, "`capacity` must be at least 1");

        let peptides = self.peptides.context("'peptides' must be provided!")?;
        let spectra_paths = self
            .spectra_paths
            .context("'spectra_paths' must be provided!")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            peptides,
            spectra_paths,
            enzyme,
            static_mods,
            precursor_tol,
            fragment_tol,
            max_rank_preliminary,
            top_match,
            num_decoy_files,
            decoy: self.decoy.unwrap_or_default(),
            seed: self.seed.unwrap_or(1),
            capacity,
            overflow: self.overflow.unwrap_or_default(),
            min_peaks: self.min_peaks.unwrap_or(20),
            charge: self.charge,
            remove_precursor: self.remove_precursor,
            mass_precision: self.mass_precision.unwrap_or(4),
            protein_scoring: self.protein_scoring.unwrap_or_default(),
            retention_model: self.retention_model.unwrap_or_default(),
            fileroot: self.fileroot,
            output_paths: Vec::new(),
            output_directory,
            overwrite: self.overwrite.unwrap_or(false),
            write_sqt: self.write_sqt.unwrap_or(false),
            write_pepxml: self.write_pepxml.unwrap_or(false),
            write_features: self.write_features.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let input: Input = serde_json::from_str(
            r#"{
                "peptides": "peptides.json",
                "spectra_paths": ["a.json"],
                "static_mods": {"C": 57.0215, "^": 42.0106, "CC": 1.0},
                "precursor_tol": {"ppm": [-10.0, 10.0]}
            }"#,
        )?;
        let search = input.build()?;
        assert_eq!(search.precursor_tol, Tolerance::Ppm(-10.0, 10.0));
        assert_eq!(search.fragment_tol, Tolerance::Da(-0.5, 0.5));
        assert_eq!(search.static_mods, vec![('C', 57.0215), ('^', 42.0106)]);
        assert_eq!(search.residue_mods(), vec![(b'C', 57.0215), (b'^', 42.0106)]);
        assert_eq!(search.num_decoy_files, 1);
        assert_eq!(search.top_match, 5);
        assert_eq!(search.overflow, Overflow::Fail);
        assert_eq!(search.decoy, Decoy::Shuffle);
        assert!(!search.overwrite);
        Ok(())
    }

    #[test]
    fn missing_inputs() {
        let input: Input = serde_json::from_str(r#"{"spectra_paths": ["a.json"]}"#).unwrap();
        assert!(input.build().is_err());

        let input: Input =
            serde_json::from_str(r#"{"peptides": "p.json", "spectra_paths": [], "top_match": 0}"#)
                .unwrap();
        assert!(input.build().is_err());
    }
}

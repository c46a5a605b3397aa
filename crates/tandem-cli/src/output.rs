use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tandem_core::collection::{MatchCollection, PinRecord};
use tandem_core::hit::HitCollection;
use tandem_core::mass::{Tolerance, PROTON};
use tandem_core::modification::ModificationSymbols;
use tandem_core::psm::{Match, ScoreType, FEATURE_NAMES};

use crate::input::Search;

/// The step of a run that a set of output files belongs to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Per-spectrum matches against targets and each decoy set
    Search,
    /// Best match per spectrum, merged across spectra, with q-values
    AssignConfidence,
    /// Protein hits ranked by score
    Proteins,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Search => "search",
            Command::AssignConfidence => "assign-confidence",
            Command::Proteins => "proteins",
        }
    }

    /// One target file plus one file per decoy set
    fn num_files(self, num_decoy_files: usize) -> usize {
        match self {
            Command::Search => 1 + num_decoy_files,
            Command::AssignConfidence => 1 + num_decoy_files.min(1),
            Command::Proteins => 1,
        }
    }
}

/// `[fileroot.]command.[tag.]extension`
pub fn file_name(
    fileroot: Option<&str>,
    command: Command,
    tag: Option<&str>,
    extension: &str,
) -> String {
    let mut name = String::new();
    if let Some(root) = fileroot.filter(|r| !r.is_empty()) {
        name.push_str(root);
        name.push('.');
    }
    name.push_str(command.name());
    name.push('.');
    if let Some(tag) = tag.filter(|t| !t.is_empty()) {
        name.push_str(tag);
        name.push('.');
    }
    name.push_str(extension);
    name
}

/// File tags for one target file followed by `num_files - 1` decoy files.
/// A single decoy file is just `decoy`, otherwise they are numbered from 1
pub fn target_decoy_tags(num_files: usize) -> Vec<String> {
    (0..num_files)
        .map(|idx| match (idx, num_files) {
            (0, _) => "target".to_string(),
            (_, 2) => "decoy".to_string(),
            (idx, _) => format!("decoy-{}", idx),
        })
        .collect()
}

fn rank_column(ty: ScoreType) -> Option<&'static str> {
    match ty {
        ScoreType::Sp => Some("sp rank"),
        ScoreType::XCorr => Some("xcorr rank"),
        _ => None,
    }
}

/// Opens files, remembering which ones could not be opened
struct Opener<'a> {
    directory: &'a Path,
    overwrite: bool,
    opened: Vec<PathBuf>,
    failed: Vec<PathBuf>,
}

impl<'a> Opener<'a> {
    fn create(&mut self, name: String) -> Option<File> {
        let path = self.directory.join(name);
        if !self.overwrite && path.exists() {
            log::error!(
                "`{}` already exists, set `overwrite` to replace it",
                path.display()
            );
            self.failed.push(path);
            return None;
        }
        match File::create(&path) {
            Ok(file) => {
                log::trace!("opened `{}`", path.display());
                self.opened.push(path);
                Some(file)
            }
            Err(e) => {
                log::error!("failed to open `{}`: {}", path.display(), e);
                self.failed.push(path);
                None
            }
        }
    }

    fn tab(&mut self, name: String) -> Option<csv::Writer<File>> {
        self.create(name).map(|file| {
            csv::WriterBuilder::new()
                .delimiter(b'\t')
                .from_writer(file)
        })
    }

    fn text(&mut self, name: String) -> Option<BufWriter<File>> {
        self.create(name).map(BufWriter::new)
    }
}

#[derive(Serialize)]
struct SearchScore {
    #[serde(rename = "@name")]
    name: &'static str,
    #[serde(rename = "@value")]
    value: String,
}

#[derive(Serialize)]
struct AlternativeProtein<'a> {
    #[serde(rename = "@protein")]
    protein: &'a str,
}

#[derive(Serialize)]
struct ModificationInfo {
    #[serde(rename = "@modified_peptide")]
    modified_peptide: String,
}

#[derive(Serialize)]
struct SearchHit<'a> {
    #[serde(rename = "@hit_rank")]
    hit_rank: u32,
    #[serde(rename = "@peptide")]
    peptide: String,
    #[serde(rename = "@peptide_prev_aa")]
    peptide_prev_aa: String,
    #[serde(rename = "@peptide_next_aa")]
    peptide_next_aa: String,
    #[serde(rename = "@protein")]
    protein: &'a str,
    #[serde(rename = "@num_tot_proteins")]
    num_tot_proteins: usize,
    #[serde(rename = "@num_matched_ions")]
    num_matched_ions: u32,
    #[serde(rename = "@tot_num_ions")]
    tot_num_ions: u32,
    #[serde(rename = "@calc_neutral_pep_mass")]
    calc_neutral_pep_mass: f32,
    #[serde(rename = "@massdiff")]
    massdiff: f32,
    #[serde(rename = "@num_missed_cleavages")]
    num_missed_cleavages: u8,
    #[serde(rename = "@is_rejected")]
    is_rejected: u8,
    alternative_protein: Vec<AlternativeProtein<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modification_info: Option<ModificationInfo>,
    search_score: Vec<SearchScore>,
}

#[derive(Serialize)]
struct SearchResult<'a> {
    search_hit: Vec<SearchHit<'a>>,
}

#[derive(Serialize)]
struct SpectrumQuery<'a> {
    #[serde(rename = "@spectrum")]
    spectrum: String,
    #[serde(rename = "@start_scan")]
    start_scan: u32,
    #[serde(rename = "@end_scan")]
    end_scan: u32,
    #[serde(rename = "@precursor_neutral_mass")]
    precursor_neutral_mass: f32,
    #[serde(rename = "@assumed_charge")]
    assumed_charge: u8,
    #[serde(rename = "@index")]
    index: usize,
    #[serde(
        rename = "@retention_time_sec",
        skip_serializing_if = "Option::is_none"
    )]
    retention_time_sec: Option<f32>,
    search_result: SearchResult<'a>,
}

/// Target and decoy output files for one step of a run.
///
/// Files are named `dir/[fileroot.]command.target|decoy|decoy-N.ext`. A file
/// that cannot be opened is logged and left empty; writes meant for it are
/// skipped, while the remaining files are written normally
pub struct OutputFiles {
    command: Command,
    num_files: usize,
    top_match: usize,
    precision: usize,
    base_name: String,
    symbols: ModificationSymbols,
    scores: Vec<ScoreType>,
    tab: Vec<Option<csv::Writer<File>>>,
    sqt: Vec<Option<BufWriter<File>>>,
    xml: Vec<Option<BufWriter<File>>>,
    features: Option<csv::Writer<File>>,
    xml_index: usize,
    opened: Vec<PathBuf>,
    failed: Vec<PathBuf>,
}

impl OutputFiles {
    /// Open every file `command` produces under the current parameters
    pub fn open(parameters: &Search, command: Command, symbols: &ModificationSymbols) -> Self {
        let num_files = command.num_files(parameters.num_decoy_files);
        let tags = target_decoy_tags(num_files);
        let fileroot = parameters.fileroot.as_deref();
        log::debug!(
            "opening {} `{}` file set(s) in `{}`",
            num_files,
            command.name(),
            parameters.output_directory.display()
        );

        let mut opener = Opener {
            directory: &parameters.output_directory,
            overwrite: parameters.overwrite,
            opened: Vec::new(),
            failed: Vec::new(),
        };

        let tab = tags
            .iter()
            .map(|tag| opener.tab(file_name(fileroot, command, Some(tag), "txt")))
            .collect();

        let (sqt, xml) = match command {
            Command::Search => {
                let sqt = match parameters.write_sqt {
                    true => tags
                        .iter()
                        .map(|tag| opener.text(file_name(fileroot, command, Some(tag), "sqt")))
                        .collect(),
                    false => Vec::new(),
                };
                let xml = match parameters.write_pepxml {
                    true => tags
                        .iter()
                        .map(|tag| {
                            opener.text(file_name(fileroot, command, Some(tag), "pep.xml"))
                        })
                        .collect(),
                    false => Vec::new(),
                };
                (sqt, xml)
            }
            _ => (Vec::new(), Vec::new()),
        };

        let features = match (command, parameters.write_features) {
            (Command::AssignConfidence, true) => {
                opener.tab(file_name(fileroot, command, None, "features.txt"))
            }
            _ => None,
        };

        let scores = match (command, num_files) {
            (Command::AssignConfidence, n) if n > 1 => vec![
                ScoreType::Sp,
                ScoreType::XCorr,
                ScoreType::DecoyXCorrQValue,
            ],
            _ => vec![ScoreType::Sp, ScoreType::XCorr],
        };

        if !opener.failed.is_empty() {
            log::warn!(
                "{} `{}` output file(s) could not be opened and will not be written",
                opener.failed.len(),
                command.name()
            );
        }

        OutputFiles {
            command,
            num_files,
            top_match: parameters.top_match,
            precision: parameters.mass_precision,
            base_name: fileroot.unwrap_or("tandem").to_string(),
            symbols: symbols.clone(),
            scores,
            tab,
            sqt,
            xml,
            features,
            xml_index: 1,
            opened: opener.opened,
            failed: opener.failed,
        }
    }

    /// Files that could not be opened
    pub fn failed(&self) -> &[PathBuf] {
        &self.failed
    }

    pub fn num_files(&self) -> usize {
        self.num_files
    }

    fn tab_header(&self) -> csv::ByteRecord {
        let mut header = csv::ByteRecord::new();
        if self.command == Command::Proteins {
            for field in ["protein id", "score", "distinct peptides"] {
                header.push_field(field.as_bytes());
            }
            return header;
        }
        for field in [
            "scan",
            "charge",
            "spectrum precursor m/z",
            "spectrum neutral mass",
            "peptide mass",
            "delta_cn",
        ] {
            header.push_field(field.as_bytes());
        }
        for &ty in &self.scores {
            header.push_field(ty.name().as_bytes());
            if let Some(rank) = rank_column(ty) {
                header.push_field(rank.as_bytes());
            }
        }
        header.push_field(b"b/y ions matched");
        header.push_field(b"b/y ions total");
        if self.command == Command::Search {
            header.push_field(b"matches/spectrum");
        }
        for field in ["sequence", "protein id", "flanking aa"] {
            header.push_field(field.as_bytes());
        }
        header
    }

    /// Write column headers, SQT `H` lines and the pepXML preamble
    pub fn write_headers(
        &mut self,
        parameters: &Search,
        num_proteins: usize,
    ) -> anyhow::Result<()> {
        let header = self.tab_header();
        for wtr in self.tab.iter_mut().flatten() {
            wtr.write_byte_record(&header)?;
        }

        if let Some(wtr) = self.features.as_mut() {
            let mut header = csv::ByteRecord::from(vec!["scan", "label"]);
            for name in FEATURE_NAMES {
                header.push_field(name.as_bytes());
            }
            wtr.write_byte_record(&header)?;
        }

        for (idx, out) in self.sqt.iter_mut().enumerate() {
            if let Some(out) = out.as_mut() {
                write_sqt_header(out, parameters, &self.symbols, num_proteins, idx > 0)?;
            }
        }

        for out in self.xml.iter_mut().flatten() {
            write_pepxml_header(out, parameters, &self.base_name)?;
        }
        Ok(())
    }

    fn check_decoys(&self, found: usize) -> anyhow::Result<()> {
        let expected = self.num_files - 1;
        if found != expected {
            return Err(tandem_core::Error::DecoyCountMismatch { expected, found }.into());
        }
        Ok(())
    }

    fn serialize_match(&self, m: &Match, matches_per_spectrum: Option<usize>) -> csv::ByteRecord {
        let mut record = csv::ByteRecord::new();
        record.push_field(itoa::Buffer::new().format(m.scan()).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.charge()).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.spectrum.precursor_mz).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.zstate.neutral_mass).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.peptide.monoisotopic).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.delta_cn).as_bytes());
        for &ty in &self.scores {
            match m.score(ty) {
                Ok(score) => record.push_field(ryu::Buffer::new().format(score).as_bytes()),
                Err(_) => record.push_field(b""),
            }
            if rank_column(ty).is_some() {
                match m.rank(ty) {
                    Ok(rank) => record.push_field(itoa::Buffer::new().format(rank).as_bytes()),
                    Err(_) => record.push_field(b""),
                }
            }
        }
        record.push_field(itoa::Buffer::new().format(m.b_y_ion_matched).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.b_y_ion_possible).as_bytes());
        if let Some(n) = matches_per_spectrum {
            record.push_field(itoa::Buffer::new().format(n).as_bytes());
        }
        record.push_field(m.sequence_with_masses(true, self.precision).as_bytes());
        record.push_field(
            m.peptide
                .proteins
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(",")
                .as_bytes(),
        );
        record.push_field(&[m.peptide.prev_aa, m.peptide.next_aa]);
        record
    }

    /// Write the matches of one spectrum: `target` to the target files and
    /// each of `decoys` to its own decoy file. At most `top_match` ranks (by
    /// `rank`) are written per spectrum
    pub fn write_matches(
        &mut self,
        target: &MatchCollection,
        decoys: &[MatchCollection],
        rank: ScoreType,
    ) -> anyhow::Result<()> {
        self.check_decoys(decoys.len())?;

        let collections = std::iter::once(target)
            .chain(decoys.iter())
            .collect::<Vec<_>>();

        for (idx, collection) in collections.iter().enumerate() {
            let experiment_size = collection.experiment_size();
            let records = collection
                .top(rank, self.top_match)?
                .map(|m| self.serialize_match(m, Some(experiment_size)))
                .collect::<Vec<_>>();
            if let Some(wtr) = self.tab.get_mut(idx).and_then(Option::as_mut) {
                for record in &records {
                    wtr.write_byte_record(record)?;
                }
            }
        }

        for (idx, collection) in collections.iter().enumerate() {
            if let Some(out) = self.sqt.get_mut(idx).and_then(Option::as_mut) {
                write_sqt_spectrum(out, collection, self.top_match, &self.symbols)?;
            }
        }

        let index = self.xml_index;
        for (idx, collection) in collections.iter().enumerate() {
            if let Some(out) = self.xml.get_mut(idx).and_then(Option::as_mut) {
                if let Some(query) =
                    spectrum_query(collection, rank, self.top_match, index, &self.base_name)?
                {
                    let xml = quick_xml::se::to_string_with_root("spectrum_query", &query)?;
                    writeln!(out, "{}", xml)?;
                }
            }
        }
        self.xml_index += 1;
        Ok(())
    }

    /// Write matches from many spectra: `targets` to the target file and
    /// `decoys` to the decoy file, in their current order
    pub fn write_merged(
        &mut self,
        targets: &MatchCollection,
        decoys: Option<&MatchCollection>,
    ) -> anyhow::Result<()> {
        self.check_decoys(decoys.iter().count())?;
        for (idx, collection) in std::iter::once(targets).chain(decoys).enumerate() {
            let records = collection
                .iter()
                .map(|m| self.serialize_match(m, None))
                .collect::<Vec<_>>();
            if let Some(wtr) = self.tab.get_mut(idx).and_then(Option::as_mut) {
                for record in &records {
                    wtr.write_byte_record(record)?;
                }
            }
        }
        Ok(())
    }

    /// Write one feature row per record: scan, label, then each feature
    /// with four decimals
    pub fn write_features(&mut self, records: &[PinRecord]) -> anyhow::Result<()> {
        if let Some(wtr) = self.features.as_mut() {
            for pin in records {
                let mut record = csv::ByteRecord::new();
                record.push_field(itoa::Buffer::new().format(pin.scan).as_bytes());
                record.push_field(itoa::Buffer::new().format(pin.label).as_bytes());
                for feature in pin.features {
                    record.push_field(format!("{:.4}", feature).as_bytes());
                }
                wtr.write_byte_record(&record)?;
            }
        }
        Ok(())
    }

    /// Write protein hits, best first
    pub fn write_ranked_proteins(&mut self, hits: &HitCollection) -> anyhow::Result<()> {
        if let Some(wtr) = self.tab.get_mut(0).and_then(Option::as_mut) {
            for hit in hits {
                let mut record = csv::ByteRecord::new();
                record.push_field(hit.protein().as_bytes());
                record.push_field(ryu::Buffer::new().format(hit.score()).as_bytes());
                record.push_field(itoa::Buffer::new().format(hit.peptides()).as_bytes());
                wtr.write_byte_record(&record)?;
            }
        }
        Ok(())
    }

    /// Write footers, flush every file and return the paths written
    pub fn finish(mut self) -> anyhow::Result<Vec<String>> {
        for wtr in self.tab.iter_mut().flatten() {
            wtr.flush()?;
        }
        if let Some(wtr) = self.features.as_mut() {
            wtr.flush()?;
        }
        for out in self.sqt.iter_mut().flatten() {
            out.flush()?;
        }
        for out in self.xml.iter_mut().flatten() {
            out.write_all(b"</msms_run_summary>\n</msms_pipeline_analysis>\n")?;
            out.flush()?;
        }
        Ok(self
            .opened
            .iter()
            .map(|p| p.display().to_string())
            .collect())
    }
}

fn describe_tolerance(tolerance: Tolerance) -> String {
    match tolerance {
        Tolerance::Da(lo, hi) => format!("{:.3}", lo.abs().max(hi.abs())),
        Tolerance::Ppm(lo, hi) => format!("{:.1} ppm", lo.abs().max(hi.abs())),
    }
}

fn write_sqt_header<W: Write>(
    out: &mut W,
    parameters: &Search,
    symbols: &ModificationSymbols,
    num_proteins: usize,
    decoy: bool,
) -> anyhow::Result<()> {
    writeln!(out, "H\tSQTGenerator\ttandem")?;
    writeln!(out, "H\tSQTGeneratorVersion\t{}", parameters.version)?;
    writeln!(out, "H\tDatabase\t{}", parameters.peptides)?;
    writeln!(out, "H\tPrecursorMasses\tmono")?;
    writeln!(out, "H\tFragmentMasses\tmono")?;
    writeln!(out, "H\tDBLocusCount\t{}", num_proteins)?;
    writeln!(
        out,
        "H\tAlg-PreMassTol\t{}",
        describe_tolerance(parameters.precursor_tol)
    )?;
    writeln!(
        out,
        "H\tAlg-FragMassTol\t{}",
        describe_tolerance(parameters.fragment_tol)
    )?;
    for (residue, mass) in &parameters.static_mods {
        writeln!(out, "H\tStaticMod\t{}={:+.4}", residue, mass)?;
    }
    for (symbol, mass) in symbols.iter() {
        writeln!(out, "H\tDiffMod\t{}={:+.4}", symbol, mass)?;
    }
    if decoy {
        writeln!(
            out,
            "H\tComment\tDatabase peptides were {}; these are decoy matches",
            match parameters.decoy {
                tandem_core::peptide::Decoy::Shuffle => "shuffled",
                tandem_core::peptide::Decoy::Reverse => "reversed",
            }
        )?;
    }
    writeln!(out, "H\tLine fields: S, scan number, scan number, charge, 0, server, experimental M+H, total ion intensity, lowest Sp, number of matches")?;
    writeln!(out, "H\tLine fields: M, rank by xcorr score, rank by sp score, peptide mass, deltaCn, xcorr score, sp score, number ions matched, total ions compared, sequence, validation status")?;
    Ok(())
}

fn write_sqt_spectrum<W: Write>(
    out: &mut W,
    collection: &MatchCollection,
    top_match: usize,
    symbols: &ModificationSymbols,
) -> anyhow::Result<()> {
    let first = match collection.get(0) {
        Some(m) => m,
        None => return Ok(()),
    };
    let spectrum = &first.spectrum;
    let zstate = collection.zstate().unwrap_or(first.zstate);
    let lowest_sp = collection
        .iter()
        .map(|m| m.score(ScoreType::Sp))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .fold(f32::INFINITY, f32::min);

    writeln!(
        out,
        "S\t{}\t{}\t{}\t0\tserver\t{:.4}\t{:.1}\t{:.4}\t{}",
        spectrum.first_scan,
        spectrum.last_scan(),
        zstate.charge,
        zstate.singly_charged_mass(),
        spectrum.total_intensity(),
        lowest_sp,
        collection.experiment_size()
    )?;
    for m in collection.top(ScoreType::XCorr, top_match)? {
        writeln!(
            out,
            "M\t{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{}\t{}\t{}\tU",
            m.rank(ScoreType::XCorr)?,
            m.rank(ScoreType::Sp)?,
            m.peptide.monoisotopic + PROTON,
            m.delta_cn,
            m.score(ScoreType::XCorr)?,
            m.score(ScoreType::Sp)?,
            m.b_y_ion_matched,
            m.b_y_ion_possible,
            m.sequence_sqt(symbols)
        )?;
        for protein in &m.peptide.proteins {
            writeln!(out, "L\t{}", protein)?;
        }
    }
    Ok(())
}

fn write_pepxml_header<W: Write>(
    out: &mut W,
    parameters: &Search,
    base_name: &str,
) -> anyhow::Result<()> {
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<msms_pipeline_analysis xmlns="http://regis-web.systemsbiology.net/pepXML" summary_xml="{}.pep.xml">"#,
        base_name
    )?;
    writeln!(
        out,
        r#"<msms_run_summary base_name="{}" raw_data_type="" raw_data="">"#,
        base_name
    )?;
    writeln!(
        out,
        r#"<search_summary base_name="{}" search_engine="tandem" precursor_mass_type="monoisotopic" fragment_mass_type="monoisotopic" search_id="1">"#,
        base_name
    )?;
    writeln!(
        out,
        r#"<search_database local_path="{}" type="AA"/>"#,
        parameters.peptides
    )?;
    writeln!(
        out,
        r#"<parameter name="version" value="{}"/>"#,
        parameters.version
    )?;
    writeln!(
        out,
        r#"<parameter name="num_decoy_files" value="{}"/>"#,
        parameters.num_decoy_files
    )?;
    writeln!(out, "</search_summary>")?;
    Ok(())
}

fn spectrum_query<'a>(
    collection: &'a MatchCollection,
    rank: ScoreType,
    top_match: usize,
    index: usize,
    base_name: &str,
) -> anyhow::Result<Option<SpectrumQuery<'a>>> {
    let first = match collection.get(0) {
        Some(m) => m,
        None => return Ok(None),
    };
    let spectrum = &first.spectrum;
    let zstate = collection.zstate().unwrap_or(first.zstate);

    let mut search_hit = Vec::new();
    for m in collection.top(rank, top_match)? {
        let mut proteins = m.peptide.proteins.iter().map(|p| p.as_ref());
        let protein = proteins.next().unwrap_or_default();
        let modification_info = match m.peptide.modification_count() {
            0 => None,
            _ => Some(ModificationInfo {
                modified_peptide: m.sequence_with_masses(true, 2),
            }),
        };
        let mut search_score = vec![
            SearchScore {
                name: "delta_cn",
                value: format!("{:.4}", m.delta_cn),
            },
            SearchScore {
                name: "xcorr_score",
                value: format!("{:.4}", m.score(ScoreType::XCorr)?),
            },
            SearchScore {
                name: "xcorr_rank",
                value: m.rank(ScoreType::XCorr)?.to_string(),
            },
            SearchScore {
                name: "sp",
                value: format!("{:.4}", m.score(ScoreType::Sp)?),
            },
            SearchScore {
                name: "sp_rank",
                value: m.rank(ScoreType::Sp)?.to_string(),
            },
        ];
        if let Ok(q) = m.score(ScoreType::DecoyXCorrQValue) {
            search_score.push(SearchScore {
                name: "decoy_xcorr_qvalue",
                value: format!("{:.4}", q),
            });
        }
        search_hit.push(SearchHit {
            hit_rank: m.rank(rank)?,
            peptide: m.sequence(),
            peptide_prev_aa: (m.peptide.prev_aa as char).to_string(),
            peptide_next_aa: (m.peptide.next_aa as char).to_string(),
            protein,
            num_tot_proteins: m.peptide.proteins.len(),
            num_matched_ions: m.b_y_ion_matched,
            tot_num_ions: m.b_y_ion_possible,
            calc_neutral_pep_mass: m.peptide.monoisotopic,
            massdiff: m.mass_error(),
            num_missed_cleavages: m.peptide.missed_cleavages,
            is_rejected: 0,
            alternative_protein: proteins
                .map(|protein| AlternativeProtein { protein })
                .collect(),
            modification_info,
            search_score,
        });
    }

    Ok(Some(SpectrumQuery {
        spectrum: format!(
            "{}.{:05}.{:05}.{}",
            base_name,
            spectrum.first_scan,
            spectrum.last_scan(),
            zstate.charge
        ),
        start_scan: spectrum.first_scan,
        end_scan: spectrum.last_scan(),
        precursor_neutral_mass: zstate.neutral_mass,
        assumed_charge: zstate.charge,
        index,
        retention_time_sec: spectrum.retention_time.map(|rt| rt * 60.0),
        search_result: SearchResult { search_hit },
    }))
}

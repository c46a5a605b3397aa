use std::path::{Path, PathBuf};

use tandem_cli::input::Input;
use tandem_cli::runner::Runner;
use tandem_core::ion_series::{IonSeries, Kind};
use tandem_core::mass::PROTON;
use tandem_core::peptide::Peptide;
use tandem_core::spectrum::{Peak, Spectrum};

const PEPTIDES: &str = r#"[
    {"sequence": "CLVLTGFGGYDK", "proteins": ["sp|Q99536|VAT1_HUMAN"], "prev_aa": "R", "next_aa": "V"},
    {"sequence": "ACGLNFADLMAR", "proteins": ["sp|Q99536|VAT1_HUMAN"], "prev_aa": "R", "next_aa": "Q"},
    {"sequence": "TVENVTVFGTASASK", "proteins": ["sp|Q99536|VAT1_HUMAN", "sp|P00000|FAKE"], "prev_aa": "R", "next_aa": "H"},
    {"sequence": "NGVTHPIDYHTTDYVDEIK", "proteins": ["sp|Q99536|VAT1_HUMAN"], "prev_aa": "K", "next_aa": "K"},
    {"sequence": "GVDIVMDPLGGSDTAK", "proteins": ["sp|Q99536|VAT1_HUMAN"], "prev_aa": "K", "next_aa": "G"},
    {"sequence": "VVTYGMANLLTGPK", "proteins": ["sp|Q99536|VAT1_HUMAN"], "prev_aa": "K", "next_aa": "R"},
    {"sequence": "NLM[+15.9949]ALAR", "proteins": ["sp|Q99536|VAT1_HUMAN"], "prev_aa": "R", "next_aa": "T"},
    {"sequence": "VLLVPGPEK", "proteins": ["sp|Q99536|VAT1_HUMAN"], "prev_aa": "K", "next_aa": "E"}
]"#;

fn synthetic(sequence: &str, scan: u32) -> Spectrum {
    let peptide: Peptide = sequence.parse().unwrap();
    let mut peaks = Vec::new();
    for kind in [Kind::B, Kind::Y] {
        for (idx, ion) in IonSeries::new(&peptide, kind).enumerate() {
            peaks.push(Peak {
                mz: ion.mz(1),
                intensity: 1000.0 + 10.0 * idx as f32,
            });
        }
    }
    Spectrum {
        first_scan: scan,
        precursor_mz: (peptide.monoisotopic + 2.0 * PROTON) / 2.0,
        charges: vec![2],
        retention_time: Some(scan as f32),
        peaks,
        ..Default::default()
    }
}

fn workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tandem-cli-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn setup(dir: &Path) -> Input {
    std::fs::write(dir.join("peptides.json"), PEPTIDES).unwrap();
    let spectra = vec![
        synthetic("TVENVTVFGTASASK", 1),
        synthetic("VVTYGMANLLTGPK", 2),
    ];
    std::fs::write(
        dir.join("spectra.json"),
        serde_json::to_vec(&spectra).unwrap(),
    )
    .unwrap();

    serde_json::from_value(serde_json::json!({
        "peptides": dir.join("peptides.json"),
        "spectra_paths": [dir.join("spectra.json")],
        "output_directory": dir.join("out"),
        "fileroot": "test",
        "static_mods": {"C": 57.0215},
        "precursor_tol": {"da": [-500.0, 500.0]},
        "min_peaks": 5,
        "top_match": 3,
        "num_decoy_files": 2,
        "write_sqt": true,
        "write_pepxml": true,
        "write_features": true
    }))
    .unwrap()
}

fn read(path: PathBuf) -> String {
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

#[test]
fn integration() -> anyhow::Result<()> {
    let dir = workspace("integration");
    let search = setup(&dir).build()?;
    let out = search.output_directory.clone();
    let search = Runner::new(search)?.run()?;

    for name in [
        "test.search.target.txt",
        "test.search.decoy-1.txt",
        "test.search.decoy-2.txt",
        "test.search.target.sqt",
        "test.search.decoy-2.pep.xml",
        "test.assign-confidence.target.txt",
        "test.assign-confidence.decoy.txt",
        "test.assign-confidence.features.txt",
        "test.proteins.target.txt",
        "test.results.json",
    ] {
        let path = out.join(name).display().to_string();
        assert!(search.output_paths.contains(&path), "missing {}", path);
    }

    let search_tab = read(out.join("test.search.target.txt"));
    let mut lines = search_tab.lines();
    let header = lines.next().unwrap().split('\t').collect::<Vec<_>>();
    assert_eq!(header[0], "scan");
    assert!(header.contains(&"xcorr score"));
    // Every spectrum reports exactly `top_match` ranks
    assert_eq!(lines.count(), 6);

    let confidence = read(out.join("test.assign-confidence.target.txt"));
    let mut lines = confidence.lines();
    let header = lines.next().unwrap().split('\t').collect::<Vec<_>>();
    let q_col = header
        .iter()
        .position(|&h| h == "decoy q-value (xcorr)")
        .unwrap();
    let seq_col = header.iter().position(|&h| h == "sequence").unwrap();
    let rows = lines
        .map(|l| l.split('\t').map(String::from).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    assert_eq!(rows.len(), 2);
    let mut sequences = rows.iter().map(|r| r[seq_col].clone()).collect::<Vec<_>>();
    sequences.sort();
    assert_eq!(sequences, vec!["TVENVTVFGTASASK", "VVTYGMANLLTGPK"]);
    let qvalues = rows
        .iter()
        .map(|r| r[q_col].parse::<f32>().unwrap())
        .collect::<Vec<_>>();
    assert!(qvalues.windows(2).all(|w| w[0] <= w[1]));

    let features = read(out.join("test.assign-confidence.features.txt"));
    let mut lines = features.lines();
    assert!(lines.next().unwrap().starts_with("scan\tlabel\tXCorr\tDeltCN"));
    // Two targets and the best match of both decoy sets for both spectra
    let labels = lines
        .map(|l| l.split('\t').nth(1).unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(labels.iter().filter(|l| *l == "1").count(), 2);
    assert_eq!(labels.iter().filter(|l| *l == "-1").count(), 4);

    let sqt = read(out.join("test.search.target.sqt"));
    assert!(sqt.starts_with("H\tSQTGenerator\ttandem"));
    assert!(sqt.contains("H\tStaticMod\tC=+57.0215"));
    assert_eq!(sqt.lines().filter(|l| l.starts_with("S\t")).count(), 2);

    let xml = read(out.join("test.search.target.pep.xml"));
    assert!(xml.contains("<spectrum_query"));
    assert!(xml.trim_end().ends_with("</msms_pipeline_analysis>"));

    let proteins = read(out.join("test.proteins.target.txt"));
    assert!(proteins.lines().nth(1).unwrap().starts_with("sp|"));

    Ok(())
}

#[test]
fn existing_files_are_not_overwritten() -> anyhow::Result<()> {
    let dir = workspace("overwrite");
    let input = setup(&dir);
    let search = Runner::new(input.build()?)?.run()?;
    assert!(!search.output_paths.is_empty());

    let target = search.output_directory.join("test.search.target.txt");
    let before = read(target.clone());

    // Same parameters again: every file already exists, so nothing is
    // written, but the run itself still succeeds
    let search = Runner::new(setup(&dir).build()?)?.run()?;
    assert!(search.output_paths.is_empty());
    assert_eq!(read(target), before);
    Ok(())
}

use clap::{value_parser, Arg, Command, ValueHint};
use rayon::ThreadPoolBuilder;
use tandem_cli::input::Input;
use tandem_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("TANDEM_LOG", "error,tandem=info"))
        .init();

    let matches = Command::new("tandem")
        .version(clap::crate_version!())
        .about("Peptide identification from tandem mass spectra, scored by XCorr with decoy-based FDR")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("spectra_paths")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths to spectra (JSON files) to process. Overrides spectra files listed \
                     in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("peptides")
                .short('p')
                .long("peptides")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to candidate peptides (JSON file). Overrides the peptide file \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where search results will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("fileroot")
                .long("fileroot")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Prefix added to the name of every output file")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("num-decoy-files")
                .long("num-decoy-files")
                .value_parser(value_parser!(usize))
                .help("Number of independent decoy sets searched per spectrum")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_parser(value_parser!(u64))
                .help("Seed for decoy generation")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of threads used for searching (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .action(clap::ArgAction::SetTrue)
                .help("Replace existing output files"),
        )
        .arg(
            Arg::new("write-sqt")
                .long("write-sqt")
                .action(clap::ArgAction::SetTrue)
                .help("Write SQT output files"),
        )
        .arg(
            Arg::new("write-pepxml")
                .long("write-pepxml")
                .action(clap::ArgAction::SetTrue)
                .help("Write pepXML output files"),
        )
        .arg(
            Arg::new("write-features")
                .long("write-features")
                .action(clap::ArgAction::SetTrue)
                .help("Write percolator features for the best match of each spectrum"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .copied()
        .map(usize::from)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new().num_threads(threads).build_global()?;

    let input = Input::from_arguments(matches)?;

    input
        .build()
        .and_then(Runner::new)
        .and_then(Runner::run)?;

    Ok(())
}

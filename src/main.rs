use jprobe::*;

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn main() -> Result<(), instrument::Error> {
    env_logger::init();

    let matches = Command::new("jprobe")
        .version(crate_version!())
        .about("Inserts instruction-level probes into JVM class files")
        .arg(
            Arg::new("probe class")
                .long("probe-class")
                .value_name("CLASS")
                .help("Class receiving the probe calls, as in `org/evosuite/dse/VM`"),
        )
        .arg(
            Arg::new("output directory")
                .long("output-directory")
                .value_name("DIR")
                .default_value("instrumented")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .value_name("PREFIX")
                .help("Dotted class name prefix to leave alone (on top of the defaults)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("INPUT")
                .help("Class file, or directory searched for class files")
                .required(true)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let mut settings = match matches.get_one::<String>("probe class") {
        Some(probe_class) => settings::Settings::new(probe_class.as_str())?,
        None => settings::Settings::default(),
    };
    if let Some(prefixes) = matches.get_many::<String>("exclude") {
        settings.exclusions.extend(prefixes.cloned());
    }

    let input = matches
        .get_one::<PathBuf>("INPUT")
        .ok_or_else(|| instrument::Error::Settings(String::from("no input given")))?;
    let output_directory = matches
        .get_one::<PathBuf>("output directory")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("instrumented"));

    let rewriter = rewrite::ClassRewriter::new(settings)?;
    let mut failures = 0;
    for class_file in class_files(input)? {
        if let Err(err) = instrument_file(&rewriter, &class_file, &output_directory) {
            log::warn!("Failed to instrument '{}': {}", class_file.display(), err);
            failures += 1;
        }
    }

    if failures > 0 {
        log::error!("{} class file(s) could not be instrumented", failures);
        std::process::exit(1);
    }
    Ok(())
}

/// The input itself, or every `.class` file beneath it
fn class_files(input: &Path) -> Result<Vec<PathBuf>, instrument::Error> {
    if !input.is_dir() {
        return Ok(vec![input.to_owned()]);
    }
    let mut files = vec![];
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.map_err(|err| jvm::Error::IoError(err.into()))?;
        if entry.file_type().is_file()
            && entry.path().extension().map_or(false, |ext| ext == "class")
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn instrument_file(
    rewriter: &rewrite::ClassRewriter,
    class_file: &Path,
    output_directory: &Path,
) -> Result<(), instrument::Error> {
    let bytes = fs::read(class_file).map_err(jvm::Error::IoError)?;
    let class_name = jvm::class_file::ClassFile::parse(&bytes)?.this_class_name()?;
    if rewriter.settings().is_excluded(&class_name.replace('/', ".")) {
        log::warn!("Skipping excluded class {}", class_name);
        return Ok(());
    }

    log::info!("Instrumenting '{}'", class_file.display());
    let rewritten = rewriter.rewrite(&bytes)?;

    let destination = output_directory.join(format!("{}.class", class_name));
    log::info!("Writing '{}'", destination.display());
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(jvm::Error::IoError)?;
    }
    fs::write(&destination, rewritten).map_err(jvm::Error::IoError)?;
    Ok(())
}

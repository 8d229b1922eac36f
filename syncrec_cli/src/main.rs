//! # syncrec_cli
//!
//! Part of the syncrec crate family.
//!
//! This is the command line application to build sync records from a sample file.
//!
//! ## Use
//!
//! ```bash
//! syncrec_cli -p config.yaml new     # write a template configuration
//! syncrec_cli -p config.yaml         # build the records described by the configuration
//! syncrec_cli -p records.dat dump    # print the records of a record file
//! syncrec_cli -p records.dat dump -v TTX
//! ```
//!
//! The library writes its detailed log to `syncrec.log` in the working directory.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libsyncrec::config::Config;
use libsyncrec::process::process;
use libsyncrec::reader::SyncRecordReader;
use libsyncrec::record_file::RecordFileReader;
use libsyncrec::worker_status::WorkerStatus;

fn make_template_config(path: &Path) {
    match Config::template().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Route the library's log to a file
fn init_library_log() {
    let file_sink = spdlog::sink::FileSink::builder()
        .path(PathBuf::from("./syncrec.log"))
        .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
            spdlog::formatter::pattern!(
                "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
            ),
        )))
        .truncate(true)
        .build();
    let file_sink = match file_sink {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            log::warn!("Could not open the library log file: {e}");
            return;
        }
    };
    match spdlog::Logger::builder()
        .flush_level_filter(spdlog::LevelFilter::All)
        .sink(file_sink)
        .build()
    {
        Ok(logger) => spdlog::set_default_logger(Arc::new(logger)),
        Err(e) => log::warn!("Could not create the library logger: {e}"),
    }
}

fn dump_records(path: &Path, variable: Option<&String>) {
    let mut file = match RecordFileReader::new(path) {
        Ok(file) => file,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    let reader = match SyncRecordReader::new(file.header().clone()) {
        Ok(reader) => reader,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    print!("{}", reader.header().rates_text());

    loop {
        let record = match file.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                log::error!("{e}");
                return;
            }
        };
        match variable {
            Some(name) => match reader.values(&record, name) {
                Ok(values) => {
                    let text: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
                    println!("{} {}", record.time_string(), text.join(" "));
                }
                Err(e) => {
                    log::error!("{e}");
                    return;
                }
            },
            None => {
                let filled = record.data.iter().filter(|v| !v.is_nan()).count();
                println!(
                    "{} {} of {} values present",
                    record.time_string(),
                    filled,
                    record.data.len()
                );
            }
        }
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("syncrec_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("dump")
                .about("Print the records of a record file")
                .arg(
                    Arg::new("variable")
                        .short('v')
                        .long("variable")
                        .help("Print the values of one variable"),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    init_library_log();

    // Parse the cli
    let path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            log::error!("A path is required");
            return;
        }
    };

    match matches.subcommand() {
        Some(("new", _)) => {
            log::info!("Making a template config at {}...", path.to_string_lossy());
            make_template_config(&path);
            return;
        }
        Some(("dump", args)) => {
            dump_records(&path, args.get_one::<String>("variable"));
            return;
        }
        _ => (),
    }

    // Load our config
    log::info!("Loading config from {}...", path.to_string_lossy());
    let config = match Config::read_config_file(&path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Sample Path: {}", config.sample_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!("Statistics Path: {}", config.get_stats_path().to_string_lossy());
    log::info!("Number of Streams: {}", config.streams.len());

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    loop {
        // No UI to drive updates, so poll a few times a second
        std::thread::sleep(std::time::Duration::from_millis(250));
        if let Some(status) = rx.try_iter().last() {
            pb.set_position((status.progress * 100.0) as u64);
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(stats) => {
                        log::info!("Successfully built {} sync records!", stats.records_emitted);
                        match serde_yaml::to_string(&stats) {
                            Ok(text) => log::info!("Statistics:\n{text}"),
                            Err(e) => log::error!("{e}"),
                        }
                    }
                    Err(e) => log::error!("Building sync records failed with error: {e}"),
                },
                Err(_) => log::error!("Failed to join processing task!"),
            }
            break;
        }
    }

    pb.finish();

    log::info!("Done.");
}

use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use libdragon_daq::config::Config;
use libdragon_daq::process::process;

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn main() {
    // Create a cli
    let matches = Command::new("dragon_daq_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
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

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );

        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    log::info!("Config successfully loaded.");
    log::info!(
        "Connection Table: {}",
        config.connection_table.to_string_lossy()
    );
    log::info!("Output Prefix: {}", config.output_prefix);
    log::info!(
        "Sample Depth: {} Protocol Version: {}",
        config.sample_depth,
        config.protocol_version
    );
    log::info!(
        "Events: {} Prescale: {} Input Freq [Hz]: {}",
        config.n_events,
        config.prescale_factor,
        config.input_freq_hz
    );
    log::info!("Save Raw: {} Close Inspect: {}", config.save_raw, config.close_inspect);

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    let (tx, rx) = channel();
    // Spawn the task!
    let handle = std::thread::spawn(|| process(config, tx));

    loop {
        // No UI here, so poll the status channel with a timeout instead
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(status) => pb.set_position((status.progress * 100.0) as u64),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => (),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    match handle.join() {
        Ok(result) => match result {
            Ok(_) => log::info!("Successfully finished the run!"),
            Err(e) => {
                log::error!("Acquisition failed with error: {e}");
                pb.finish();
                std::process::exit(1);
            }
        },
        Err(_) => log::error!("Failed to join acquisition task!"),
    }

    pb.finish();

    log::info!("Done.");
}

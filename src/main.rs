use clap::Parser;
use fwarchive::{
    is_envelope_encrypted, Cli, FwArchive, FwArchiveError, OutputFormatter, OutputMode, RunReport, UserFriendlyError,
};
use std::process;

const EXIT_FAILED_CASES: i32 = 3;
const EXIT_CANCELLED: i32 = 130;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();
    setup_logging(&cli);

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let fwarchive = match FwArchive::from_cli(&cli) {
        Ok(fwarchive) => fwarchive,
        Err(e) => {
            print_startup_error(&e);
            return 1;
        }
    };

    if cli.dry_run {
        return handle_dry_run(&cli, &fwarchive);
    }

    let result = if cli.has_explicit_modules() {
        fwarchive.extract_modules(&cli.modules)
    } else {
        fwarchive.run_suites()
    };

    match result {
        Ok(report) => {
            fwarchive.output_formatter().print_run_report(&report);
            exit_code_for(&report)
        }
        Err(e) => {
            fwarchive.handle_error(&e);

            match e {
                FwArchiveError::Cancelled => EXIT_CANCELLED,
                _ => 1,
            }
        }
    }
}

fn exit_code_for(report: &RunReport) -> i32 {
    if report.summary.has_failures() {
        EXIT_FAILED_CASES
    } else {
        0
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "fwarchive.toml".to_string());

    match FwArchive::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  fwarchive --config {}", config_path);
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(cli: &Cli, fwarchive: &FwArchive) -> i32 {
    let formatter = fwarchive.output_formatter();
    let config = fwarchive.config();

    if formatter.mode() != OutputMode::Json {
        formatter.info("DRY RUN MODE - No files will be decrypted or extracted");
        formatter.print_separator();

        formatter.info("Configuration that would be used:");
        println!("  Input root: {}", config.paths.input_root.display());
        println!("  Output root: {}", config.paths.output_root.display());
        println!("  Decryption backend: {:?}", config.decrypt.backend);
        println!(
            "  Generations: {}",
            config
                .suites
                .generations
                .iter()
                .map(|g| g.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Some(ref filter) = config.suites.device_filter {
            println!("  Device filter: {}", filter);
        }
        println!("  Write report: {}", config.output.generate_report);
        formatter.print_separator();
    }

    if cli.has_explicit_modules() {
        for module in &cli.modules {
            match is_envelope_encrypted(module) {
                Ok(sealed) => println!(
                    "  {} ({})",
                    module.display(),
                    if sealed { "envelope, would decrypt" } else { "plain" }
                ),
                Err(e) => {
                    formatter.error(&format!("Cannot read {}: {}", module.display(), e));
                    return 1;
                }
            }
        }
    } else {
        match fwarchive.plan() {
            Ok(plans) => formatter.print_dry_run(&plans),
            Err(e) => {
                fwarchive.handle_error(&e);
                return 1;
            }
        }
    }

    if formatter.mode() != OutputMode::Json {
        formatter.print_separator();
        formatter.success("Dry run completed successfully");
        formatter.info("Run without --dry-run to perform actual extraction");
    }

    0
}

fn print_startup_error(error: &FwArchiveError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

fn setup_logging(cli: &Cli) {
    let default_level = cli.log_level().as_str();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

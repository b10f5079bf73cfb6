use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use uniwa_schedule::output::{self, DEFAULT_OUTPUT_PATH, DEFAULT_VAR_NAME, OutputOptions};
use uniwa_schedule::{ScrapeOptions, ScraperConfig, WebScraper};

#[derive(Parser)]
#[command(name = "uniwa-schedule")]
#[command(about = "A classschedule.uniwa.gr timetable scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(long, global = true, help = "Override the schedule site base URL")]
    base_url: Option<String>,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 30,
        global = true,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Per-request timeout"
    )]
    timeout: u64,

    #[arg(long, global = true, help = "Ignore system proxy settings")]
    no_proxy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the classrooms published on the schedule site
    Classrooms {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// List the selectable academic periods, discovered from the first classroom
    Periods {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Scrape every classroom for every period and write the front-end data file
    Export {
        #[arg(long, default_value = DEFAULT_OUTPUT_PATH, help = "Path of the generated script")]
        out: PathBuf,

        #[arg(long, default_value = DEFAULT_VAR_NAME, help = "Name of the declared variable")]
        var_name: String,

        #[arg(long, help = "Write non-ASCII characters literally instead of escaping them")]
        utf8: bool,

        #[arg(long, help = "Leave examination periods out of the export")]
        skip_exams: bool,

        #[arg(
            long,
            default_value_t = 4,
            value_parser = clap::value_parser!(u16).range(1..),
            help = "Maximum number of schedule pages fetched at once"
        )]
        concurrency: u16,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let mut config = ScraperConfig {
        timeout: Duration::from_secs(cli.timeout),
        use_system_proxy: !cli.no_proxy,
        ..ScraperConfig::default()
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Commands::Export { concurrency, .. } = cli.command {
        config.concurrency = concurrency.into();
    }

    let scraper = WebScraper::with_config(config).unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    match cli.command {
        Commands::Classrooms { format } => {
            let listing = scraper.fetch_classrooms().await.unwrap_or_else(|e| {
                log::error!("Error fetching classroom list: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&listing.classrooms),
                OutputFormat::Text => {
                    for (i, classroom) in listing.classrooms.iter().enumerate() {
                        println!("{:>4}. {}", i + 1, classroom);
                    }
                    println!(
                        "\n{} classrooms ({} malformed rows skipped), initial period code {}",
                        listing.classrooms.len(),
                        listing.malformed.len(),
                        listing.initial_period_code
                    );
                }
            }
        }

        Commands::Periods { format } => {
            let listing = scraper.fetch_classrooms().await.unwrap_or_else(|e| {
                log::error!("Error fetching classroom list: {}", e);
                process::exit(1);
            });

            let periods = scraper
                .fetch_periods(&listing.classrooms[0], &listing.initial_period_code)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Error fetching academic periods: {}", e);
                    process::exit(1);
                });

            match format {
                OutputFormat::Json => serialize_json(&periods),
                OutputFormat::Text => {
                    for (i, period) in periods.iter().enumerate() {
                        println!("{:>3}. {}", i + 1, period);
                    }
                }
            }
        }

        Commands::Export {
            out,
            var_name,
            utf8,
            skip_exams,
            ..
        } => {
            log::info!("Scraping {}...", scraper.base_url());

            let data = scraper
                .scrape(&ScrapeOptions { skip_exams })
                .await
                .unwrap_or_else(|e| {
                    log::error!("Error scraping schedule: {}", e);
                    process::exit(1);
                });

            print!("{}", data.departments.stats());

            let options = OutputOptions { var_name, utf8 };
            output::write_js(&out, &data, &options).unwrap_or_else(|e| {
                log::error!("Error writing {}: {}", out.display(), e);
                process::exit(1);
            });
        }
    }
}

pub mod aggregate;
mod parser;
pub mod output;
pub mod scraper;
pub mod types;

pub use aggregate::Departments;
pub use output::{AppData, OutputOptions};
pub use parser::{ClassroomListing, FormatError, ParseError};
pub use scraper::{ScrapeOptions, ScraperConfig, ScraperError, WebScraper};

pub(crate) const BASE_URL: &str = "http://classschedule.uniwa.gr";
pub(crate) const LISTING_PATH: &str = "/areas/list/30";

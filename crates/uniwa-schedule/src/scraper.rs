use crate::aggregate::{Departments, Outcome};
use crate::output::AppData;
use crate::parser::{
    ClassroomListing, ParseError, parse_classroom_list, parse_event_page, parse_periods,
};
use crate::types::{Classroom, Event, Period};

use futures::StreamExt;
use futures::stream;
use reqwest::{Client, StatusCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Fetching {url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    pub listing_path: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Upper bound on in-flight schedule requests while aggregating.
    pub concurrency: usize,
    pub use_system_proxy: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: crate::BASE_URL.to_string(),
            listing_path: crate::LISTING_PATH.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            concurrency: 4,
            use_system_proxy: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    pub skip_exams: bool,
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    base_url: String,
    listing_path: String,
    concurrency: usize,
}

impl WebScraper {
    pub fn new() -> Result<Self, ScraperError> {
        Self::with_config(ScraperConfig::default())
    }

    pub fn with_config(config: ScraperConfig) -> Result<Self, ScraperError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            listing_path: config.listing_path,
            concurrency: config.concurrency.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn schedule_url(&self, period_code: &str, classroom_id: &str) -> String {
        format!("{}/areas/{}/{}", self.base_url, period_code, classroom_id)
    }

    pub async fn fetch_classrooms(&self) -> Result<ClassroomListing, ScraperError> {
        let url = format!("{}{}", self.base_url, self.listing_path);
        log::info!("Fetching classroom list from {}...", url);
        let html = self.get_html(&url).await?;
        Ok(parse_classroom_list(&html)?)
    }

    /// Reads the academic period selector on one classroom's schedule page.
    pub async fn fetch_periods(
        &self,
        classroom: &Classroom,
        initial_period_code: &str,
    ) -> Result<Vec<Period>, ScraperError> {
        let url = self.schedule_url(initial_period_code, &classroom.id);
        log::info!("Fetching academic periods from {}...", url);
        let html = self.get_html(&url).await?;

        let periods = parse_periods(&html);
        if periods.is_empty() {
            return Err(ParseError::MissingField("academic period options".to_string()).into());
        }

        log::info!("Found {} academic periods", periods.len());
        Ok(periods)
    }

    pub async fn fetch_events(
        &self,
        period: &Period,
        classroom: &Classroom,
    ) -> Result<Vec<Event>, ScraperError> {
        let url = self.schedule_url(&period.id, &classroom.id);
        log::debug!("Fetching events: {}", url);
        let html = self.get_html(&url).await?;
        Ok(parse_event_page(&html)?)
    }

    /// Fetches every (period, classroom) page and folds the events into one
    /// aggregate. A page that fails to fetch or parse is skipped.
    ///
    /// Pages are requested `concurrency` at a time but folded in period-major,
    /// classroom-minor order, so the result does not depend on response timing.
    pub async fn fetch_departments(
        &self,
        classrooms: &[Classroom],
        periods: &[Period],
    ) -> Departments {
        let mut departments = Departments::new();
        let mut current_period: Option<&str> = None;
        let (mut added, mut skipped_pages, mut incidental) = (0usize, 0usize, 0usize);

        let pairs = periods.iter().flat_map(|period| {
            classrooms
                .iter()
                .map(move |classroom| (period, classroom))
        });

        let mut pages = stream::iter(pairs)
            .map(|(period, classroom)| async move {
                (period, classroom, self.fetch_events(period, classroom).await)
            })
            .buffered(self.concurrency);

        while let Some((period, classroom, result)) = pages.next().await {
            if current_period != Some(period.id.as_str()) {
                log::info!("{}", period.name);
                current_period = Some(period.id.as_str());
            }

            let events = match result {
                Ok(events) => events,
                Err(e) => {
                    log::warn!(
                        "Skipping classroom {} for '{}': {}",
                        classroom.id,
                        period.name,
                        e
                    );
                    skipped_pages += 1;
                    continue;
                }
            };

            let is_exam = period.is_exam();
            for event in &events {
                match departments.add(event, is_exam) {
                    Outcome::Added | Outcome::Merged => added += 1,
                    Outcome::SkippedIncidental => incidental += 1,
                    Outcome::SkippedNoDate | Outcome::SkippedShapeMismatch => {}
                }
            }
        }

        log::info!(
            "Aggregated {} events across {} departments ({} one-off bookings ignored, {} pages skipped)",
            added,
            departments.len(),
            incidental,
            skipped_pages
        );

        departments
    }

    /// Runs the three stages end to end. Periods are discovered from the first
    /// listed classroom.
    pub async fn scrape(&self, options: &ScrapeOptions) -> Result<AppData, ScraperError> {
        let listing = self.fetch_classrooms().await?;

        let first = listing
            .classrooms
            .first()
            .ok_or_else(|| ParseError::MissingField("classroom rows".to_string()))?;
        let mut periods = self
            .fetch_periods(first, &listing.initial_period_code)
            .await?;

        if options.skip_exams {
            periods.retain(|p| !p.is_exam());
        }

        let departments = self
            .fetch_departments(&listing.classrooms, &periods)
            .await;

        Ok(AppData::new(&periods, listing.classrooms, departments))
    }

    async fn get_html(&self, url: &str) -> Result<String, ScraperError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Status {
                url: url.to_string(),
                status,
            });
        }

        Ok(response
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }
}

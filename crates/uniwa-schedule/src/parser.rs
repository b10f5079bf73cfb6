use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Deserializer};

use crate::types::{CONJUNCTION, Classroom, Event, FLOOR_QUALIFIER, GROUND_FLOOR, Period};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("No script block references the events calendar")]
    MissingEventsScript,
    #[error("No array literal found in the events script")]
    MissingEventsArray,
    #[error("Malformed events JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A `data-area` location string that does not have 4 or 5 dot-separated fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed location '{location}': expected 4 or 5 fields, found {fields}")]
pub struct FormatError {
    pub location: String,
    pub fields: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassroomListing {
    pub classrooms: Vec<Classroom>,
    /// Period code embedded in the listing's schedule links, used to open the
    /// first classroom page and discover the selectable periods.
    pub initial_period_code: String,
    pub malformed: Vec<FormatError>,
}

// Most garbled form first so no partial entity is left behind.
const GARBLED_AMPERSANDS: [&str; 4] = ["&amp;amp;amp;", "&amp;amp;", "&amp;", "amp;"];

static RE_ARRAY_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*\]").expect("invalid regex: array literal"));

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

pub fn normalize_floor(floor: &str) -> String {
    if floor == GROUND_FLOOR {
        floor.to_string()
    } else {
        format!("{} {}", floor, FLOOR_QUALIFIER)
    }
}

/// Builds a classroom from its site id and a location such as
/// `Αρχαίος Ελαιώνας.Δ.Πρώτος.108`. A fifth field is folded into the code.
pub fn parse_location(id: &str, location: &str) -> Result<Classroom, FormatError> {
    let parts: Vec<&str> = location.split('.').collect();

    let code = match parts.len() {
        4 => parts[3].to_string(),
        5 => parts[3..5].join("."),
        fields => {
            return Err(FormatError {
                location: location.to_string(),
                fields,
            });
        }
    };

    Ok(Classroom {
        id: id.to_string(),
        campus: parts[0].to_string(),
        building: parts[1].to_string(),
        floor: normalize_floor(parts[2]),
        code,
    })
}

/// Splits `/areas/<period-code>/<id>` into its last two segments.
fn split_schedule_href(href: &str) -> Option<(&str, &str)> {
    let mut segments = href.trim_end_matches('/').rsplit('/');
    let id = segments.next().filter(|s| !s.is_empty())?;
    let period_code = segments.next().filter(|s| !s.is_empty())?;
    Some((period_code, id))
}

pub fn parse_classroom_list(html: &str) -> Result<ClassroomListing, ParseError> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("tr[data-area]").unwrap();
    let link_selector = Selector::parse("span#classroom_title a[href]").unwrap();

    let mut classrooms = Vec::new();
    let mut malformed = Vec::new();
    let mut initial_period_code: Option<String> = None;

    for row in document.select(&row_selector) {
        let Some(href) = row
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            log::warn!("Skipping classroom row without a schedule link");
            continue;
        };

        let Some((period_code, id)) = split_schedule_href(href) else {
            log::warn!("Skipping classroom row with unexpected link '{}'", href);
            continue;
        };

        if initial_period_code.is_none() {
            initial_period_code = Some(period_code.to_string());
        }

        let location = row.value().attr("data-area").unwrap_or_default();
        match parse_location(id, location) {
            Ok(classroom) => classrooms.push(classroom),
            Err(e) => {
                log::warn!("Skipping classroom {}: {}", id, e);
                malformed.push(e);
            }
        }
    }

    log::info!("Found {} classrooms", classrooms.len());

    if classrooms.is_empty() {
        return Err(ParseError::MissingField("classroom rows".to_string()));
    }

    let initial_period_code = initial_period_code
        .ok_or_else(|| ParseError::MissingField("initial period code".to_string()))?;

    Ok(ClassroomListing {
        classrooms,
        initial_period_code,
        malformed,
    })
}

pub fn parse_periods(html: &str) -> Vec<Period> {
    let document = Html::parse_document(html);
    let option_selector = Selector::parse("select#academic_periods option").unwrap();

    document
        .select(&option_selector)
        .filter_map(|option| {
            let name = elem_text(option).trim().to_string();
            match option.value().attr("value") {
                Some(id) if !id.trim().is_empty() => Some(Period {
                    id: id.trim().to_string(),
                    name,
                }),
                _ => {
                    log::warn!("Skipping period option without a value: '{}'", name);
                    None
                }
            }
        })
        .collect()
}

/// Pulls the calendar's event array literal out of the inline script that
/// configures it. This is the only place that knows the page embeds its data
/// as script text.
pub fn extract_events_array(html: &str) -> Result<String, ParseError> {
    let document = Html::parse_document(html);
    let script_selector = Selector::parse("script").unwrap();

    let script = document
        .select(&script_selector)
        .map(elem_text)
        .find(|text| text.contains("events"))
        .ok_or(ParseError::MissingEventsScript)?;

    RE_ARRAY_LITERAL
        .find(&script)
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::MissingEventsArray)
}

pub fn sanitize_course_name(course: &str) -> String {
    GARBLED_AMPERSANDS
        .iter()
        .fold(course.to_string(), |acc, garbled| {
            acc.replace(garbled, CONJUNCTION)
        })
}

/// `09:00:00` -> `09:00`. Values without a seconds component are kept.
pub fn strip_seconds(time: &str) -> String {
    let time = time.trim();
    if time.matches(':').count() == 2
        && let Some(pos) = time.rfind(':')
    {
        time[..pos].to_string()
    } else {
        time.to_string()
    }
}

fn parse_start_date(start_recur: &str) -> Option<NaiveDate> {
    let date = start_recur.trim().split([' ', 'T']).next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::String(s) => s,
        Scalar::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    department_name: String,
    academic_period_name: String,
    #[serde(deserialize_with = "string_or_number")]
    day_of_week: String,
    starting_hour: String,
    ending_hour: String,
    event_data: RawEventData,
    #[serde(deserialize_with = "string_or_number")]
    area_id: String,
    academic_period_valid_to: Option<String>,
    #[serde(rename = "endRecur")]
    end_recur: Option<String>,
    #[serde(rename = "startRecur")]
    start_recur: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    course_name: String,
    professor: Option<String>,
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        Event {
            department: raw.department_name,
            period_name: raw.academic_period_name,
            day: raw.day_of_week,
            time_start: strip_seconds(&raw.starting_hour),
            time_end: strip_seconds(&raw.ending_hour),
            course: sanitize_course_name(&raw.event_data.course_name),
            professor: raw.event_data.professor,
            area_id: raw.area_id,
            valid_to: raw.academic_period_valid_to,
            recurrence_end: raw.end_recur,
            start_date: raw.start_recur.as_deref().and_then(parse_start_date),
        }
    }
}

/// Parses the events array. Entries that do not match the event schema are
/// skipped; malformed JSON fails the whole array.
pub fn parse_events(json: &str) -> Result<Vec<Event>, ParseError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;

    let events = entries
        .into_iter()
        .enumerate()
        .filter_map(
            |(i, entry)| match serde_json::from_value::<RawEvent>(entry) {
                Ok(raw) => Some(Event::from(raw)),
                Err(e) => {
                    log::warn!("Skipping event entry #{}: {}", i, e);
                    None
                }
            },
        )
        .collect();

    Ok(events)
}

pub fn parse_event_page(html: &str) -> Result<Vec<Event>, ParseError> {
    let json = extract_events_array(html)?;
    parse_events(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE_EVENTS: &str = r#"[{"department_name":"CS","academic_period_name":"2024","day_of_week":"Mon","starting_hour":"09:00:00","ending_hour":"11:00:00","event_data":{"course_name":"X &amp;amp; Y","professor":"P"},"area_id":"A1","academic_period_valid_to":"2024-06-01","endRecur":"2024-06-01","startRecur":"2024-02-01 00:00:00"}]"#;

    #[test]
    fn test_parse_location_four_fields() {
        let room = parse_location("1234", "Αρχαίος Ελαιώνας.Δ.Πρώτος.108")
            .expect("Should parse 4-field location");

        assert_eq!(room.id, "1234");
        assert_eq!(room.campus, "Αρχαίος Ελαιώνας");
        assert_eq!(room.building, "Δ");
        assert_eq!(room.floor, "Πρώτος όροφος");
        assert_eq!(room.code, "108");
    }

    #[test]
    fn test_parse_location_five_fields() {
        let room = parse_location(
            "77",
            "Αρχαίος Ελαιώνας.ΣΑ.Ισόγειο.1.Συνεδριακό κέντρο/Κεντρικό αμφιθέατρο",
        )
        .expect("Should parse 5-field location");

        assert_eq!(room.floor, "Ισόγειο");
        assert_eq!(room.code, "1.Συνεδριακό κέντρο/Κεντρικό αμφιθέατρο");
    }

    #[test]
    fn test_parse_location_rejects_other_field_counts() {
        for location in ["Αρχαίος Ελαιώνας.Δ.Πρώτος", "a.b.c.d.e.f", ""] {
            let err = parse_location("1", location).expect_err("Should reject location");
            assert_eq!(err.location, location);
            assert_eq!(err.fields, location.split('.').count());
        }
    }

    #[test]
    fn test_normalize_floor() {
        assert_eq!(normalize_floor("Ισόγειο"), "Ισόγειο");
        assert_eq!(normalize_floor("Δεύτερος"), "Δεύτερος όροφος");
        assert_eq!(normalize_floor("ισόγειο"), "ισόγειο όροφος");
    }

    #[test]
    fn test_parse_classroom_list_skips_malformed_rows() {
        let html = fs::read_to_string("fixtures/classroom_list.html")
            .expect("Failed to read fixture");

        let listing = parse_classroom_list(&html).expect("Failed to parse classroom list");

        assert_eq!(listing.classrooms.len(), 2);
        assert_eq!(listing.malformed.len(), 1);
        assert_eq!(listing.malformed[0].fields, 3);
        assert_eq!(listing.initial_period_code, "58");

        let first = &listing.classrooms[0];
        assert_eq!(first.id, "1234");
        assert_eq!(first.code, "108");
        assert_eq!(first.floor, "Πρώτος όροφος");

        let second = &listing.classrooms[1];
        assert_eq!(second.id, "1301");
        assert_eq!(second.floor, "Ισόγειο");
        assert_eq!(second.code, "1.Συνεδριακό κέντρο/Κεντρικό αμφιθέατρο");
    }

    #[test]
    fn test_parse_classroom_list_without_rows() {
        let html = "<html><body><table><tr><td>nothing</td></tr></table></body></html>";
        let err = parse_classroom_list(html).expect_err("Should fail without rows");
        assert!(matches!(err, ParseError::MissingField(_)));
    }

    #[test]
    fn test_parse_classroom_list_skips_rows_without_link() {
        let html = r#"
            <table>
                <tr data-area="Αρχαίος Ελαιώνας.Δ.Πρώτος.108"><td>no link</td></tr>
                <tr data-area="Αρχαίος Ελαιώνας.Δ.Δεύτερος.201">
                    <td><span id="classroom_title"><a href="/areas/58/99">Δ201</a></span></td>
                </tr>
            </table>
        "#;

        let listing = parse_classroom_list(html).expect("Failed to parse");
        assert_eq!(listing.classrooms.len(), 1);
        assert_eq!(listing.classrooms[0].id, "99");
        assert!(listing.malformed.is_empty());
    }

    #[test]
    fn test_split_schedule_href() {
        assert_eq!(split_schedule_href("/areas/58/1234"), Some(("58", "1234")));
        assert_eq!(
            split_schedule_href("http://classschedule.uniwa.gr/areas/58/1234/"),
            Some(("58", "1234"))
        );
        assert_eq!(split_schedule_href("1234"), None);
    }

    #[test]
    fn test_parse_periods_from_fixture() {
        let html = fs::read_to_string("fixtures/classroom_schedule.html")
            .expect("Failed to read fixture");

        let periods = parse_periods(&html);

        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].id, "58");
        assert_eq!(periods[0].name, "Χειμερινό Εξάμηνο 2023-2024");
        assert!(!periods[0].is_exam());
        assert_eq!(periods[2].id, "61");
        assert!(periods[2].is_exam());
    }

    #[test]
    fn test_extract_events_array_from_fixture() {
        let html = fs::read_to_string("fixtures/classroom_schedule.html")
            .expect("Failed to read fixture");

        let json = extract_events_array(&html).expect("Should find events array");
        assert!(json.starts_with('['));
        assert!(json.ends_with(']'));

        let events = parse_events(&json).expect("Should parse events");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].course, "Δίκτυα Υπολογιστών KAI Επικοινωνίες");
        assert_eq!(events[0].area_id, "1234");
        assert_eq!(events[0].day, "1");
        assert!(!events[2].is_recurring());
    }

    #[test]
    fn test_extract_events_array_missing_script() {
        let html = "<html><head><script>var x = [1, 2];</script></head></html>";
        let err = extract_events_array(html).expect_err("Should fail without events script");
        assert!(matches!(err, ParseError::MissingEventsScript));
    }

    #[test]
    fn test_extract_events_array_missing_array() {
        let html = "<html><head><script>var events = null;</script></head></html>";
        let err = extract_events_array(html).expect_err("Should fail without array");
        assert!(matches!(err, ParseError::MissingEventsArray));
    }

    #[test]
    fn test_parse_events_malformed_json() {
        let err = parse_events(r#"[{"department_name": "CS",]"#).expect_err("Should fail");
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_parse_events_sample() {
        let events = parse_events(SAMPLE_EVENTS).expect("Should parse sample");

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.department, "CS");
        assert_eq!(event.period_name, "2024");
        assert_eq!(event.day, "Mon");
        assert_eq!(event.time_start, "09:00");
        assert_eq!(event.time_end, "11:00");
        assert_eq!(event.course, "X KAI Y");
        assert_eq!(event.professor.as_deref(), Some("P"));
        assert_eq!(event.area_id, "A1");
        assert_eq!(event.start_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert!(event.is_recurring());
    }

    #[test]
    fn test_parse_events_skips_entries_missing_fields() {
        let json = r#"[
            {"department_name": "CS", "academic_period_name": "2024"},
            {"department_name":"CS","academic_period_name":"2024","day_of_week":2,"starting_hour":"13:00:00","ending_hour":"15:00:00","event_data":{"course_name":"Z","professor":null},"area_id":42,"academic_period_valid_to":null,"endRecur":null,"startRecur":"2024-02-01T00:00:00"}
        ]"#;

        let events = parse_events(json).expect("Should parse valid entries");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].day, "2");
        assert_eq!(events[0].area_id, "42");
        assert!(events[0].professor.is_none());
        assert_eq!(events[0].start_date, NaiveDate::from_ymd_opt(2024, 2, 1));
    }

    #[test]
    fn test_sanitize_course_name() {
        let cases = [
            ("X &amp;amp; Y", "X KAI Y"),
            ("X &amp;amp;amp; Y", "X KAI Y"),
            ("X &amp; Y", "X KAI Y"),
            ("X amp; Y", "X KAI Y"),
            ("Plain course", "Plain course"),
            ("A &amp; B &amp;amp; C", "A KAI B KAI C"),
        ];

        for (input, expected) in cases {
            let once = sanitize_course_name(input);
            assert_eq!(once, expected, "sanitizing '{}'", input);
            assert_eq!(sanitize_course_name(&once), once, "idempotence of '{}'", input);
            assert!(!once.contains("amp;"));
        }
    }

    #[test]
    fn test_strip_seconds() {
        assert_eq!(strip_seconds("09:00:00"), "09:00");
        assert_eq!(strip_seconds("18:45:30"), "18:45");
        assert_eq!(strip_seconds("09:00"), "09:00");
        assert_eq!(strip_seconds(" 7:15:00 "), "7:15");
    }

    #[test]
    fn test_parse_start_date() {
        assert_eq!(
            parse_start_date("2024-02-01 00:00:00"),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(
            parse_start_date("2024-06-14"),
            NaiveDate::from_ymd_opt(2024, 6, 14)
        );
        assert_eq!(parse_start_date("soon"), None);
    }
}

use std::fmt::Display;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Floor literal the site uses for the ground floor. Kept verbatim.
pub const GROUND_FLOOR: &str = "Ισόγειο";
/// Qualifier appended to every other floor name.
pub const FLOOR_QUALIFIER: &str = "όροφος";
/// Substring marking an academic period as an examination session.
pub const EXAM_PERIOD_MARKER: &str = "Εξεταστική";
/// Replacement for the garbled `&amp;` encodings found in course names.
pub const CONJUNCTION: &str = "KAI";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: String,
    pub campus: String,
    pub building: String,
    pub floor: String,
    pub code: String,
}

impl Display for Classroom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} ({}, {}) [{}]",
            self.building, self.code, self.floor, self.campus, self.id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: String,
    pub name: String,
}

impl Period {
    pub fn is_exam(&self) -> bool {
        self.name.contains(EXAM_PERIOD_MARKER)
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.id)?;
        if self.is_exam() {
            write!(f, " (exams)")?;
        }
        Ok(())
    }
}

/// A single calendar entry as published for one (period, classroom) page,
/// after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub department: String,
    pub period_name: String,
    pub day: String,
    pub time_start: String,
    pub time_end: String,
    pub course: String,
    pub professor: Option<String>,
    pub area_id: String,
    pub valid_to: Option<String>,
    pub recurrence_end: Option<String>,
    pub start_date: Option<NaiveDate>,
}

impl Event {
    /// Regular timetable entries recur until the period closes. One-off
    /// bookings end earlier.
    pub fn is_recurring(&self) -> bool {
        self.valid_to == self.recurrence_end
    }

    pub fn to_session(&self) -> ClassSession {
        ClassSession {
            day: self.day.clone(),
            time_start: self.time_start.clone(),
            time_end: self.time_end.clone(),
            course: self.course.clone(),
            professor: self.professor.clone(),
            area_id: self.area_id.clone(),
        }
    }

    pub fn to_exam_slot(&self) -> Option<ExamSlot> {
        Some(ExamSlot {
            date: self.start_date?,
            time_start: self.time_start.clone(),
            time_end: self.time_end.clone(),
            area_id: vec![self.area_id.clone()],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    pub day: String,
    pub time_start: String,
    pub time_end: String,
    pub course: String,
    pub professor: Option<String>,
    pub area_id: String,
}

impl Display for ClassSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}-{} {} @ {}",
            self.day, self.time_start, self.time_end, self.course, self.area_id
        )?;
        if let Some(professor) = &self.professor {
            write!(f, " ({})", professor)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSlot {
    pub date: NaiveDate,
    pub time_start: String,
    pub time_end: String,
    pub area_id: Vec<String>,
}

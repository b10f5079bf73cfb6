use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{ClassSession, Event, ExamSlot};

/// Everything one department publishes for one academic period.
///
/// Teaching periods keep every session in arrival order. Exam periods are
/// keyed by course and collect every room hosting the exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodSchedule {
    Sessions(Vec<ClassSession>),
    Exams(IndexMap<String, ExamSlot>),
}

impl PeriodSchedule {
    fn empty(is_exam: bool) -> Self {
        if is_exam {
            PeriodSchedule::Exams(IndexMap::new())
        } else {
            PeriodSchedule::Sessions(Vec::new())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PeriodSchedule::Sessions(sessions) => sessions.len(),
            PeriodSchedule::Exams(exams) => exams.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Added,
    /// Exam already known for this course; its room was merged in.
    Merged,
    /// One-off booking inside a teaching period.
    SkippedIncidental,
    /// Exam without a parseable start date.
    SkippedNoDate,
    /// The period already holds the other kind of schedule.
    SkippedShapeMismatch,
}

/// Department name -> period name -> schedule, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Departments {
    inner: IndexMap<String, IndexMap<String, PeriodSchedule>>,
}

impl Departments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: &Event, is_exam: bool) -> Outcome {
        if !is_exam && !event.is_recurring() {
            return Outcome::SkippedIncidental;
        }

        let exam_slot = if is_exam {
            let Some(slot) = event.to_exam_slot() else {
                log::warn!(
                    "Skipping exam '{}' in area {}: no start date",
                    event.course,
                    event.area_id
                );
                return Outcome::SkippedNoDate;
            };
            Some(slot)
        } else {
            None
        };

        let schedule = self
            .inner
            .entry(event.department.clone())
            .or_default()
            .entry(event.period_name.clone())
            .or_insert_with(|| PeriodSchedule::empty(is_exam));

        let outcome = match (schedule, exam_slot) {
            (PeriodSchedule::Sessions(sessions), None) => {
                sessions.push(event.to_session());
                Outcome::Added
            }
            (PeriodSchedule::Exams(exams), Some(slot)) => match exams.get_mut(&event.course) {
                Some(existing) => {
                    if !existing.area_id.contains(&event.area_id) {
                        existing.area_id.push(event.area_id.clone());
                    }
                    Outcome::Merged
                }
                None => {
                    exams.insert(event.course.clone(), slot);
                    Outcome::Added
                }
            },
            _ => {
                log::warn!(
                    "Skipping '{}': period '{}' of '{}' already holds a different schedule kind",
                    event.course,
                    event.period_name,
                    event.department
                );
                return Outcome::SkippedShapeMismatch;
            }
        };

        log::debug!("Added: {}", event.course);
        outcome
    }

    pub fn get(&self, department: &str) -> Option<&IndexMap<String, PeriodSchedule>> {
        self.inner.get(department)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexMap<String, PeriodSchedule>)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> ScheduleStats {
        ScheduleStats {
            departments: self
                .inner
                .iter()
                .map(|(name, periods)| DepartmentStats {
                    name: name.clone(),
                    periods: periods
                        .iter()
                        .map(|(period, schedule)| (period.clone(), schedule.len()))
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct DepartmentStats {
    pub name: String,
    pub periods: Vec<(String, usize)>,
}

#[derive(Debug)]
pub struct ScheduleStats {
    pub departments: Vec<DepartmentStats>,
}

impl ScheduleStats {
    pub fn total(&self) -> usize {
        self.departments
            .iter()
            .flat_map(|d| &d.periods)
            .map(|(_, count)| count)
            .sum()
    }
}

impl Display for ScheduleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for department in &self.departments {
            writeln!(f, "{}", department.name)?;
            for (period, count) in &department.periods {
                writeln!(f, "\t{}: {}", count, period)?;
            }
        }
        Ok(())
    }
}

use crate::model::Weekday;
use chrono::{NaiveTime, Timelike};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

pub const DEFAULT_STYLE: &str = "subject-default";
pub const EMPTY_STYLE: &str = "subject-empty";

const BUILTIN_STYLES: [(&str, &str); 10] = [
    ("matematica", "subject-math"),
    ("engleza", "subject-english"),
    ("romana", "subject-romana"),
    ("stiinte", "subject-science"),
    ("istorie", "subject-history"),
    ("fizica", "subject-physics"),
    ("chimie", "subject-chemistry"),
    ("biologie", "subject-biology"),
    ("educatie fizica", "subject-pe"),
    ("informatica", "subject-informatica"),
];

/// A schedule entry already resolved to display names.
#[derive(Debug, Clone)]
pub struct ScheduleSlot {
    pub id: i64,
    pub day: Weekday,
    pub start_time: NaiveTime,
    pub subject: String,
    pub teacher: String,
}

/// Subject name -> style tag, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct StyleMap {
    styles: HashMap<String, String>,
}

impl Default for StyleMap {
    fn default() -> Self {
        Self {
            styles: BUILTIN_STYLES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl StyleMap {
    /// Builtin table extended with `overrides` (`{"subject": "style"}`).
    /// Non-string values are ignored.
    pub fn with_overrides(overrides: Option<&serde_json::Value>) -> Self {
        let mut map = Self::default();
        if let Some(obj) = overrides.and_then(|v| v.as_object()) {
            for (k, v) in obj {
                if let Some(style) = v.as_str() {
                    map.styles
                        .insert(k.trim().to_lowercase(), style.to_string());
                }
            }
        }
        map
    }

    pub fn style_for(&self, subject: &str) -> &str {
        self.styles
            .get(&subject.trim().to_lowercase())
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_STYLE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub subject: String,
    pub teacher: String,
    pub style: String,
    pub empty: bool,
}

impl Cell {
    fn empty() -> Self {
        Self {
            subject: "-".to_string(),
            teacher: String::new(),
            style: EMPTY_STYLE.to_string(),
            empty: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Row {
    pub time: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timetable {
    pub days: Vec<&'static str>,
    pub rows: Vec<Row>,
}

impl Timetable {
    pub fn empty() -> Self {
        Self {
            days: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).sum()
    }
}

pub fn slot_label(start: NaiveTime) -> String {
    let hour = start.hour();
    format!("{:02}:00 - {:02}:00", hour, hour + 1)
}

/// Builds the Monday–Friday grid. Rows are the distinct start times present in
/// `entries`, ascending; every (slot, day) pair yields exactly one cell. When
/// two entries share a cell the lower id wins. Weekend entries never show.
pub fn build(entries: &[ScheduleSlot], styles: &StyleMap) -> Timetable {
    let mut ordered: Vec<&ScheduleSlot> = entries.iter().collect();
    ordered.sort_by_key(|e| e.id);

    let slots: BTreeSet<NaiveTime> = ordered
        .iter()
        .filter(|e| e.day.is_school_day())
        .map(|e| e.start_time)
        .collect();

    let mut by_cell: HashMap<(Weekday, NaiveTime), &ScheduleSlot> = HashMap::new();
    for e in &ordered {
        by_cell.entry((e.day, e.start_time)).or_insert(*e);
    }

    let rows = slots
        .into_iter()
        .map(|slot| Row {
            time: slot_label(slot),
            cells: Weekday::SCHOOL_DAYS
                .iter()
                .map(|day| match by_cell.get(&(*day, slot)) {
                    Some(e) => Cell {
                        subject: e.subject.clone(),
                        teacher: e.teacher.clone(),
                        style: styles.style_for(&e.subject).to_string(),
                        empty: false,
                    },
                    None => Cell::empty(),
                })
                .collect(),
        })
        .collect();

    Timetable {
        days: Weekday::SCHOOL_DAYS.iter().map(|d| d.label_ro()).collect(),
        rows,
    }
}

//! Student report pages. Every page is best-effort: rows that cannot be
//! resolved are dropped and counted, and a failure of the page as a whole
//! yields its empty state plus an error flash instead of an error response.

use crate::auth::Session;
use crate::calc::{self, ClassRank, Week};
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, now_from, require_role};
use crate::ipc::types::{AppState, Flash, Outcome, Request};
use crate::model::{self, Role, Weekday};
use crate::records::{self, StudentRow};
use crate::timetable::{self, StyleMap, Timetable};
use chrono::{Datelike, Duration, NaiveDateTime};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Grades,
    Timetable,
    Calendar,
    Attendance,
}

impl Page {
    pub fn view(self) -> &'static str {
        match self {
            Page::Dashboard => "student_main",
            Page::Grades => "student_grades",
            Page::Timetable => "student_timetable",
            Page::Calendar => "student_calendar",
            Page::Attendance => "student_attendance",
        }
    }

    fn from_method(method: &str) -> Option<Self> {
        match method {
            "student.dashboard" => Some(Page::Dashboard),
            "student.grades" => Some(Page::Grades),
            "student.timetable" => Some(Page::Timetable),
            "student.calendar" => Some(Page::Calendar),
            "student.attendance" => Some(Page::Attendance),
            _ => None,
        }
    }

    fn empty_context(self, now: NaiveDateTime) -> serde_json::Value {
        match self {
            Page::Dashboard => json!({
                "student": null,
                "currentDate": now.format("%B %d, %Y").to_string(),
                "currentTime": now.format("%H:%M").to_string(),
                "currentDay": Weekday::of(now.date()).as_str(),
                "classesToday": 0,
                "todaysClasses": [],
                "upcomingExamsCount": 0,
                "averageGrade": 0.0,
                "rank": null,
                "totalRanked": 0,
                "bestSubject": { "name": "N/A", "average": 0.0 },
                "classesThisWeek": 0,
                "examsThisWeek": 0,
                "gradesThisWeek": 0,
                "absencesThisWeek": 0,
                "attendanceThisWeek": 100,
                "skipped": { "grades": 0, "schedule": 0 },
            }),
            Page::Grades => json!({ "student": null, "subjects": [], "skipped": 0 }),
            Page::Timetable => json!({
                "student": null,
                "cellCount": 0,
                "days": [],
                "rows": [],
                "skipped": 0,
            }),
            Page::Calendar => json!({ "student": null, "exams": [] }),
            Page::Attendance => json!({
                "student": null,
                "absences": [],
                "totalAbsences": 0,
                "monthlyAbsences": 0,
                "mostMissedSubject": null,
            }),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Page::Dashboard => "dashboard",
            Page::Grades => "grades",
            Page::Timetable => "timetable",
            Page::Calendar => "calendar",
            Page::Attendance => "attendance",
        }
    }
}

fn student_profile(conn: &Connection, session: &Session) -> Result<StudentRow, HandlerErr> {
    records::student_for_account(conn, session.account_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "No student profile for this account."))
}

fn student_json(student: &StudentRow) -> serde_json::Value {
    json!({
        "id": student.id,
        "name": student.display_name(),
        "firstName": student.first_name,
        "classroomId": student.classroom_id,
    })
}

/// Resolves schedule rows to slots, counting rows whose day or time no longer
/// parses.
fn schedule_slots(
    conn: &Connection,
    classroom_id: i64,
) -> Result<calc::Collected<Vec<timetable::ScheduleSlot>>, HandlerErr> {
    let rows = records::schedule_for_classroom(conn, classroom_id)?;
    let mut skipped = 0usize;
    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        match row.to_slot() {
            Some(slot) => items.push(slot),
            None => {
                log::warn!(
                    "schedule entry {} has unreadable day/time ({} {})",
                    row.id,
                    row.day_of_week,
                    row.start_time
                );
                skipped += 1;
            }
        }
    }
    Ok(calc::Collected { items, skipped })
}

fn dashboard(
    conn: &Connection,
    session: &Session,
    now: NaiveDateTime,
) -> Result<Outcome, HandlerErr> {
    let student = student_profile(conn, session)?;
    let today = now.date();
    let week = Week::containing(today);
    let in_week = |d: Option<chrono::NaiveDate>| d.map(|d| week.contains(d)).unwrap_or(false);

    let grades = records::grades_for_student(conn, student.id)?;
    let values: Vec<i64> = grades.iter().map(|g| g.value).collect();
    let average = calc::mean(&values);
    let best = calc::best_subject(&grades);
    if best.skipped > 0 {
        log::warn!(
            "student {}: {} grade(s) without a subject left out of per-subject results",
            student.id,
            best.skipped
        );
    }
    let grades_this_week = grades.iter().filter(|g| in_week(g.date)).count();

    let absences = records::absences_for_student(conn, student.id)?;
    let absences_this_week = absences.iter().filter(|a| in_week(a.date)).count();

    let mut todays_classes = Vec::new();
    let mut classes_this_week = 0usize;
    let mut upcoming_exams = 0usize;
    let mut exams_this_week = 0usize;
    let mut schedule_skipped = 0usize;
    let mut rank = ClassRank {
        rank: None,
        total_ranked: 0,
    };

    if let Some(classroom_id) = student.classroom_id {
        let slots = schedule_slots(conn, classroom_id)?;
        schedule_skipped = slots.skipped;
        let today_day = Weekday::of(today);
        let mut todays: Vec<&timetable::ScheduleSlot> =
            slots.items.iter().filter(|s| s.day == today_day).collect();
        todays.sort_by_key(|s| (s.start_time, s.id));
        todays_classes = todays
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "subject": s.subject,
                    "teacher": s.teacher,
                    "startTime": model::format_time(s.start_time),
                })
            })
            .collect();
        classes_this_week = slots.items.iter().filter(|s| s.day.is_school_day()).count();

        let horizon = today + Duration::days(7);
        for exam in records::exams_for_classroom(conn, classroom_id)? {
            let Some(date) = exam.date else { continue };
            if date >= today && date <= horizon {
                upcoming_exams += 1;
            }
            if week.contains(date) {
                exams_this_week += 1;
            }
        }

        let classmates = records::grade_values_by_student(conn, classroom_id)?;
        rank = calc::class_rank(&classmates, student.id);
    }

    let attendance = calc::weekly_attendance_rate(
        classes_this_week,
        week.days_elapsed(today),
        absences_this_week,
    );
    let best_subject = best
        .items
        .map(|b| json!(b))
        .unwrap_or_else(|| json!({ "name": "N/A", "average": 0.0 }));

    Ok(Outcome::new(json!({
        "student": student_json(&student),
        "currentDate": now.format("%B %d, %Y").to_string(),
        "currentTime": now.format("%H:%M").to_string(),
        "currentDay": Weekday::of(today).as_str(),
        "classesToday": todays_classes.len(),
        "todaysClasses": todays_classes,
        "upcomingExamsCount": upcoming_exams,
        "averageGrade": average,
        "rank": rank.rank,
        "totalRanked": rank.total_ranked,
        "bestSubject": best_subject,
        "classesThisWeek": classes_this_week,
        "examsThisWeek": exams_this_week,
        "gradesThisWeek": grades_this_week,
        "absencesThisWeek": absences_this_week,
        "attendanceThisWeek": attendance,
        "skipped": { "grades": best.skipped, "schedule": schedule_skipped },
    })))
}

fn grades(conn: &Connection, session: &Session) -> Result<Outcome, HandlerErr> {
    let student = student_profile(conn, session)?;
    let grades = records::grades_for_student(conn, student.id)?;
    let groups = calc::group_by_subject(&grades);

    let subjects: Vec<serde_json::Value> = groups
        .items
        .iter()
        .map(|group| {
            let teacher = match records::first_teacher_for_subject(conn, group.subject.id) {
                Ok(name) => name,
                Err(e) => {
                    log::warn!("teacher lookup for subject {} failed: {}", group.subject.id, e);
                    None
                }
            };
            json!({
                "id": group.subject.id,
                "name": group.subject.name,
                "code": format!("SUB{}", group.subject.id),
                "teacher": teacher.unwrap_or_else(|| "N/A".to_string()),
                "average": group.average(),
                "grades": group.grades.iter().map(|g| json!({
                    "id": g.grade_id,
                    "grade": g.value,
                    "type": g.evaluation_type,
                    "date": g.date.map(model::format_date),
                    "examId": g.exam_id,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    Ok(Outcome::new(json!({
        "student": student_json(&student),
        "subjects": subjects,
        "skipped": groups.skipped,
    })))
}

fn style_map(conn: &Connection) -> StyleMap {
    match db::settings_get_json(conn, "timetable.styles") {
        Ok(v) => StyleMap::with_overrides(v.as_ref()),
        Err(e) => {
            log::warn!("ignoring timetable.styles setting: {e:#}");
            StyleMap::default()
        }
    }
}

fn timetable_page(conn: &Connection, session: &Session) -> Result<Outcome, HandlerErr> {
    let student = student_profile(conn, session)?;
    let Some(classroom_id) = student.classroom_id else {
        let empty = Timetable::empty();
        return Ok(Outcome::new(json!({
            "student": student_json(&student),
            "cellCount": 0,
            "days": empty.days,
            "rows": empty.rows,
            "skipped": 0,
        }))
        .with_flash(Flash::error("You are not assigned to a classroom.")));
    };
    let slots = schedule_slots(conn, classroom_id)?;
    let grid = timetable::build(&slots.items, &style_map(conn));
    Ok(Outcome::new(json!({
        "student": student_json(&student),
        "cellCount": grid.cell_count(),
        "days": grid.days,
        "rows": grid.rows,
        "skipped": slots.skipped,
    })))
}

fn calendar(conn: &Connection, session: &Session) -> Result<Outcome, HandlerErr> {
    let student = student_profile(conn, session)?;
    let exams = match student.classroom_id {
        Some(cid) => records::exams_for_classroom(conn, cid)?,
        None => Vec::new(),
    };
    Ok(Outcome::new(json!({
        "student": student_json(&student),
        "exams": exams.iter().map(|e| e.to_json()).collect::<Vec<_>>(),
    })))
}

fn attendance(
    conn: &Connection,
    session: &Session,
    now: NaiveDateTime,
) -> Result<Outcome, HandlerErr> {
    let student = student_profile(conn, session)?;
    let absences = records::absences_for_student(conn, student.id)?;
    let today = now.date();
    let monthly = absences
        .iter()
        .filter(|a| {
            a.date
                .map(|d| d.year() == today.year() && d.month() == today.month())
                .unwrap_or(false)
        })
        .count();

    // most missed: highest count, first seen wins a tie
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for a in &absences {
        let Some(name) = a.subject_name.as_deref() else { continue };
        let c = counts.entry(name).or_insert(0);
        if *c == 0 {
            order.push(name);
        }
        *c += 1;
    }
    let mut most_missed: Option<(&str, usize)> = None;
    for name in order {
        let c = counts[name];
        if most_missed.map(|(_, best)| c > best).unwrap_or(true) {
            most_missed = Some((name, c));
        }
    }

    Ok(Outcome::new(json!({
        "student": student_json(&student),
        "absences": absences.iter().map(|a| a.to_json()).collect::<Vec<_>>(),
        "totalAbsences": absences.len(),
        "monthlyAbsences": monthly,
        "mostMissedSubject": most_missed.map(|(name, _)| name),
    })))
}

/// Builds a student page for an already role-checked session. Never fails:
/// a broken page degrades to its empty state with an error flash.
pub fn render(conn: &Connection, session: &Session, page: Page, now: NaiveDateTime) -> Outcome {
    let built = match page {
        Page::Dashboard => dashboard(conn, session, now),
        Page::Grades => grades(conn, session),
        Page::Timetable => timetable_page(conn, session),
        Page::Calendar => calendar(conn, session),
        Page::Attendance => attendance(conn, session, now),
    };
    match built {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("student {} page failed: {}", page.label(), e.message);
            Outcome::new(page.empty_context(now)).with_flash(Flash::error(format!(
                "Error loading {}: {}",
                page.label(),
                e.message
            )))
        }
    }
}

fn handle_page(
    state: &AppState,
    req: &Request,
    page: Page,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_role(conn, &req.params, Role::Student)?;
    let now = now_from(&req.params)?;
    Ok(render(conn, &session, page, now).into_result())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let page = Page::from_method(req.method.as_str())?;
    Some(match handle_page(state, req, page) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

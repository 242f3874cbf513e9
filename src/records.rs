//! Read queries shared by the report and catalog handlers.
//!
//! Dates and times are stored as text. Rows whose date cannot be parsed keep
//! `None` in that field instead of failing the whole query.

use crate::calc::{GradeRecord, SubjectRef};
use crate::model::{self, Weekday};
use crate::timetable::ScheduleSlot;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: i64,
    pub account_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub fathers_initial: String,
    pub classroom_id: Option<i64>,
}

impl StudentRow {
    pub fn display_name(&self) -> String {
        if self.fathers_initial.is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            format!(
                "{} {} {}",
                self.first_name, self.fathers_initial, self.last_name
            )
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRow {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomRow {
    pub id: i64,
    pub number: String,
    pub letter: String,
    pub school_id: i64,
    pub form_teacher_id: Option<i64>,
}

impl ClassroomRow {
    pub fn name(&self) -> String {
        format!("{}{}", self.number, self.letter)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ScheduleRow {
    pub id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub subject_name: String,
    pub teacher_name: String,
}

impl ScheduleRow {
    pub fn weekday(&self) -> Option<Weekday> {
        Weekday::parse(&self.day_of_week)
    }

    /// `None` when the stored day or time no longer parses.
    pub fn to_slot(&self) -> Option<ScheduleSlot> {
        Some(ScheduleSlot {
            id: self.id,
            day: self.weekday()?,
            start_time: model::parse_time(&self.start_time)?,
            subject: self.subject_name.clone(),
            teacher: self.teacher_name.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExamRow {
    pub id: i64,
    pub exam_type: String,
    pub date: Option<NaiveDate>,
    pub teacher_id: i64,
    pub teacher_name: String,
    pub subject_id: i64,
    pub subject_name: String,
    pub classroom_id: i64,
    pub file_path: Option<String>,
}

impl ExamRow {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "type": self.exam_type,
            "date": self.date.map(model::format_date),
            "teacherId": self.teacher_id,
            "teacher": self.teacher_name,
            "subjectId": self.subject_id,
            "subject": self.subject_name,
            "classroomId": self.classroom_id,
            "file": self.file_path,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AbsenceRow {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub subject_id: Option<i64>,
    pub subject_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub teacher_name: Option<String>,
    pub note: String,
}

impl AbsenceRow {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "studentId": self.student_id,
            "student": self.student_name,
            "subjectId": self.subject_id,
            "subject": self.subject_name,
            "date": self.date.map(model::format_date),
            "time": self.time.map(model::format_time),
            "teacher": self.teacher_name,
            "note": self.note,
        })
    }
}

/// A grade as seen from the teacher catalog: already attached to both a
/// student and a subject.
#[derive(Debug, Clone)]
pub struct CatalogGrade {
    pub student_id: i64,
    pub subject_id: i64,
    pub grade_id: i64,
    pub value: i64,
    pub evaluation_type: String,
    pub date: Option<NaiveDate>,
    pub exam_id: Option<i64>,
}

fn opt_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.as_deref().and_then(model::parse_date)
}

const STUDENT_COLUMNS: &str =
    "sp.id, sp.account_id, a.first_name, a.last_name, sp.fathers_initial, sp.classroom_id";

fn map_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        account_id: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        fathers_initial: r.get(4)?,
        classroom_id: r.get(5)?,
    })
}

pub fn student_for_account(
    conn: &Connection,
    account_id: i64,
) -> rusqlite::Result<Option<StudentRow>> {
    conn.query_row(
        &format!(
            "SELECT {STUDENT_COLUMNS}
             FROM student_profiles sp JOIN accounts a ON a.id = sp.account_id
             WHERE sp.account_id = ?"
        ),
        [account_id],
        map_student,
    )
    .optional()
}

pub fn student_by_id(conn: &Connection, student_id: i64) -> rusqlite::Result<Option<StudentRow>> {
    conn.query_row(
        &format!(
            "SELECT {STUDENT_COLUMNS}
             FROM student_profiles sp JOIN accounts a ON a.id = sp.account_id
             WHERE sp.id = ?"
        ),
        [student_id],
        map_student,
    )
    .optional()
}

pub fn students_in_classroom(
    conn: &Connection,
    classroom_id: i64,
) -> rusqlite::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS}
         FROM student_profiles sp JOIN accounts a ON a.id = sp.account_id
         WHERE sp.classroom_id = ?
         ORDER BY sp.id"
    ))?;
    let rows = stmt
        .query_map([classroom_id], map_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn teacher_for_account(
    conn: &Connection,
    account_id: i64,
) -> rusqlite::Result<Option<TeacherRow>> {
    conn.query_row(
        "SELECT tp.id, tp.account_id, a.first_name || ' ' || a.last_name
         FROM teacher_profiles tp JOIN accounts a ON a.id = tp.account_id
         WHERE tp.account_id = ?",
        [account_id],
        |r| {
            Ok(TeacherRow {
                id: r.get(0)?,
                account_id: r.get(1)?,
                name: r.get(2)?,
            })
        },
    )
    .optional()
}

pub fn classroom_by_id(
    conn: &Connection,
    classroom_id: i64,
) -> rusqlite::Result<Option<ClassroomRow>> {
    conn.query_row(
        "SELECT id, number, letter, school_id, form_teacher_id FROM classrooms WHERE id = ?",
        [classroom_id],
        |r| {
            Ok(ClassroomRow {
                id: r.get(0)?,
                number: r.get(1)?,
                letter: r.get(2)?,
                school_id: r.get(3)?,
                form_teacher_id: r.get(4)?,
            })
        },
    )
    .optional()
}

/// Classrooms where the teacher holds at least one schedule entry.
pub fn classrooms_for_teacher(
    conn: &Connection,
    teacher_id: i64,
) -> rusqlite::Result<Vec<ClassroomRow>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT c.id, c.number, c.letter, c.school_id, c.form_teacher_id
         FROM classrooms c
         JOIN schedule_entries se ON se.classroom_id = c.id
         WHERE se.teacher_id = ?
         ORDER BY CAST(c.number AS INTEGER), c.number, c.letter, c.id",
    )?;
    let rows = stmt
        .query_map([teacher_id], |r| {
            Ok(ClassroomRow {
                id: r.get(0)?,
                number: r.get(1)?,
                letter: r.get(2)?,
                school_id: r.get(3)?,
                form_teacher_id: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn subject_by_id(conn: &Connection, subject_id: i64) -> rusqlite::Result<Option<SubjectRow>> {
    conn.query_row(
        "SELECT id, name FROM subjects WHERE id = ?",
        [subject_id],
        |r| {
            Ok(SubjectRow {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        },
    )
    .optional()
}

/// The teacher's authorized subject set.
pub fn teacher_subjects(conn: &Connection, teacher_id: i64) -> rusqlite::Result<Vec<SubjectRow>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name
         FROM teacher_subjects ts JOIN subjects s ON s.id = ts.subject_id
         WHERE ts.teacher_id = ?
         ORDER BY s.id",
    )?;
    let rows = stmt
        .query_map([teacher_id], |r| {
            Ok(SubjectRow {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn teacher_teaches(
    conn: &Connection,
    teacher_id: i64,
    subject_id: i64,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM teacher_subjects WHERE teacher_id = ? AND subject_id = ?",
        (teacher_id, subject_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

/// First teacher (by id) authorized for the subject.
pub fn first_teacher_for_subject(
    conn: &Connection,
    subject_id: i64,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT a.first_name || ' ' || a.last_name
         FROM teacher_subjects ts
         JOIN teacher_profiles tp ON tp.id = ts.teacher_id
         JOIN accounts a ON a.id = tp.account_id
         WHERE ts.subject_id = ?
         ORDER BY tp.id
         LIMIT 1",
        [subject_id],
        |r| r.get(0),
    )
    .optional()
}

pub fn schedule_for_classroom(
    conn: &Connection,
    classroom_id: i64,
) -> rusqlite::Result<Vec<ScheduleRow>> {
    let mut stmt = conn.prepare(
        "SELECT se.id, se.day_of_week, se.start_time, s.name,
                a.first_name || ' ' || a.last_name
         FROM schedule_entries se
         JOIN subjects s ON s.id = se.subject_id
         JOIN teacher_profiles tp ON tp.id = se.teacher_id
         JOIN accounts a ON a.id = tp.account_id
         WHERE se.classroom_id = ?
         ORDER BY se.start_time, se.id",
    )?;
    let rows = stmt
        .query_map([classroom_id], |r| {
            Ok(ScheduleRow {
                id: r.get(0)?,
                day_of_week: r.get(1)?,
                start_time: r.get(2)?,
                subject_name: r.get(3)?,
                teacher_name: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every grade attached to the student, in grade id order. The subject comes
/// from the oldest subject join; a grade without one keeps `subject: None`.
pub fn grades_for_student(
    conn: &Connection,
    student_id: i64,
) -> rusqlite::Result<Vec<GradeRecord>> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.grade, g.date, g.evaluation_type, g.exam_id, s.id, s.name
         FROM student_grades stg
         JOIN grades g ON g.id = stg.grade_id
         LEFT JOIN subjects s ON s.id = (
             SELECT sbg.subject_id FROM subject_grades sbg
             WHERE sbg.grade_id = g.id
             ORDER BY sbg.id
             LIMIT 1
         )
         WHERE stg.student_id = ?
         ORDER BY g.id",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            let subject_id: Option<i64> = r.get(5)?;
            let subject_name: Option<String> = r.get(6)?;
            Ok(GradeRecord {
                grade_id: r.get(0)?,
                value: r.get(1)?,
                date: opt_date(r.get(2)?),
                evaluation_type: r.get(3)?,
                exam_id: r.get(4)?,
                subject: subject_id
                    .zip(subject_name)
                    .map(|(id, name)| SubjectRef { id, name }),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Grade values per classmate, including classmates with none, ordered by
/// student id.
pub fn grade_values_by_student(
    conn: &Connection,
    classroom_id: i64,
) -> rusqlite::Result<Vec<(i64, Vec<i64>)>> {
    let mut stmt = conn.prepare(
        "SELECT sp.id, g.grade
         FROM student_profiles sp
         LEFT JOIN student_grades stg ON stg.student_id = sp.id
         LEFT JOIN grades g ON g.id = stg.grade_id
         WHERE sp.classroom_id = ?
         ORDER BY sp.id, g.id",
    )?;
    let mut rows = stmt.query([classroom_id])?;
    let mut out: Vec<(i64, Vec<i64>)> = Vec::new();
    while let Some(r) = rows.next()? {
        let sid: i64 = r.get(0)?;
        let value: Option<i64> = r.get(1)?;
        if out.last().map(|(id, _)| *id != sid).unwrap_or(true) {
            out.push((sid, Vec::new()));
        }
        if let (Some(v), Some((_, values))) = (value, out.last_mut()) {
            values.push(v);
        }
    }
    Ok(out)
}

/// Grades of a classroom that have both joins, in grade id order.
pub fn catalog_grades(conn: &Connection, classroom_id: i64) -> rusqlite::Result<Vec<CatalogGrade>> {
    let mut stmt = conn.prepare(
        "SELECT stg.student_id, sbg.subject_id, g.id, g.grade, g.evaluation_type, g.date, g.exam_id
         FROM grades g
         JOIN student_grades stg ON stg.grade_id = g.id
         JOIN subject_grades sbg ON sbg.grade_id = g.id
         JOIN student_profiles sp ON sp.id = stg.student_id
         WHERE sp.classroom_id = ?
         ORDER BY g.id",
    )?;
    let rows = stmt
        .query_map([classroom_id], |r| {
            Ok(CatalogGrade {
                student_id: r.get(0)?,
                subject_id: r.get(1)?,
                grade_id: r.get(2)?,
                value: r.get(3)?,
                evaluation_type: r.get(4)?,
                date: opt_date(r.get(5)?),
                exam_id: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const EXAM_SELECT: &str = "SELECT e.id, e.type, e.date, e.teacher_id,
                a.first_name || ' ' || a.last_name, e.subject_id, s.name, e.classroom_id,
                e.file_path
         FROM exams e
         JOIN subjects s ON s.id = e.subject_id
         JOIN teacher_profiles tp ON tp.id = e.teacher_id
         JOIN accounts a ON a.id = tp.account_id";

fn map_exam(r: &rusqlite::Row<'_>) -> rusqlite::Result<ExamRow> {
    Ok(ExamRow {
        id: r.get(0)?,
        exam_type: r.get(1)?,
        date: opt_date(r.get(2)?),
        teacher_id: r.get(3)?,
        teacher_name: r.get(4)?,
        subject_id: r.get(5)?,
        subject_name: r.get(6)?,
        classroom_id: r.get(7)?,
        file_path: r.get(8)?,
    })
}

/// Exams of a classroom, oldest first.
pub fn exams_for_classroom(conn: &Connection, classroom_id: i64) -> rusqlite::Result<Vec<ExamRow>> {
    let mut stmt = conn.prepare(&format!(
        "{EXAM_SELECT} WHERE e.classroom_id = ? ORDER BY e.date, e.id"
    ))?;
    let rows = stmt
        .query_map([classroom_id], map_exam)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Exams of a classroom within the teacher's subjects, newest first.
/// With `own_only` the list is further limited to exams the teacher created.
pub fn exams_for_teacher(
    conn: &Connection,
    classroom_id: i64,
    teacher_id: i64,
    own_only: bool,
) -> rusqlite::Result<Vec<ExamRow>> {
    let mut stmt = conn.prepare(&format!(
        "{EXAM_SELECT}
         WHERE e.classroom_id = ?1
           AND e.subject_id IN (SELECT subject_id FROM teacher_subjects WHERE teacher_id = ?2)
           AND (?3 = 0 OR e.teacher_id = ?2)
         ORDER BY e.date DESC, e.id DESC"
    ))?;
    let rows = stmt
        .query_map((classroom_id, teacher_id, own_only as i64), map_exam)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Type of an exam owned by `teacher_id`, if the exam exists and is theirs.
pub fn owned_exam_type(
    conn: &Connection,
    exam_id: i64,
    teacher_id: i64,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT type FROM exams WHERE id = ? AND teacher_id = ?",
        (exam_id, teacher_id),
        |r| r.get(0),
    )
    .optional()
}

const ABSENCE_SELECT: &str = "SELECT ab.id, ab.student_id, a.first_name || ' ' || a.last_name,
                ab.subject_id, s.name, ab.date, ab.time,
                CASE WHEN ta.id IS NULL THEN NULL ELSE ta.first_name || ' ' || ta.last_name END,
                ab.note
         FROM absences ab
         JOIN student_profiles sp ON sp.id = ab.student_id
         JOIN accounts a ON a.id = sp.account_id
         LEFT JOIN subjects s ON s.id = ab.subject_id
         LEFT JOIN teacher_profiles tp ON tp.id = ab.recorded_by
         LEFT JOIN accounts ta ON ta.id = tp.account_id";

fn map_absence(r: &rusqlite::Row<'_>) -> rusqlite::Result<AbsenceRow> {
    let time: Option<String> = r.get(6)?;
    Ok(AbsenceRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        student_name: r.get(2)?,
        subject_id: r.get(3)?,
        subject_name: r.get(4)?,
        date: opt_date(r.get(5)?),
        time: time.as_deref().and_then(model::parse_time),
        teacher_name: r.get(7)?,
        note: r.get(8)?,
    })
}

/// Newest date first, then by time of day.
pub fn absences_for_student(
    conn: &Connection,
    student_id: i64,
) -> rusqlite::Result<Vec<AbsenceRow>> {
    let mut stmt = conn.prepare(&format!(
        "{ABSENCE_SELECT} WHERE ab.student_id = ? ORDER BY ab.date DESC, ab.time ASC, ab.id"
    ))?;
    let rows = stmt
        .query_map([student_id], map_absence)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn absences_for_classroom(
    conn: &Connection,
    classroom_id: i64,
) -> rusqlite::Result<Vec<AbsenceRow>> {
    let mut stmt = conn.prepare(&format!(
        "{ABSENCE_SELECT} WHERE sp.classroom_id = ? ORDER BY ab.date DESC, ab.time ASC, ab.id"
    ))?;
    let rows = stmt
        .query_map([classroom_id], map_absence)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

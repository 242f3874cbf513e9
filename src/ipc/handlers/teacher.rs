use crate::auth::Session;
use crate::db;
use crate::ipc::error::{ok, HandlerErr, Rejection};
use crate::ipc::helpers::{db_conn, form_id, form_str, require_role, required_id, session_from};
use crate::ipc::types::{AppState, Flash, Outcome, Request};
use crate::model::{self, ExamType, Role, Weekday};
use crate::records::{self, CatalogGrade, ClassroomRow, TeacherRow};
use anyhow::{anyhow, Context};
use rusqlite::{Connection, ErrorCode};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

fn teacher_profile(conn: &Connection, session: &Session) -> Result<TeacherRow, HandlerErr> {
    records::teacher_for_account(conn, session.account_id)?
        .ok_or_else(|| HandlerErr::new("forbidden", "No teacher profile for this account."))
}

fn classroom(conn: &Connection, classroom_id: i64) -> Result<ClassroomRow, HandlerErr> {
    records::classroom_by_id(conn, classroom_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "Classroom not found."))
}

fn classroom_json(c: &ClassroomRow) -> serde_json::Value {
    json!({ "id": c.id, "name": c.name(), "schoolId": c.school_id })
}

fn exam_types_json() -> Vec<&'static str> {
    ExamType::ALL.iter().map(|t| t.as_str()).collect()
}

/// Classrooms the account teaches in. Only a session is required; an account
/// without a teacher profile simply sees no classrooms.
pub fn classrooms(conn: &Connection, session: &Session) -> Result<Outcome, HandlerErr> {
    let teacher = records::teacher_for_account(conn, session.account_id)?;
    let rooms = match &teacher {
        Some(t) => records::classrooms_for_teacher(conn, t.id)?,
        None => Vec::new(),
    };
    Ok(Outcome::new(json!({
        "teacher": teacher,
        "classrooms": rooms.iter().map(classroom_json).collect::<Vec<_>>(),
    })))
}

pub fn classroom_open(
    conn: &Connection,
    session: &Session,
    classroom_id: i64,
) -> Result<Outcome, HandlerErr> {
    let teacher = teacher_profile(conn, session)?;
    let room = classroom(conn, classroom_id)?;
    let students = records::students_in_classroom(conn, room.id)?;
    let subjects = records::teacher_subjects(conn, teacher.id)?;

    let mut by_cell: HashMap<(i64, i64), Vec<CatalogGrade>> = HashMap::new();
    for g in records::catalog_grades(conn, room.id)? {
        by_cell.entry((g.student_id, g.subject_id)).or_default().push(g);
    }

    let catalog: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            let cells: Vec<serde_json::Value> = subjects
                .iter()
                .map(|subj| {
                    let grades = by_cell
                        .get(&(s.id, subj.id))
                        .map(|gs| {
                            gs.iter()
                                .map(|g| {
                                    json!({
                                        "id": g.grade_id,
                                        "grade": g.value,
                                        "type": g.evaluation_type,
                                        "date": g.date.map(model::format_date),
                                        "examId": g.exam_id,
                                    })
                                })
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default();
                    json!({ "subject": subj, "grades": grades })
                })
                .collect();
            json!({
                "student": { "id": s.id, "name": s.display_name() },
                "subjects": cells,
            })
        })
        .collect();

    let absences = records::absences_for_classroom(conn, room.id)?;
    let exams = records::exams_for_teacher(conn, room.id, teacher.id, false)?;

    Ok(Outcome::new(json!({
        "teacher": teacher,
        "classroom": classroom_json(&room),
        "students": students
            .iter()
            .map(|s| json!({ "id": s.id, "name": s.display_name() }))
            .collect::<Vec<_>>(),
        "subjects": subjects,
        "catalog": catalog,
        "absences": absences.iter().map(|a| a.to_json()).collect::<Vec<_>>(),
        "exams": exams.iter().map(|e| e.to_json()).collect::<Vec<_>>(),
        "examTypes": exam_types_json(),
    })))
}

pub fn exams_list(
    conn: &Connection,
    session: &Session,
    classroom_id: i64,
) -> Result<Outcome, HandlerErr> {
    let teacher = teacher_profile(conn, session)?;
    let room = classroom(conn, classroom_id)?;
    let subjects = records::teacher_subjects(conn, teacher.id)?;
    let exams = records::exams_for_teacher(conn, room.id, teacher.id, true)?;
    Ok(Outcome::new(json!({
        "teacher": teacher,
        "classroom": classroom_json(&room),
        "subjects": subjects,
        "exams": exams.iter().map(|e| e.to_json()).collect::<Vec<_>>(),
        "examTypes": exam_types_json(),
    })))
}

fn require_field(form: &serde_json::Value, key: &'static str) -> Result<String, Rejection> {
    form_str(form, key).ok_or(Rejection::MissingField(key))
}

fn require_id_field(form: &serde_json::Value, key: &'static str) -> Result<i64, HandlerErr> {
    form_id(form, key)?.ok_or_else(|| Rejection::MissingField(key).into())
}

fn student_in_classroom(
    conn: &Connection,
    student_id: i64,
    classroom_id: i64,
) -> Result<(), HandlerErr> {
    let student = records::student_by_id(conn, student_id)?.ok_or(Rejection::UnknownStudent)?;
    if student.classroom_id != Some(classroom_id) {
        return Err(Rejection::StudentNotInClassroom.into());
    }
    Ok(())
}

fn is_check_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
            && f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
    )
}

/// Records a grade. Checks run in order and stop at the first failure; the
/// grade and both of its joins are written in one transaction.
pub fn add_grade(
    conn: &Connection,
    session: &Session,
    classroom_id: i64,
    form: &serde_json::Value,
) -> Result<Outcome, HandlerErr> {
    let teacher = teacher_profile(conn, session)?;
    let room = classroom(conn, classroom_id)?;

    let student_id = require_id_field(form, "student")?;
    let subject_id = require_id_field(form, "subject")?;
    let value: i64 = require_field(form, "grade")?
        .parse()
        .map_err(|_| Rejection::GradeNotANumber)?;
    let date = model::parse_date(&require_field(form, "date")?).ok_or(Rejection::BadDate)?;
    let exam_id = form_id(form, "exam")?;

    student_in_classroom(conn, student_id, room.id)?;
    if records::subject_by_id(conn, subject_id)?.is_none() {
        return Err(Rejection::UnknownSubject.into());
    }
    if !records::teacher_teaches(conn, teacher.id, subject_id)? {
        log::info!(
            "teacher {} refused grade for subject {} (not theirs)",
            teacher.id,
            subject_id
        );
        return Err(Rejection::NotYourSubject.into());
    }
    let exam_type = match exam_id {
        Some(eid) => Some(
            records::owned_exam_type(conn, eid, teacher.id)?.ok_or(Rejection::InvalidEvaluation)?,
        ),
        None => None,
    };
    let evaluation_type = form_str(form, "type")
        .or(exam_type)
        .unwrap_or_default();

    let tx = conn.unchecked_transaction()?;
    if let Err(e) = tx.execute(
        "INSERT INTO grades(date, evaluation_type, grade, exam_id) VALUES(?, ?, ?, ?)",
        (model::format_date(date), &evaluation_type, value, exam_id),
    ) {
        if is_check_violation(&e) {
            return Err(Rejection::GradeOutOfRange.into());
        }
        return Err(e.into());
    }
    let grade_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO student_grades(student_id, grade_id) VALUES(?, ?)",
        (student_id, grade_id),
    )?;
    tx.execute(
        "INSERT INTO subject_grades(subject_id, grade_id) VALUES(?, ?)",
        (subject_id, grade_id),
    )?;
    tx.commit()?;

    log::info!(
        "grade {} ({}) recorded for student {} in subject {} by teacher {}",
        grade_id,
        value,
        student_id,
        subject_id,
        teacher.id
    );
    Ok(Outcome::new(json!({ "gradeId": grade_id, "classroomId": room.id }))
        .with_flash(Flash::success("Grade added successfully!")))
}

pub fn add_absence(
    conn: &Connection,
    session: &Session,
    classroom_id: i64,
    form: &serde_json::Value,
) -> Result<Outcome, HandlerErr> {
    let teacher = teacher_profile(conn, session)?;
    let room = classroom(conn, classroom_id)?;

    let student_id = require_id_field(form, "student")?;
    let date = model::parse_date(&require_field(form, "date")?).ok_or(Rejection::BadDate)?;
    let time = model::parse_time(&require_field(form, "time")?).ok_or(Rejection::BadTime)?;
    if !Weekday::of(date).is_school_day() {
        return Err(Rejection::WeekendAbsence.into());
    }
    student_in_classroom(conn, student_id, room.id)?;
    let subject_id = form_id(form, "subject")?;
    if let Some(sid) = subject_id {
        if records::subject_by_id(conn, sid)?.is_none() {
            return Err(Rejection::UnknownSubject.into());
        }
    }
    let note = form_str(form, "note").unwrap_or_default();

    conn.execute(
        "INSERT INTO absences(student_id, subject_id, date, time, recorded_by, note)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            student_id,
            subject_id,
            model::format_date(date),
            model::format_time(time),
            teacher.id,
            &note,
        ),
    )?;
    let absence_id = conn.last_insert_rowid();
    log::info!(
        "absence {} recorded for student {} on {} by teacher {}",
        absence_id,
        student_id,
        model::format_date(date),
        teacher.id
    );
    Ok(Outcome::new(json!({ "absenceId": absence_id, "classroomId": room.id }))
        .with_flash(Flash::success("Absence recorded!")))
}

/// Copies an uploaded file into the workspace and returns its stored path,
/// relative to the workspace root.
fn store_exam_file(workspace: &Path, source: &Path) -> anyhow::Result<String> {
    let name = source
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("upload has no file name: {}", source.to_string_lossy()))?;
    let dir = workspace.join(db::EXAM_FILES_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.to_string_lossy()))?;
    let stored = format!("{}-{}", Uuid::new_v4().simple(), name);
    std::fs::copy(source, dir.join(&stored))
        .with_context(|| format!("failed to copy {}", source.to_string_lossy()))?;
    Ok(format!("{}/{}", db::EXAM_FILES_DIR, stored))
}

pub fn add_exam(
    conn: &Connection,
    workspace: Option<&Path>,
    session: &Session,
    classroom_id: i64,
    form: &serde_json::Value,
) -> Result<Outcome, HandlerErr> {
    let teacher = teacher_profile(conn, session)?;
    let room = classroom(conn, classroom_id)?;

    let (Some(type_raw), Some(subject_raw), Some(date_raw)) = (
        form_str(form, "type"),
        form_str(form, "subject"),
        form_str(form, "date"),
    ) else {
        return Err(Rejection::ExamFieldsMissing.into());
    };
    let exam_type = ExamType::parse(&type_raw).ok_or(Rejection::UnknownExamType)?;
    let subject_id: i64 = subject_raw
        .parse()
        .map_err(|_| HandlerErr::new("bad_params", "subject must be an integer id"))?;
    if records::subject_by_id(conn, subject_id)?.is_none() {
        return Err(Rejection::UnknownSubject.into());
    }
    if !records::teacher_teaches(conn, teacher.id, subject_id)? {
        return Err(Rejection::ExamNotYourSubject.into());
    }
    let date = model::parse_date(&date_raw).ok_or(Rejection::BadDate)?;

    let file_path = match form_str(form, "file") {
        Some(src) => {
            let Some(ws) = workspace else {
                return Err(HandlerErr::new("no_workspace", "select a workspace first"));
            };
            Some(store_exam_file(ws, Path::new(&src)).map_err(|e| {
                log::error!("exam upload failed: {e:#}");
                HandlerErr::new("upload_failed", "Could not store the uploaded file.")
            })?)
        }
        None => None,
    };

    let inserted = conn.execute(
        "INSERT INTO exams(type, date, teacher_id, subject_id, classroom_id, file_path)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            exam_type.as_str(),
            model::format_date(date),
            teacher.id,
            subject_id,
            room.id,
            &file_path,
        ),
    );
    if let Err(e) = inserted {
        if let (Some(ws), Some(rel)) = (workspace, file_path.as_ref()) {
            let _ = std::fs::remove_file(ws.join(rel));
        }
        return Err(e.into());
    }
    let exam_id = conn.last_insert_rowid();
    log::info!(
        "exam {} ({}) created for classroom {} by teacher {}",
        exam_id,
        exam_type.as_str(),
        room.id,
        teacher.id
    );
    Ok(Outcome::new(json!({
        "examId": exam_id,
        "classroomId": room.id,
        "file": file_path,
    }))
    .with_flash(Flash::success("Evaluation added successfully!")))
}

fn handle(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let outcome = match req.method.as_str() {
        "teacher.classrooms" => classrooms(conn, &session_from(conn, &req.params)?)?,
        method => {
            let session = require_role(conn, &req.params, Role::Teacher)?;
            let classroom_id = required_id(&req.params, "classroomId")?;
            match method {
                "teacher.classroom.open" => classroom_open(conn, &session, classroom_id)?,
                "teacher.exams.list" => exams_list(conn, &session, classroom_id)?,
                "teacher.grades.add" => add_grade(conn, &session, classroom_id, &req.params)?,
                "teacher.absences.add" => add_absence(conn, &session, classroom_id, &req.params)?,
                "teacher.exams.add" => add_exam(
                    conn,
                    state.workspace.as_deref(),
                    &session,
                    classroom_id,
                    &req.params,
                )?,
                _ => {
                    return Err(HandlerErr::new(
                        "not_implemented",
                        format!("unknown method: {}", method),
                    ))
                }
            }
        }
    };
    Ok(outcome.into_result())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teacher.classrooms"
        | "teacher.classroom.open"
        | "teacher.exams.list"
        | "teacher.grades.add"
        | "teacher.absences.add"
        | "teacher.exams.add" => Some(match handle(state, req) {
            Ok(v) => ok(&req.id, v),
            Err(e) => {
                if e.code == "rejected" {
                    log::info!("{} rejected: {}", req.method, e.message);
                }
                e.response(&req.id)
            }
        }),
        _ => None,
    }
}

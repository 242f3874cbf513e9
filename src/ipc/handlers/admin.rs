use crate::auth;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, form_id, form_str, required_id, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, Weekday};
use crate::records;
use rusqlite::Connection;
use serde_json::json;

fn insert_named(conn: &Connection, table: &str, name: &str) -> Result<i64, HandlerErr> {
    conn.execute(&format!("INSERT INTO {}(name) VALUES(?)", table), [name])
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        })?;
    Ok(conn.last_insert_rowid())
}

fn parse_subject_ids(params: &serde_json::Value) -> Result<Vec<i64>, HandlerErr> {
    let Some(raw) = params.get("subjectIds") else {
        return Ok(Vec::new());
    };
    let Some(arr) = raw.as_array() else {
        return Err(HandlerErr::new("bad_params", "subjectIds must be an array"));
    };
    arr.iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| HandlerErr::new("bad_params", "subjectIds must contain integer ids"))
        })
        .collect()
}

fn set_teacher_subjects(
    conn: &Connection,
    teacher_id: i64,
    subject_ids: &[i64],
) -> Result<(), HandlerErr> {
    conn.execute("DELETE FROM teacher_subjects WHERE teacher_id = ?", [teacher_id])?;
    for sid in subject_ids {
        if records::subject_by_id(conn, *sid)?.is_none() {
            return Err(HandlerErr::new("not_found", format!("subject {} not found", sid)));
        }
        conn.execute(
            "INSERT OR IGNORE INTO teacher_subjects(teacher_id, subject_id) VALUES(?, ?)",
            (teacher_id, sid),
        )?;
    }
    Ok(())
}

fn schools_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let id = insert_named(conn, "schools", &name)?;
    Ok(json!({ "schoolId": id, "name": name }))
}

fn subjects_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let id = insert_named(conn, "subjects", &name)?;
    Ok(json!({ "subjectId": id, "name": name }))
}

fn classrooms_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let number = required_str(params, "number")?;
    let letter = required_str(params, "letter")?;
    if number.chars().count() > 2 || letter.chars().count() != 1 {
        return Err(HandlerErr::new(
            "bad_params",
            "number is at most 2 characters and letter exactly 1",
        ));
    }
    let school_id = required_id(params, "schoolId")?;
    let form_teacher_id = form_id(params, "formTeacherId")?;
    conn.execute(
        "INSERT INTO classrooms(number, letter, form_teacher_id, school_id) VALUES(?, ?, ?, ?)",
        (&number, &letter, form_teacher_id, school_id),
    )?;
    let id = conn.last_insert_rowid();
    Ok(json!({ "classroomId": id, "name": format!("{}{}", number, letter) }))
}

fn accounts_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let username = required_str(params, "username")?;
    let password = required_str(params, "password")?;
    let first_name = form_str(params, "firstName").unwrap_or_default();
    let last_name = form_str(params, "lastName").unwrap_or_default();
    let email = form_str(params, "email").unwrap_or_default();

    let tx = conn.unchecked_transaction()?;
    let salt = auth::new_salt();
    tx.execute(
        "INSERT INTO accounts(username, password_hash, password_salt, first_name, last_name, email)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &username,
            auth::hash_password(&salt, &password),
            &salt,
            &first_name,
            &last_name,
            &email,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "accounts" })),
    })?;
    let account_id = tx.last_insert_rowid();

    let mut student_id = None;
    if let Some(student) = params.get("student").filter(|v| v.is_object()) {
        tx.execute(
            "INSERT INTO student_profiles(account_id, fathers_initial, phone, classroom_id)
             VALUES(?, ?, ?, ?)",
            (
                account_id,
                form_str(student, "fathersInitial").unwrap_or_default(),
                form_str(student, "phone").unwrap_or_default(),
                form_id(student, "classroomId")?,
            ),
        )?;
        student_id = Some(tx.last_insert_rowid());
    }

    let mut teacher_id = None;
    if let Some(teacher) = params.get("teacher").filter(|v| v.is_object()) {
        tx.execute(
            "INSERT INTO teacher_profiles(account_id) VALUES(?)",
            [account_id],
        )?;
        let tid = tx.last_insert_rowid();
        set_teacher_subjects(&tx, tid, &parse_subject_ids(teacher)?)?;
        teacher_id = Some(tid);
    }
    tx.commit()?;

    log::info!("account {} created", username);
    Ok(json!({
        "accountId": account_id,
        "studentId": student_id,
        "teacherId": teacher_id,
    }))
}

fn teachers_set_subjects(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_id(params, "teacherId")?;
    let subject_ids = parse_subject_ids(params)?;
    let tx = conn.unchecked_transaction()?;
    set_teacher_subjects(&tx, teacher_id, &subject_ids)?;
    tx.commit()?;
    Ok(json!({ "teacherId": teacher_id, "subjectIds": subject_ids }))
}

fn students_assign(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_id(params, "studentId")?;
    let classroom_id = form_id(params, "classroomId")?;
    if let Some(cid) = classroom_id {
        if records::classroom_by_id(conn, cid)?.is_none() {
            return Err(HandlerErr::new("not_found", "classroom not found"));
        }
    }
    let n = conn.execute(
        "UPDATE student_profiles SET classroom_id = ? WHERE id = ?",
        (classroom_id, student_id),
    )?;
    if n == 0 {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    Ok(json!({ "studentId": student_id, "classroomId": classroom_id }))
}

fn schedule_add(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_id(params, "classroomId")?;
    let subject_id = required_id(params, "subjectId")?;
    let teacher_id = required_id(params, "teacherId")?;
    let day_raw = required_str(params, "dayOfWeek")?;
    let Some(day) = Weekday::parse(&day_raw) else {
        return Err(HandlerErr::new(
            "bad_params",
            format!("dayOfWeek must be a weekday name, got {}", day_raw),
        ));
    };
    let Some(start) = model::parse_time(&required_str(params, "startTime")?) else {
        return Err(HandlerErr::new("bad_params", "startTime must be HH:MM"));
    };
    conn.execute(
        "INSERT INTO schedule_entries(classroom_id, subject_id, teacher_id, day_of_week, start_time)
         VALUES(?, ?, ?, ?, ?)",
        (
            classroom_id,
            subject_id,
            teacher_id,
            day.as_str(),
            model::format_time(start),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "schedule_entries" })),
    })?;
    Ok(json!({
        "scheduleEntryId": conn.last_insert_rowid(),
        "dayOfWeek": day.as_str(),
        "startTime": model::format_time(start),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let action: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "admin.schools.create" => schools_create,
            "admin.subjects.create" => subjects_create,
            "admin.classrooms.create" => classrooms_create,
            "admin.accounts.create" => accounts_create,
            "admin.teachers.setSubjects" => teachers_set_subjects,
            "admin.students.assign" => students_assign,
            "admin.schedule.add" => schedule_add,
            _ => return None,
        };
    let resp = db_conn(state).and_then(|conn| action(conn, &req.params));
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wednesday; the school week runs 2026-10-12 ..= 2026-10-18.
pub const NOW: &str = "2026-10-14T09:30";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_catalogd");
    let mut child = Command::new(exe)
        .env("CATALOGD_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn catalogd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn id_of(result: &serde_json::Value, key: &str) -> i64 {
    result
        .get(key)
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| panic!("missing {} in {}", key, result))
}

/// A small school: classroom 9A taught by `prof` (Matematica, Informatica) and
/// `bio` (Biologie), students ana/mihai/dan in 9A, eva unassigned, and an
/// empty 10B that `prof` also teaches in.
pub struct School {
    pub workspace: PathBuf,
    pub class_9a: i64,
    pub class_10b: i64,
    pub math: i64,
    pub info: i64,
    pub bio: i64,
    pub prof_id: i64,
    pub bio_teacher_id: i64,
    pub ana: i64,
    pub mihai: i64,
    pub dan: i64,
    pub eva: i64,
    pub prof_session: String,
    pub bio_session: String,
    pub ana_session: String,
    pub dan_session: String,
    pub eva_session: String,
}

pub fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> School {
    let workspace = temp_dir(prefix);
    let mut n = 0;
    let mut call = |stdin: &mut ChildStdin,
                    reader: &mut BufReader<ChildStdout>,
                    method: &str,
                    params: serde_json::Value| {
        n += 1;
        request_ok(stdin, reader, &format!("seed-{}", n), method, params)
    };

    call(
        stdin,
        reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school = id_of(
        &call(stdin, reader, "admin.schools.create", json!({ "name": "Liceul Teoretic" })),
        "schoolId",
    );
    let math = id_of(
        &call(stdin, reader, "admin.subjects.create", json!({ "name": "Matematica" })),
        "subjectId",
    );
    let info = id_of(
        &call(stdin, reader, "admin.subjects.create", json!({ "name": "Informatica" })),
        "subjectId",
    );
    let bio = id_of(
        &call(stdin, reader, "admin.subjects.create", json!({ "name": "Biologie" })),
        "subjectId",
    );

    let prof_id = id_of(
        &call(
            stdin,
            reader,
            "admin.accounts.create",
            json!({
                "username": "prof",
                "password": "secret",
                "firstName": "Ion",
                "lastName": "Popescu",
                "email": "prof@school.test",
                "teacher": { "subjectIds": [math, info] }
            }),
        ),
        "teacherId",
    );
    let bio_teacher_id = id_of(
        &call(
            stdin,
            reader,
            "admin.accounts.create",
            json!({
                "username": "bio",
                "password": "secret",
                "firstName": "Maria",
                "lastName": "Ionescu",
                "teacher": { "subjectIds": [bio] }
            }),
        ),
        "teacherId",
    );

    let class_9a = id_of(
        &call(
            stdin,
            reader,
            "admin.classrooms.create",
            json!({ "number": "9", "letter": "A", "schoolId": school, "formTeacherId": prof_id }),
        ),
        "classroomId",
    );
    let class_10b = id_of(
        &call(
            stdin,
            reader,
            "admin.classrooms.create",
            json!({ "number": "10", "letter": "B", "schoolId": school }),
        ),
        "classroomId",
    );

    let mut student = |stdin: &mut ChildStdin,
                       reader: &mut BufReader<ChildStdout>,
                       username: &str,
                       first: &str,
                       classroom: Option<i64>| {
        let created = call(
            stdin,
            reader,
            "admin.accounts.create",
            json!({
                "username": username,
                "password": "secret",
                "firstName": first,
                "lastName": "Elev",
                "student": {
                    "classroomId": classroom,
                    "fathersInitial": "M",
                    "phone": "0700000000"
                }
            }),
        );
        id_of(&created, "studentId")
    };
    let ana = student(stdin, reader, "ana", "Ana", Some(class_9a));
    let mihai = student(stdin, reader, "mihai", "Mihai", Some(class_9a));
    let dan = student(stdin, reader, "dan", "Dan", Some(class_9a));
    let eva = student(stdin, reader, "eva", "Eva", None);

    for (classroom, subject, teacher, day, start) in [
        (class_9a, math, prof_id, "Monday", "08:00"),
        (class_9a, info, prof_id, "Monday", "09:00"),
        (class_9a, bio, bio_teacher_id, "Wednesday", "08:00"),
        (class_9a, math, prof_id, "Miercuri", "10:00"),
        (class_9a, info, prof_id, "Friday", "12:00"),
        (class_10b, math, prof_id, "Tuesday", "08:00"),
    ] {
        request_ok(
            stdin,
            reader,
            "seed-schedule",
            "admin.schedule.add",
            json!({
                "classroomId": classroom,
                "subjectId": subject,
                "teacherId": teacher,
                "dayOfWeek": day,
                "startTime": start
            }),
        );
    }

    let login = |stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, username: &str| {
        let res = request_ok(
            stdin,
            reader,
            "seed-login",
            "auth.login",
            json!({ "username": username, "password": "secret" }),
        );
        res.get("session")
            .and_then(|v| v.as_str())
            .expect("session token")
            .to_string()
    };
    let prof_session = login(stdin, reader, "prof");
    let bio_session = login(stdin, reader, "bio");
    let ana_session = login(stdin, reader, "ana");
    let dan_session = login(stdin, reader, "dan");
    let eva_session = login(stdin, reader, "eva");

    School {
        workspace,
        class_9a,
        class_10b,
        math,
        info,
        bio,
        prof_id,
        bio_teacher_id,
        ana,
        mihai,
        dan,
        eva,
        prof_session,
        bio_session,
        ana_session,
        dan_session,
        eva_session,
    }
}

/// Adds a grade through the domain method and returns the raw response.
pub fn add_grade(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    session: &str,
    classroom: i64,
    student: i64,
    subject: i64,
    grade: serde_json::Value,
    date: &str,
) -> serde_json::Value {
    request(
        stdin,
        reader,
        "grade",
        "teacher.grades.add",
        json!({
            "session": session,
            "classroomId": classroom,
            "student": student,
            "subject": subject,
            "grade": grade,
            "date": date
        }),
    )
}

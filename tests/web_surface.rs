mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_ok, seed_school, spawn_sidecar, NOW};

fn web(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    path: &str,
    session: Option<&str>,
    form: serde_json::Value,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        "web",
        "web.dispatch",
        json!({
            "method": method,
            "path": path,
            "session": session,
            "form": form,
            "now": NOW
        }),
    )
}

#[test]
fn login_redirects_by_role_and_hands_out_a_session() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seed_school(&mut stdin, &mut reader, "catalogd-web-login");

    let teacher = web(
        &mut stdin,
        &mut reader,
        "POST",
        "/login",
        None,
        json!({ "username": "prof", "password": "secret" }),
    );
    assert_eq!(teacher["kind"], json!("redirect"));
    assert_eq!(teacher["location"], json!("/teacher-page/"));
    assert_eq!(
        teacher["flash"][0]["message"],
        json!("You have been logged in as a Teacher!")
    );
    let token = teacher["session"].as_str().expect("session").to_string();

    let student = web(
        &mut stdin,
        &mut reader,
        "POST",
        "/login",
        None,
        json!({ "username": "ana", "password": "secret" }),
    );
    assert_eq!(student["location"], json!("/student-page/"));

    let wrong = web(
        &mut stdin,
        &mut reader,
        "POST",
        "/login",
        None,
        json!({ "username": "ana", "password": "nope" }),
    );
    assert_eq!(wrong["location"], json!("/"));
    assert_eq!(wrong["flash"][0]["level"], json!("error"));
    assert!(wrong.get("session").is_none());

    let form = web(&mut stdin, &mut reader, "GET", "/login", None, json!({}));
    assert_eq!(form["kind"], json!("render"));
    assert_eq!(form["view"], json!("login"));

    let out = web(&mut stdin, &mut reader, "POST", "/logout", Some(token.as_str()), json!({}));
    assert_eq!(out["location"], json!("/"));
    assert_eq!(out["flash"][0]["message"], json!("You have been logged out!"));

    let after = web(
        &mut stdin,
        &mut reader,
        "GET",
        "/teacher-page/",
        Some(token.as_str()),
        json!({}),
    );
    assert_eq!(after["location"], json!("/"));
}

#[test]
fn logout_needs_a_post_with_a_live_session() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, "catalogd-web-logout");

    let by_get = web(
        &mut stdin,
        &mut reader,
        "GET",
        "/logout",
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(by_get["kind"], json!("redirect"));
    assert_eq!(by_get["location"], json!("/"));
    assert_eq!(by_get["flash"], json!([]));

    let still_in = web(
        &mut stdin,
        &mut reader,
        "GET",
        "/teacher-page/",
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(still_in["view"], json!("teacher_main"));

    for session in [None, Some("not-a-session")] {
        let anonymous = web(&mut stdin, &mut reader, "POST", "/logout", session, json!({}));
        assert_eq!(anonymous["location"], json!("/"));
        assert_eq!(anonymous["flash"], json!([]));
    }
}

#[test]
fn role_gate_silently_redirects_home() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, "catalogd-web-gate");

    for (path, session) in [
        ("/student-page/", Some(s.prof_session.as_str())),
        ("/student-page/grades", None),
        ("/teacher/classroom/1/", Some(s.ana_session.as_str())),
        ("/reviews/", Some(s.ana_session.as_str())),
        ("/teacher-page/", None),
    ] {
        let page = web(&mut stdin, &mut reader, "GET", path, session, json!({}));
        assert_eq!(page["kind"], json!("redirect"), "{}", path);
        assert_eq!(page["location"], json!("/"), "{}", path);
        assert_eq!(page["flash"], json!([]), "{}", path);
    }

    let home = web(&mut stdin, &mut reader, "GET", "/", None, json!({}));
    assert_eq!(home["view"], json!("index"));
    assert_eq!(home["context"]["authenticated"], json!(false));

    // teacher home needs a session, not a teacher profile
    let student_home = web(
        &mut stdin,
        &mut reader,
        "GET",
        "/teacher-page/",
        Some(s.ana_session.as_str()),
        json!({}),
    );
    assert_eq!(student_home["view"], json!("teacher_main"));
    assert_eq!(student_home["context"]["classrooms"], json!([]));

    let reviews = web(
        &mut stdin,
        &mut reader,
        "GET",
        "/reviews/",
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(reviews["view"], json!("reviews"));
}

#[test]
fn student_pages_render_their_views() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, "catalogd-web-student");

    for (path, view) in [
        ("/student-page/", "student_main"),
        ("/student-page/grades", "student_grades"),
        ("/student-page/time_table", "student_timetable"),
        ("/student-page/calendar", "student_calendar"),
        ("/student-page/attendance", "student_attendance"),
    ] {
        let page = web(
            &mut stdin,
            &mut reader,
            "GET",
            path,
            Some(s.ana_session.as_str()),
            json!({}),
        );
        assert_eq!(page["kind"], json!("render"), "{}", path);
        assert_eq!(page["view"], json!(view), "{}", path);
    }
    let dash = web(
        &mut stdin,
        &mut reader,
        "GET",
        "/student-page/",
        Some(s.ana_session.as_str()),
        json!({}),
    );
    assert_eq!(dash["context"]["currentDay"], json!("Wednesday"));
}

#[test]
fn rejected_grade_redirects_back_with_the_reason() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, "catalogd-web-grade");
    let origin = format!("/teacher/classroom/{}/", s.class_9a);
    let grade_path = format!("{}grade/", origin);

    let rejected = web(
        &mut stdin,
        &mut reader,
        "POST",
        &grade_path,
        Some(s.prof_session.as_str()),
        json!({ "student": s.ana, "subject": s.bio, "grade": "9", "date": "2026-10-12" }),
    );
    assert_eq!(rejected["kind"], json!("redirect"));
    assert_eq!(rejected["location"], json!(origin));
    assert_eq!(rejected["flash"][0]["level"], json!("error"));
    assert_eq!(rejected["flash"][0]["message"], json!("You do not teach this subject."));

    let wrong_method = web(
        &mut stdin,
        &mut reader,
        "GET",
        &grade_path,
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(wrong_method["location"], json!(origin));
    assert_eq!(wrong_method["flash"][0]["message"], json!("Could not add the grade."));

    let added = web(
        &mut stdin,
        &mut reader,
        "POST",
        &grade_path,
        Some(s.prof_session.as_str()),
        json!({
            "student": s.ana.to_string(),
            "subject": s.math.to_string(),
            "grade": "9",
            "date": "2026-10-12",
            "type": "Test"
        }),
    );
    assert_eq!(added["location"], json!(origin));
    assert_eq!(added["flash"][0]["level"], json!("success"));

    let page = web(
        &mut stdin,
        &mut reader,
        "GET",
        &origin,
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(page["view"], json!("teacher_classroom"));
    let ana_row = &page["context"]["catalog"][0];
    assert_eq!(ana_row["student"]["id"], json!(s.ana));
    let math_cell = ana_row["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|c| c["subject"]["id"] == json!(s.math))
        .expect("math cell");
    assert_eq!(math_cell["grades"][0]["grade"], json!(9));
    assert_eq!(math_cell["grades"][0]["type"], json!("Test"));
}

#[test]
fn absence_and_exam_forms_redirect_to_their_pages() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, "catalogd-web-forms");
    let origin = format!("/teacher/classroom/{}/", s.class_9a);
    let exams = format!("{}exams/", origin);

    let weekend = web(
        &mut stdin,
        &mut reader,
        "POST",
        &format!("{}absence/", origin),
        Some(s.prof_session.as_str()),
        json!({ "student": s.ana, "date": "2026-10-18", "time": "10:00" }),
    );
    assert_eq!(weekend["location"], json!(origin));
    assert_eq!(
        weekend["flash"][0]["message"],
        json!("Absences cannot be recorded on weekends.")
    );

    let absence_get = web(
        &mut stdin,
        &mut reader,
        "GET",
        &format!("{}absence/", origin),
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(absence_get["flash"][0]["message"], json!("Could not record the absence."));

    let incomplete = web(
        &mut stdin,
        &mut reader,
        "POST",
        &format!("{}add/", exams),
        Some(s.prof_session.as_str()),
        json!({ "type": "Test", "subject": "", "date": "2026-10-20" }),
    );
    assert_eq!(incomplete["location"], json!(exams));
    assert_eq!(
        incomplete["flash"][0]["message"],
        json!("All fields are required except the file.")
    );

    let exam_get = web(
        &mut stdin,
        &mut reader,
        "GET",
        &format!("{}add/", exams),
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(exam_get["location"], json!(exams));
    assert_eq!(exam_get["flash"], json!([]));

    let created = web(
        &mut stdin,
        &mut reader,
        "POST",
        &format!("{}add/", exams),
        Some(s.prof_session.as_str()),
        json!({ "type": "Tema", "subject": s.info, "date": "2026-10-20" }),
    );
    assert_eq!(created["flash"][0]["level"], json!("success"));

    let listing = web(
        &mut stdin,
        &mut reader,
        "GET",
        &exams,
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(listing["view"], json!("teacher_exams"));
    assert_eq!(listing["context"]["exams"][0]["type"], json!("Tema"));

    let unknown_room = web(
        &mut stdin,
        &mut reader,
        "GET",
        "/teacher/classroom/9999/",
        Some(s.prof_session.as_str()),
        json!({}),
    );
    assert_eq!(unknown_room["location"], json!("/teacher-page/"));
    assert_eq!(unknown_room["flash"][0]["level"], json!("error"));
}

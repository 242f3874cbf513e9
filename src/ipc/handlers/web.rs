//! `web.dispatch`: the browser-facing surface. A request names an HTTP method
//! and path; the answer is a page outcome, either a view to render with its
//! context or a redirect. Role-gate failures always redirect to `/` without a
//! message, and write paths always redirect back to the page they came from.

use crate::auth::{self, Session};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{auth as login_flow, student, teacher};
use crate::ipc::helpers::{db_conn, form_str, now_from, require_role, required_str, session_from};
use crate::ipc::types::{AppState, Flash, Outcome, Request};
use crate::model::Role;
use rusqlite::Connection;
use serde_json::json;

const LOGIN_FAILED: &str = "There was an error logging in, please try again!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Index,
    Login,
    Logout,
    Reviews,
    Student(student::Page),
    TeacherHome,
    Classroom(i64),
    AddGrade(i64),
    AddAbsence(i64),
    Exams(i64),
    AddExam(i64),
}

impl Route {
    fn parse(path: &str) -> Option<Self> {
        let trimmed = path.trim_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };
        let route = match parts.as_slice() {
            [] => Route::Index,
            ["login"] => Route::Login,
            ["logout"] => Route::Logout,
            ["reviews"] => Route::Reviews,
            ["student-page"] => Route::Student(student::Page::Dashboard),
            ["student-page", "grades"] => Route::Student(student::Page::Grades),
            ["student-page", "time_table"] => Route::Student(student::Page::Timetable),
            ["student-page", "calendar"] => Route::Student(student::Page::Calendar),
            ["student-page", "attendance"] => Route::Student(student::Page::Attendance),
            ["teacher-page"] => Route::TeacherHome,
            ["teacher", "classroom", id, rest @ ..] => {
                let id: i64 = id.parse().ok()?;
                match rest {
                    [] => Route::Classroom(id),
                    ["grade"] => Route::AddGrade(id),
                    ["absence"] => Route::AddAbsence(id),
                    ["exams"] => Route::Exams(id),
                    ["exams", "add"] => Route::AddExam(id),
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some(route)
    }
}

fn classroom_path(id: i64) -> String {
    format!("/teacher/classroom/{}/", id)
}

fn exams_path(id: i64) -> String {
    format!("/teacher/classroom/{}/exams/", id)
}

#[derive(Debug)]
enum PageOutcome {
    Render {
        view: &'static str,
        outcome: Outcome,
    },
    Redirect {
        location: String,
        flash: Vec<Flash>,
        session: Option<String>,
    },
}

impl PageOutcome {
    fn render(view: &'static str, outcome: Outcome) -> Self {
        PageOutcome::Render { view, outcome }
    }

    fn redirect(location: impl Into<String>, flash: Option<Flash>) -> Self {
        PageOutcome::Redirect {
            location: location.into(),
            flash: flash.into_iter().collect(),
            session: None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            PageOutcome::Render { view, outcome } => json!({
                "kind": "render",
                "view": view,
                "context": outcome.context,
                "flash": outcome.flash,
            }),
            PageOutcome::Redirect {
                location,
                flash,
                session,
            } => {
                let mut v = json!({
                    "kind": "redirect",
                    "location": location,
                    "flash": flash,
                });
                if let Some(token) = session {
                    v["session"] = json!(token);
                }
                v
            }
        }
    }
}

/// Runs the role gate. `Ok(None)` means the visitor is turned away.
fn gate(
    conn: &Connection,
    params: &serde_json::Value,
    role: Option<Role>,
) -> Result<Option<Session>, HandlerErr> {
    let checked = match role {
        Some(r) => require_role(conn, params, r),
        None => session_from(conn, params),
    };
    match checked {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.is_gate() => Ok(None),
        Err(e) => Err(e),
    }
}

fn turned_away() -> PageOutcome {
    PageOutcome::redirect("/", None)
}

/// Maps a teacher read failure onto the page flow.
fn teacher_read(
    view: &'static str,
    built: Result<Outcome, HandlerErr>,
) -> Result<PageOutcome, HandlerErr> {
    match built {
        Ok(outcome) => Ok(PageOutcome::render(view, outcome)),
        Err(e) if e.is_gate() => Ok(turned_away()),
        Err(e) if e.code == "not_found" => Ok(PageOutcome::redirect(
            "/teacher-page/",
            Some(Flash::error(e.message)),
        )),
        Err(e) => Err(e),
    }
}

/// Maps a write result onto a redirect back to `origin`.
fn teacher_write(origin: String, built: Result<Outcome, HandlerErr>) -> PageOutcome {
    match built {
        Ok(outcome) => PageOutcome::Redirect {
            location: origin,
            flash: outcome.flash,
            session: None,
        },
        Err(e) if e.is_gate() => turned_away(),
        Err(e) if e.code == "not_found" => {
            PageOutcome::redirect("/teacher-page/", Some(Flash::error(e.message)))
        }
        Err(e) => {
            if e.code != "rejected" {
                log::error!("write to {} failed: {} ({})", origin, e.message, e.code);
            }
            PageOutcome::redirect(origin, Some(Flash::error(e.message)))
        }
    }
}

fn login(conn: &Connection, form: &serde_json::Value) -> Result<PageOutcome, HandlerErr> {
    let (Some(username), Some(password)) =
        (form_str(form, "username"), form_str(form, "password"))
    else {
        return Ok(PageOutcome::redirect("/", Some(Flash::error(LOGIN_FAILED))));
    };
    match login_flow::login(conn, &username, &password) {
        Ok(done) => Ok(PageOutcome::Redirect {
            location: done.redirect().to_string(),
            flash: done.welcome().map(Flash::success).into_iter().collect(),
            session: done.session.map(|s| s.token),
        }),
        Err(e) if e.code == "auth_failed" => {
            Ok(PageOutcome::redirect("/", Some(Flash::error(e.message))))
        }
        Err(e) => Err(e),
    }
}

fn index(conn: &Connection, params: &serde_json::Value) -> Result<PageOutcome, HandlerErr> {
    let role = match params.get("session").and_then(|v| v.as_str()) {
        Some(token) => auth::lookup_session(conn, token)?.map(|s| s.role),
        None => None,
    };
    Ok(PageOutcome::render(
        "index",
        Outcome::new(json!({
            "authenticated": role.is_some(),
            "role": role,
        })),
    ))
}

fn dispatch(state: &AppState, params: &serde_json::Value) -> Result<PageOutcome, HandlerErr> {
    let conn = db_conn(state)?;
    let method = required_str(params, "method")?.to_ascii_uppercase();
    let path = required_str(params, "path")?;
    let Some(route) = Route::parse(&path) else {
        return Err(HandlerErr::new("not_found", format!("no page at {}", path)));
    };
    let empty = json!({});
    let form = params.get("form").filter(|v| v.is_object()).unwrap_or(&empty);
    let is_post = method == "POST";
    log::debug!("{} {}", method, path);

    let page = match route {
        Route::Index => index(conn, params)?,
        Route::Login if is_post => login(conn, form)?,
        Route::Login => PageOutcome::render("login", Outcome::new(json!({}))),
        Route::Logout => match gate(conn, params, None)? {
            Some(session) if is_post => {
                login_flow::logout(conn, Some(session.token.as_str()))?;
                PageOutcome::redirect("/", Some(Flash::success("You have been logged out!")))
            }
            _ => turned_away(),
        },
        Route::Reviews => match gate(conn, params, Some(Role::Teacher))? {
            Some(_) => PageOutcome::render("reviews", Outcome::new(json!({}))),
            None => turned_away(),
        },
        Route::Student(p) => match gate(conn, params, Some(Role::Student))? {
            Some(session) => {
                let now = now_from(params)?;
                PageOutcome::render(p.view(), student::render(conn, &session, p, now))
            }
            None => turned_away(),
        },
        Route::TeacherHome => match gate(conn, params, None)? {
            Some(session) => teacher_read("teacher_main", teacher::classrooms(conn, &session))?,
            None => turned_away(),
        },
        Route::Classroom(id) => match gate(conn, params, Some(Role::Teacher))? {
            Some(session) => teacher_read(
                "teacher_classroom",
                teacher::classroom_open(conn, &session, id),
            )?,
            None => turned_away(),
        },
        Route::Exams(id) => match gate(conn, params, Some(Role::Teacher))? {
            Some(session) => {
                teacher_read("teacher_exams", teacher::exams_list(conn, &session, id))?
            }
            None => turned_away(),
        },
        Route::AddGrade(id) => match gate(conn, params, Some(Role::Teacher))? {
            None => turned_away(),
            Some(_) if !is_post => PageOutcome::redirect(
                classroom_path(id),
                Some(Flash::error("Could not add the grade.")),
            ),
            Some(session) => teacher_write(
                classroom_path(id),
                teacher::add_grade(conn, &session, id, form),
            ),
        },
        Route::AddAbsence(id) => match gate(conn, params, Some(Role::Teacher))? {
            None => turned_away(),
            Some(_) if !is_post => PageOutcome::redirect(
                classroom_path(id),
                Some(Flash::error("Could not record the absence.")),
            ),
            Some(session) => teacher_write(
                classroom_path(id),
                teacher::add_absence(conn, &session, id, form),
            ),
        },
        Route::AddExam(id) => match gate(conn, params, Some(Role::Teacher))? {
            None => turned_away(),
            Some(_) if !is_post => PageOutcome::redirect(exams_path(id), None),
            Some(session) => teacher_write(
                exams_path(id),
                teacher::add_exam(conn, state.workspace.as_deref(), &session, id, form),
            ),
        },
    };
    Ok(page)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if req.method != "web.dispatch" {
        return None;
    }
    Some(match dispatch(state, &req.params) {
        Ok(page) => ok(&req.id, page.to_json()),
        Err(e) => e.response(&req.id),
    })
}

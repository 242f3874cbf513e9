use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRef {
    pub id: i64,
    pub name: String,
}

/// One grade attached to a student. `subject` is `None` when the grade has
/// no subject join; such grades still count toward the overall average but
/// are left out of any per-subject view.
#[derive(Debug, Clone)]
pub struct GradeRecord {
    pub grade_id: i64,
    pub value: i64,
    pub date: Option<NaiveDate>,
    pub evaluation_type: String,
    pub exam_id: Option<i64>,
    pub subject: Option<SubjectRef>,
}

/// Result of a best-effort pass: whatever could be resolved, plus how many
/// items were dropped along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    pub items: T,
    pub skipped: usize,
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRank {
    pub rank: Option<usize>,
    pub total_ranked: usize,
}

/// Ranks `student_id` among classmates that have at least one grade.
///
/// `classmates` is expected in a deterministic order (student id); the sort is
/// stable, so equal averages keep that order.
pub fn class_rank(classmates: &[(i64, Vec<i64>)], student_id: i64) -> ClassRank {
    let mut averages: Vec<(i64, f64)> = classmates
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(id, values)| (*id, mean(values)))
        .collect();
    averages.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let rank = averages
        .iter()
        .position(|(id, _)| *id == student_id)
        .map(|idx| idx + 1);
    ClassRank {
        rank,
        total_ranked: averages.len(),
    }
}

#[derive(Debug, Clone)]
pub struct SubjectGroup<'a> {
    pub subject: SubjectRef,
    pub grades: Vec<&'a GradeRecord>,
}

impl SubjectGroup<'_> {
    pub fn average(&self) -> f64 {
        let values: Vec<i64> = self.grades.iter().map(|g| g.value).collect();
        mean(&values)
    }
}

/// Groups grades by subject in first-encounter order. Grades without a
/// subject join are counted in `skipped`.
pub fn group_by_subject(grades: &[GradeRecord]) -> Collected<Vec<SubjectGroup<'_>>> {
    let mut groups: Vec<SubjectGroup<'_>> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut skipped = 0usize;

    for g in grades {
        let Some(subject) = g.subject.as_ref() else {
            skipped += 1;
            continue;
        };
        let slot = *index.entry(subject.id).or_insert_with(|| {
            groups.push(SubjectGroup {
                subject: subject.clone(),
                grades: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].grades.push(g);
    }

    Collected {
        items: groups,
        skipped,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub name: String,
    pub average: f64,
}

/// Subject with the strictly greatest average. On a tie the subject met
/// first keeps the title.
pub fn best_subject(grades: &[GradeRecord]) -> Collected<Option<SubjectAverage>> {
    let groups = group_by_subject(grades);
    let mut best: Option<SubjectAverage> = None;
    for group in &groups.items {
        let avg = group.average();
        let better = match &best {
            Some(b) => avg > b.average,
            None => true,
        };
        if better {
            best = Some(SubjectAverage {
                name: group.subject.name.clone(),
                average: avg,
            });
        }
    }
    Collected {
        items: best,
        skipped: groups.skipped,
    }
}

/// Monday-anchored calendar week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Week {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Week {
    pub fn containing(today: NaiveDate) -> Self {
        let offset = Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let start = today - offset;
        Week {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Days elapsed since Monday, counting today.
    pub fn days_elapsed(&self, today: NaiveDate) -> i64 {
        (today - self.start).num_days() + 1
    }
}

/// Weekly attendance percentage.
///
/// expected = (weekday classes / 5) * min(days elapsed, 5); the rate is the
/// rounded share of expected classes not missed, clamped to 0..=100. A zero
/// expectation reads as full attendance.
pub fn weekly_attendance_rate(weekday_classes: usize, days_elapsed: i64, absences: usize) -> u8 {
    let daily = weekday_classes as f64 / 5.0;
    let days = days_elapsed.clamp(0, 5) as f64;
    let expected = daily * days;
    if expected <= 0.0 {
        return 100;
    }
    let rate = ((expected - absences as f64) / expected * 100.0).round();
    rate.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(id: i64, value: i64, subject: Option<(i64, &str)>) -> GradeRecord {
        GradeRecord {
            grade_id: id,
            value,
            date: None,
            evaluation_type: String::new(),
            exam_id: None,
            subject: subject.map(|(sid, name)| SubjectRef {
                id: sid,
                name: name.to_string(),
            }),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[7, 8, 9]), 8.0);
    }

    #[test]
    fn rank_ignores_students_without_grades() {
        let classmates = vec![
            (1, vec![5, 6]),
            (2, vec![]),
            (3, vec![10, 9]),
            (4, vec![7]),
        ];
        assert_eq!(
            class_rank(&classmates, 4),
            ClassRank {
                rank: Some(2),
                total_ranked: 3
            }
        );
        assert_eq!(
            class_rank(&classmates, 2),
            ClassRank {
                rank: None,
                total_ranked: 3
            }
        );
        assert_eq!(class_rank(&classmates, 3).rank, Some(1));
    }

    #[test]
    fn rank_ties_keep_input_order() {
        let classmates = vec![(5, vec![8]), (6, vec![8]), (7, vec![9])];
        assert_eq!(class_rank(&classmates, 5).rank, Some(2));
        assert_eq!(class_rank(&classmates, 6).rank, Some(3));
    }

    #[test]
    fn best_subject_tie_goes_to_first_encountered() {
        let grades = vec![
            grade(1, 8, Some((2, "Math"))),
            grade(2, 8, Some((3, "Science"))),
        ];
        let best = best_subject(&grades);
        assert_eq!(best.items.map(|b| b.name), Some("Math".to_string()));
    }

    #[test]
    fn best_subject_skips_grades_without_subject() {
        let grades = vec![
            grade(1, 10, None),
            grade(2, 6, Some((2, "Istorie"))),
            grade(3, 9, Some((3, "Chimie"))),
            grade(4, 7, Some((2, "Istorie"))),
        ];
        let best = best_subject(&grades);
        assert_eq!(best.skipped, 1);
        let b = best.items.expect("best subject");
        assert_eq!(b.name, "Chimie");
        assert_eq!(b.average, 9.0);
    }

    #[test]
    fn best_subject_none_without_grades() {
        let best = best_subject(&[]);
        assert_eq!(best.items, None);
        assert_eq!(best.skipped, 0);
    }

    #[test]
    fn week_is_monday_anchored() {
        let w = Week::containing(day(2026, 10, 15));
        assert_eq!(w.start, day(2026, 10, 12));
        assert_eq!(w.end, day(2026, 10, 18));
        assert!(w.contains(day(2026, 10, 18)));
        assert!(!w.contains(day(2026, 10, 19)));
        assert_eq!(w.days_elapsed(day(2026, 10, 15)), 4);
        assert_eq!(w.days_elapsed(day(2026, 10, 18)), 7);
    }

    #[test]
    fn attendance_rate_examples() {
        assert_eq!(weekly_attendance_rate(5, 1, 0), 100);
        assert_eq!(weekly_attendance_rate(5, 3, 1), 67);
        // days past Friday are capped
        assert_eq!(weekly_attendance_rate(10, 7, 5), 50);
        // more absences than expected classes clamps to zero
        assert_eq!(weekly_attendance_rate(5, 1, 4), 0);
    }

    #[test]
    fn attendance_rate_without_classes_is_full() {
        assert_eq!(weekly_attendance_rate(0, 3, 2), 100);
    }
}

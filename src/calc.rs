//! Attendance and grade-point arithmetic over cached portal data.

use std::str::FromStr;

use serde::Serialize;

use crate::domain::{AttendanceRecord, GpaDocument};
use crate::error::PesuError;

pub const DEFAULT_ATTENDANCE_TARGET: u32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceProjection {
    pub attended: u32,
    pub total: u32,
    pub target: u32,
    pub percentage: f64,
    /// Classes that can still be skipped while staying at or above target.
    pub can_miss: u32,
    /// Consecutive classes to attend to reach the target. `None` when the
    /// target is 100% and a class has already been missed.
    pub needed: Option<u32>,
}

pub fn validate_target(target: u32) -> Result<(), PesuError> {
    if target == 0 || target > 100 {
        return Err(PesuError::InvalidQuery(format!(
            "attendance target must be within 1..=100, got {target}"
        )));
    }
    Ok(())
}

pub fn project_attendance(
    attended: u32,
    total: u32,
    target: u32,
) -> Result<AttendanceProjection, PesuError> {
    validate_target(target)?;
    if attended > total {
        return Err(PesuError::InvalidQuery(format!(
            "attended ({attended}) exceeds total ({total})"
        )));
    }

    let (attended_i, total_i, target_i) =
        (i64::from(attended), i64::from(total), i64::from(target));
    let surplus = attended_i * 100 - target_i * total_i;
    let can_miss = if surplus > 0 { surplus / target_i } else { 0 };
    let needed = if surplus >= 0 {
        Some(0)
    } else if target < 100 {
        let deficit = -surplus;
        let step = 100 - target_i;
        Some((deficit + step - 1) / step)
    } else {
        None
    };
    let percentage = if total == 0 {
        0.0
    } else {
        round2(f64::from(attended) * 100.0 / f64::from(total))
    };

    Ok(AttendanceProjection {
        attended,
        total,
        target,
        percentage,
        can_miss: u32::try_from(can_miss).unwrap_or(u32::MAX),
        needed: needed.map(|value| u32::try_from(value).unwrap_or(u32::MAX)),
    })
}

/// Projection for a scraped row, when the portal reported counts.
pub fn project_record(
    record: &AttendanceRecord,
    target: u32,
) -> Option<Result<AttendanceProjection, PesuError>> {
    match (record.attended, record.total) {
        (Some(attended), Some(total)) => Some(project_attendance(attended, total, target)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn points(self) -> f64 {
        match self {
            Grade::S => 10.0,
            Grade::A => 9.0,
            Grade::B => 8.0,
            Grade::C => 7.0,
            Grade::D => 6.0,
            Grade::E => 5.0,
            Grade::F => 0.0,
        }
    }
}

impl FromStr for Grade {
    type Err = PesuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "S" => Ok(Grade::S),
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "E" => Ok(Grade::E),
            "F" => Ok(Grade::F),
            other => Err(PesuError::InvalidQuery(format!("unknown grade: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseGrade {
    pub credits: f64,
    pub grade: Grade,
}

/// `<credits>:<grade>`, e.g. `4:A`.
impl FromStr for CourseGrade {
    type Err = PesuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (credits, grade) = value.split_once(':').ok_or_else(|| {
            PesuError::InvalidQuery(format!("expected <credits>:<grade>, got {value}"))
        })?;
        let credits = credits
            .trim()
            .parse::<f64>()
            .map_err(|_| PesuError::InvalidQuery(format!("invalid credits: {credits}")))?;
        Ok(CourseGrade {
            credits,
            grade: grade.parse()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemesterResult {
    pub credits: f64,
    pub sgpa: f64,
}

pub fn sgpa(courses: &[CourseGrade]) -> Result<f64, PesuError> {
    if let Some(course) = courses
        .iter()
        .find(|course| !(1.0..=12.0).contains(&course.credits))
    {
        return Err(PesuError::InvalidQuery(format!(
            "course credits must be within 1..=12, got {}",
            course.credits
        )));
    }
    weighted_mean(
        courses
            .iter()
            .map(|course| (course.credits, course.grade.points())),
    )
    .ok_or_else(|| PesuError::InvalidQuery("no courses given".to_string()))
}

/// Credit-weighted mean of semester SGPAs. Semesters without credits are
/// ignored, matching how the portal reports not-yet-graded terms.
pub fn cgpa(semesters: &[SemesterResult]) -> Option<f64> {
    weighted_mean(
        semesters
            .iter()
            .filter(|semester| semester.credits > 0.0)
            .map(|semester| (semester.credits, semester.sgpa)),
    )
}

/// Semesters from the cached GPA document, plus any manually entered ones.
pub fn projected_cgpa(doc: Option<&GpaDocument>, manual: &[SemesterResult]) -> Option<f64> {
    let mut semesters = doc
        .map(|doc| {
            doc.semesters
                .values()
                .map(|record| SemesterResult {
                    credits: record.earned_credits,
                    sgpa: record.sgpa,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    semesters.extend_from_slice(manual);
    cgpa(&semesters)
}

fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (weight, sum) = pairs.fold((0.0, 0.0), |(weight, sum), (credits, value)| {
        (weight + credits, sum + credits * value)
    });
    (weight > 0.0).then(|| round2(sum / weight))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

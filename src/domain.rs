use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PesuError;

pub type SubjectId = String;
pub type UnitId = String;
pub type ClassId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: ClassId,
    pub class_name: String,
    pub class_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    /// Label before the `:` in the portal's unit title, e.g. `Unit 1`.
    pub number: String,
    pub classes: Vec<ClassRecord>,
}

/// A subject and its units, in portal order. Unit ids are unique within a
/// subject and class ids are unique within a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
    pub units: Vec<Unit>,
}

impl Subject {
    pub fn semester(&self) -> Option<u8> {
        derived_semester(&self.code)
    }

    pub fn summary(&self) -> SubjectSummary {
        SubjectSummary {
            id: self.id.clone(),
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
}

/// Root of the cached subject tree. Replaced as a whole on every sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDocument {
    pub subjects: BTreeMap<SubjectId, Subject>,
    pub all_subjects_flat: Vec<SubjectSummary>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheDocument {
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            subjects: BTreeMap::new(),
            all_subjects_flat: Vec::new(),
            fetched_at,
        }
    }

    /// Subjects ordered by code, then name, then id.
    pub fn ordered_subjects(&self) -> Vec<&Subject> {
        let mut subjects = self.subjects.values().collect::<Vec<_>>();
        subjects.sort_by(|a, b| {
            a.code
                .cmp(&b.code)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        subjects
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: Option<String>,
    pub prn: Option<String>,
    pub srn: Option<String>,
    pub program: Option<String>,
    pub branch: Option<String>,
    pub semester: Option<String>,
    pub section: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub campus: Option<String>,
    pub campus_code: Option<u8>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self == &UserProfile::default()
    }

    /// Batch and branch encoded in the SRN (falling back to the PRN).
    pub fn batch(&self) -> Option<StudentBatch> {
        self.srn
            .as_deref()
            .and_then(|srn| srn.parse().ok())
            .or_else(|| self.prn.as_deref().and_then(|prn| prn.parse().ok()))
    }
}

static SRN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PES(\d)(UG|PG)(\d{2})([A-Z]+)\d+$").expect("valid SRN pattern")
});

/// Decoded `PES<campus><UG|PG><YY><BRANCH><ROLL>` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentBatch {
    pub campus: u8,
    pub level: String,
    pub batch: String,
    pub branch: String,
}

impl StudentBatch {
    pub fn admission_year(&self) -> u16 {
        2000 + self.batch.parse::<u16>().unwrap_or(0)
    }
}

impl FromStr for StudentBatch {
    type Err = PesuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let caps = SRN_RE
            .captures(&normalized)
            .ok_or_else(|| PesuError::parse("SRN", value))?;
        Ok(Self {
            campus: caps[1].parse().unwrap_or(0),
            level: caps[2].to_string(),
            batch: caps[3].to_string(),
            branch: caps[4].to_string(),
        })
    }
}

static SUBJECT_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]+)(\d{2})([A-Z]+)(\d)(\d)").expect("valid subject code pattern")
});

/// Parts of a subject code such as `UE22CS251A`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectCode {
    pub prefix: String,
    pub batch: String,
    pub branch: String,
    pub year_digit: u8,
    pub term_digit: u8,
}

impl SubjectCode {
    pub fn parse(code: &str) -> Option<Self> {
        let normalized = code.trim().to_uppercase();
        let caps = SUBJECT_CODE_RE.captures(&normalized)?;
        Some(Self {
            prefix: caps[1].to_string(),
            batch: caps[2].to_string(),
            branch: caps[3].to_string(),
            year_digit: caps[4].parse().ok()?,
            term_digit: caps[5].parse().ok()?,
        })
    }

    pub fn semester(&self) -> Option<u8> {
        if self.year_digit == 0 {
            return None;
        }
        let even = u8::from(self.term_digit >= 5);
        Some(2 * self.year_digit - 1 + even)
    }
}

/// Semester a subject is taught in, derived from its code alone.
///
/// The first digit after the branch is the year of study and a second digit
/// of 5 or more marks the even semester of that year.
pub fn derived_semester(code: &str) -> Option<u8> {
    SubjectCode::parse(code).and_then(|parsed| parsed.semester())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    /// Portal id used to request per-semester data.
    pub value: String,
    pub label: String,
    pub number: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterList {
    pub semesters: Vec<Semester>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaRecord {
    pub earned_credits: f64,
    pub total_credits: f64,
    pub sgpa: f64,
    pub cgpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaDocument {
    pub semesters: BTreeMap<String, GpaRecord>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub course_code: String,
    pub course_name: String,
    pub attended: Option<u32>,
    pub total: Option<u32>,
    pub percentage: Option<u32>,
    pub classes_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredential {
    pub token: String,
    pub obtained_at: DateTime<Utc>,
}

/// A faculty directory search result. `path` is the profile page, relative
/// to the directory host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyHit {
    pub path: String,
    pub name: String,
}

/// A faculty profile page, kept as labelled text the way the directory
/// renders it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyProfile {
    /// `Name`, `Designation` and `Image URL` when present.
    pub basic_info: BTreeMap<String, String>,
    /// Contact cards: label to value.
    pub sidebar: BTreeMap<String, String>,
    /// Tab name (lowercase) to section header to list items.
    pub tabs: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl FacultyProfile {
    pub fn is_empty(&self) -> bool {
        self.basic_info.is_empty() && self.sidebar.is_empty() && self.tabs.is_empty()
    }
}

/// Material type on the portal, identified by an opaque numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentCategory(pub u32);

impl ContentCategory {
    pub const SLIDES: ContentCategory = ContentCategory(2);
    pub const NOTES: ContentCategory = ContentCategory(3);
    pub const ASSIGNMENTS: ContentCategory = ContentCategory(5);
    pub const QUESTION_BANK: ContentCategory = ContentCategory(6);
    pub const QA: ContentCategory = ContentCategory(7);

    pub fn id(self) -> u32 {
        self.0
    }

    pub fn name(self) -> String {
        match self.0 {
            2 => "Slides".to_string(),
            3 => "Notes".to_string(),
            5 => "Assignments".to_string(),
            6 => "QB".to_string(),
            7 => "QA".to_string(),
            other => format!("Category_{other}"),
        }
    }

    /// Question bank and Q&A are published per subject, not per unit.
    pub fn is_unit_scoped(self) -> bool {
        !matches!(self, ContentCategory::QUESTION_BANK | ContentCategory::QA)
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ContentCategory {
    type Err = PesuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "slides" => Ok(ContentCategory::SLIDES),
            "notes" => Ok(ContentCategory::NOTES),
            "assignments" => Ok(ContentCategory::ASSIGNMENTS),
            "qb" | "question-bank" => Ok(ContentCategory::QUESTION_BANK),
            "qa" => Ok(ContentCategory::QA),
            _ => trimmed
                .parse::<u32>()
                .map(ContentCategory)
                .map_err(|_| PesuError::InvalidQuery(format!("unknown content category: {value}"))),
        }
    }
}

/// One selected leaf, carrying the display metadata used for archive paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    pub subject_id: SubjectId,
    pub subject_code: String,
    pub subject_name: String,
    pub unit_id: UnitId,
    pub unit_name: String,
    pub unit_number: usize,
    pub class_id: ClassId,
    pub class_name: String,
    pub class_index: usize,
}

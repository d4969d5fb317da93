//! Read-only projections of the cached subject tree.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{CacheDocument, DownloadItem, SemesterList, Subject, Unit};
use crate::error::PesuError;
use crate::selection::Selection;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SemesterFilter {
    #[default]
    All,
    Number(u8),
}

impl SemesterFilter {
    fn accepts(self, subject: &Subject) -> bool {
        match self {
            SemesterFilter::All => true,
            SemesterFilter::Number(number) => subject.semester() == Some(number),
        }
    }
}

impl FromStr for SemesterFilter {
    type Err = PesuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            return Ok(SemesterFilter::All);
        }
        value
            .trim_start_matches("Sem-")
            .parse::<u8>()
            .map(SemesterFilter::Number)
            .map_err(|_| PesuError::InvalidQuery(format!("invalid semester filter: {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Slices one zero-based page out of `items`. A zero limit is treated as one.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> Page<T> {
    let limit = limit.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(limit);
    let items = items
        .into_iter()
        .skip(page.saturating_mul(limit))
        .take(limit)
        .collect();
    Page {
        items,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages,
            has_next: page + 1 < total_pages,
            has_prev: page > 0,
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct NestedQuery {
    pub search: Option<String>,
    pub semester: SemesterFilter,
    pub page: usize,
    pub limit: usize,
}

impl NestedQuery {
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            ..Self::default()
        }
    }
}

struct Needle(Option<String>);

impl Needle {
    fn new(search: Option<&str>) -> Self {
        Self(
            search
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty()),
        )
    }

    fn matches(&self, fields: &[&str]) -> bool {
        match &self.0 {
            None => true,
            Some(needle) => fields
                .iter()
                .any(|field| field.to_lowercase().contains(needle.as_str())),
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// Subject tree filtered by semester and search, paginated over subjects.
///
/// Subjects match on their code or name, or through any unit name or class.
/// A matching subject is returned whole. Subjects without units are never
/// returned.
pub fn nested(doc: Option<&CacheDocument>, query: &NestedQuery) -> Page<Subject> {
    let needle = Needle::new(query.search.as_deref());
    let subjects = doc
        .map(|doc| doc.ordered_subjects())
        .unwrap_or_default()
        .into_iter()
        .filter(|subject| query.semester.accepts(subject))
        .filter(|subject| !subject.units.is_empty() && subject_matches(subject, &needle))
        .cloned()
        .collect::<Vec<_>>();
    paginate(subjects, query.page, query.limit)
}

fn subject_matches(subject: &Subject, needle: &Needle) -> bool {
    needle.is_empty()
        || needle.matches(&[&subject.code, &subject.name])
        || subject.units.iter().any(|unit| unit_matches(unit, needle))
}

fn unit_matches(unit: &Unit, needle: &Needle) -> bool {
    needle.matches(&[&unit.name])
        || unit
            .classes
            .iter()
            .any(|class| needle.matches(&[&class.class_name, &class.class_type]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatKind {
    Subjects,
    Units,
    Classes,
}

impl FromStr for FlatKind {
    type Err = PesuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "subjects" => Ok(FlatKind::Subjects),
            "units" => Ok(FlatKind::Units),
            "classes" => Ok(FlatKind::Classes),
            other => Err(PesuError::InvalidQuery(format!("unknown entity kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlatQuery {
    pub kind: FlatKind,
    pub subject_id: Option<String>,
    pub unit_id: Option<String>,
    pub search: Option<String>,
    pub page: usize,
    pub limit: usize,
}

impl FlatQuery {
    pub fn new(kind: FlatKind) -> Self {
        Self {
            kind,
            subject_id: None,
            unit_id: None,
            search: None,
            page: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatSubject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub unit_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatUnit {
    pub id: String,
    pub name: String,
    pub number: String,
    pub subject_id: String,
    pub subject_code: String,
    pub class_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatClass {
    pub id: String,
    pub class_name: String,
    pub class_type: String,
    pub subject_id: String,
    pub subject_code: String,
    pub unit_id: String,
    pub unit_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FlatRow {
    Subject(FlatSubject),
    Unit(FlatUnit),
    Class(FlatClass),
}

/// One entity kind as a flat list, optionally scoped to a subject and unit.
/// Scope ids that match nothing give an empty page.
pub fn flat(doc: Option<&CacheDocument>, query: &FlatQuery) -> Page<FlatRow> {
    let needle = Needle::new(query.search.as_deref());
    let subjects = doc
        .map(|doc| doc.ordered_subjects())
        .unwrap_or_default()
        .into_iter()
        .filter(|subject| {
            query
                .subject_id
                .as_deref()
                .is_none_or(|id| subject.id == id)
        });

    let mut rows = Vec::new();
    for subject in subjects {
        if query.kind == FlatKind::Subjects {
            if needle.matches(&[&subject.code, &subject.name]) {
                rows.push(FlatRow::Subject(FlatSubject {
                    id: subject.id.clone(),
                    code: subject.code.clone(),
                    name: subject.name.clone(),
                    unit_count: subject.units.len(),
                }));
            }
            continue;
        }
        let units = subject
            .units
            .iter()
            .filter(|unit| query.unit_id.as_deref().is_none_or(|id| unit.id == id));
        for unit in units {
            if query.kind == FlatKind::Units {
                if needle.matches(&[&unit.name, &subject.code]) {
                    rows.push(FlatRow::Unit(FlatUnit {
                        id: unit.id.clone(),
                        name: unit.name.clone(),
                        number: unit.number.clone(),
                        subject_id: subject.id.clone(),
                        subject_code: subject.code.clone(),
                        class_count: unit.classes.len(),
                    }));
                }
                continue;
            }
            for class in &unit.classes {
                if needle.matches(&[
                    &class.class_name,
                    &class.class_type,
                    &subject.code,
                    &unit.name,
                ]) {
                    rows.push(FlatRow::Class(FlatClass {
                        id: class.id.clone(),
                        class_name: class.class_name.clone(),
                        class_type: class.class_type.clone(),
                        subject_id: subject.id.clone(),
                        subject_code: subject.code.clone(),
                        unit_id: unit.id.clone(),
                        unit_name: unit.name.clone(),
                    }));
                }
            }
        }
    }
    paginate(rows, query.page, query.limit)
}

/// Full nested list, unfiltered and unpaginated.
pub fn all_subjects(doc: Option<&CacheDocument>) -> Vec<Subject> {
    doc.map(|doc| doc.ordered_subjects().into_iter().cloned().collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemesterOption {
    pub value: String,
    pub label: String,
}

/// Choices for the semester filter: "all" first, then each stored semester
/// number once. Falls back to 1..=8 when nothing is stored.
pub fn semester_options(semesters: Option<&SemesterList>) -> Vec<SemesterOption> {
    let mut numbers = semesters
        .map(|list| {
            list.semesters
                .iter()
                .map(|semester| semester.number)
                .filter(|number| *number > 0)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    numbers.sort_unstable();
    numbers.dedup();
    if numbers.is_empty() {
        numbers = (1..=8).collect();
    }

    std::iter::once(SemesterOption {
        value: "all".to_string(),
        label: "All Semesters".to_string(),
    })
    .chain(numbers.into_iter().map(|number| SemesterOption {
        value: number.to_string(),
        label: format!("Semester {number}"),
    }))
    .collect()
}

/// Resolves checked class ids into download items in tree order.
/// `unit_number` is the unit's position in its subject, `class_index` counts
/// selected classes within the unit. Both start at 1.
pub fn selected_items(doc: Option<&CacheDocument>, selection: &Selection) -> Vec<DownloadItem> {
    let Some(doc) = doc else {
        return Vec::new();
    };
    let mut items = Vec::new();
    for subject in doc.ordered_subjects() {
        for (unit_index, unit) in subject.units.iter().enumerate() {
            let mut class_index = 0;
            for class in &unit.classes {
                if !selection.is_selected(&class.id) {
                    continue;
                }
                class_index += 1;
                items.push(DownloadItem {
                    subject_id: subject.id.clone(),
                    subject_code: subject.code.clone(),
                    subject_name: subject.name.clone(),
                    unit_id: unit.id.clone(),
                    unit_name: unit.name.clone(),
                    unit_number: unit_index + 1,
                    class_id: class.id.clone(),
                    class_name: class.class_name.clone(),
                    class_index,
                });
            }
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_past_the_end_is_empty() {
        let page = paginate((0..45).collect::<Vec<_>>(), 2, 20);
        assert_eq!(page.items, (40..45).collect::<Vec<_>>());
        assert_eq!(page.pagination.total_pages, 3);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_prev);

        let page = paginate((0..45).collect::<Vec<_>>(), 3, 20);
        assert!(page.items.is_empty());
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn empty_input_has_zero_pages() {
        let page = paginate(Vec::<u8>::new(), 0, 10);
        assert_eq!(page.pagination.total, 0);
        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next);
        assert!(!page.pagination.has_prev);
    }

    #[test]
    fn semester_filter_parsing() {
        assert_eq!("all".parse::<SemesterFilter>().unwrap(), SemesterFilter::All);
        assert_eq!("".parse::<SemesterFilter>().unwrap(), SemesterFilter::All);
        assert_eq!(
            "Sem-3".parse::<SemesterFilter>().unwrap(),
            SemesterFilter::Number(3)
        );
        assert!("third".parse::<SemesterFilter>().is_err());
    }

    #[test]
    fn semester_options_fall_back_to_eight() {
        let options = semester_options(None);
        assert_eq!(options.len(), 9);
        assert_eq!(options[0].value, "all");
        assert_eq!(options[8].value, "8");
    }
}

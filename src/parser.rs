//! Stateless conversions from one portal payload to one structured record.
//!
//! The portal renders fragments server-side, so these are regex scrapers over
//! known markup. Each function either returns a record or an empty result; none
//! of them touch the network or the store.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::{
    AttendanceRecord, ClassRecord, FacultyHit, FacultyProfile, GpaRecord, Semester,
    SubjectSummary, UserProfile,
};
use crate::error::PesuError;
use crate::portal::RawPayload;

static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<option\b([^>]*)>(.*?)</option>"#).expect("valid option pattern")
});
static VALUE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bvalue\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid attr pattern")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));
static SEMESTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<option value="(\d+)">\s*(Sem-(\d+))\s*</option>"#)
        .expect("valid semester pattern")
});
static COURSEDOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)onclick\s*=\s*"[^"]*downloadcoursedoc\('([^']+)'[^"]*"[^>]*>([^<]*)"#)
        .expect("valid coursedoc pattern")
});
static IFRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)onclick\s*=\s*"[^"]*loadIframe\('([^']+)'[^"]*"[^>]*>([^<]*)"#)
        .expect("valid iframe pattern")
});
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*href\s*=\s*"([^"]*)"[^>]*>(.*?)</a>"#).expect("valid href pattern")
});
static PROFILE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<label[^>]*class="[^"]*lbl-title-light[^"]*"[^>]*>(.*?)</label>\s*<label[^>]*>(.*?)</label>"#,
    )
    .expect("valid profile pattern")
});
static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<input\b[^>]*>"#).expect("valid input pattern"));
static PRN_CAMPUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PES(\d)").expect("valid campus pattern"));
static H6_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h6[^>]*>(.*?)</h6>").expect("valid h6 pattern"));
static CREDITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)\s*/\s*([\d.]+)").expect("valid credits pattern"));
static ATTENDANCE_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<tbody[^>]*id\s*=\s*"subjetInfo"[^>]*>(.*?)</tbody>"#)
        .expect("valid tbody pattern")
});
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid row pattern"));
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("valid cell pattern"));
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").expect("valid anchor pattern"));
static HREF_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href attr pattern")
});
static CLASS_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid class pattern")
});
static DATA_BG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bdata-bg\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid data-bg pattern")
});
static H4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h4[^>]*>(.*?)</h4>").expect("valid h4 pattern"));
static H3_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h3[^>]*>(.*?)</h3>").expect("valid h3 pattern"));
static CARD_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)class\s*=\s*"[^"]*\bagent_card-title\b[^"]*"[^>]*>.*?<h4[^>]*>(.*?)</h4>"#)
        .expect("valid card title pattern")
});
static DESIGNATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)class\s*=\s*"[^"]*\bgeodir-category-location\b[^"]*"[^>]*>.*?<h5[^>]*>(.*?)</h5>"#,
    )
    .expect("valid designation pattern")
});
static FULL_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<[a-z][^>]*\bid\s*=\s*["']full-image["'][^>]*>"#)
        .expect("valid image pattern")
});
static ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<([a-z][a-z0-9]*)\b[^>]*>.*?</[a-z][a-z0-9]*>")
        .expect("valid element pattern")
});
static CONTACT_CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<(?:div|li|p)\b[^>]*class\s*=\s*"[^"]*\bcontat-card\b[^"]*"[^>]*>(.*?)</(?:div|li|p)>"#,
    )
    .expect("valid contact card pattern")
});
static SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<span\b[^>]*>(.*?)</span>").expect("valid span pattern"));
static TABS_MENU_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)class\s*=\s*"[^"]*\btabs-menu\b[^"]*"[^>]*>(.*?)</ul>"#)
        .expect("valid tabs menu pattern")
});
static BOOKINGS_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)class\s*=\s*"[^"]*\bbookings-item\b[^"]*""#).expect("valid section pattern")
});
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)</li>").expect("valid list item pattern"));
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("valid paragraph pattern"));

/// The record types a payload can be parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    SubjectList,
    UnitList,
    ClassList,
    SemesterList,
    UserProfile,
    Gpa,
    Attendance,
    DownloadLinks,
    FacultySearch,
    FacultyProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum Record {
    SubjectList(Vec<SubjectSummary>),
    UnitList(Vec<ParsedUnit>),
    ClassList(Vec<ClassRecord>),
    SemesterList(Vec<Semester>),
    UserProfile(Option<UserProfile>),
    Gpa(GpaRecord),
    Attendance(Vec<AttendanceRecord>),
    DownloadLinks(Vec<DownloadLink>),
    FacultySearch(Vec<FacultyHit>),
    FacultyProfile(FacultyProfile),
}

/// Dispatches a payload to the parser for `kind`.
pub fn parse(kind: RecordKind, payload: &RawPayload) -> Result<Record, PesuError> {
    let text = payload.html_text()?;
    let html = text.as_deref().unwrap_or("");
    Ok(match kind {
        RecordKind::SubjectList => Record::SubjectList(parse_subjects(html)),
        RecordKind::UnitList => Record::UnitList(parse_units(html)),
        RecordKind::ClassList => Record::ClassList(parse_classes(html)),
        RecordKind::SemesterList => Record::SemesterList(parse_semesters(html)),
        RecordKind::UserProfile => Record::UserProfile(parse_profile(html)),
        RecordKind::Gpa => Record::Gpa(parse_gpa(html)),
        RecordKind::Attendance => Record::Attendance(parse_attendance(html)),
        RecordKind::DownloadLinks => Record::DownloadLinks(parse_download_links(html)),
        RecordKind::FacultySearch => Record::FacultySearch(parse_faculty_search(html)),
        RecordKind::FacultyProfile => Record::FacultyProfile(parse_faculty_profile(html)),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedUnit {
    pub id: String,
    pub name: String,
    pub number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    CourseDoc,
    SlideCourseDoc,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub url: String,
    pub kind: LinkKind,
    pub display_name: Option<String>,
}

pub fn parse_subjects(html: &str) -> Vec<SubjectSummary> {
    options(html)
        .into_iter()
        .filter(|(id, _)| !id.is_empty())
        .map(|(id, text)| {
            let code = text.split('-').next().unwrap_or("").trim().to_string();
            SubjectSummary {
                id,
                code,
                name: text,
            }
        })
        .collect()
}

pub fn parse_units(html: &str) -> Vec<ParsedUnit> {
    options(html)
        .into_iter()
        .filter(|(id, name)| !id.is_empty() && !name.is_empty())
        .map(|(id, name)| {
            let number = match name.split_once(':') {
                Some((number, _)) => number.trim().to_string(),
                None => name.clone(),
            };
            ParsedUnit { id, name, number }
        })
        .collect()
}

pub fn parse_classes(html: &str) -> Vec<ClassRecord> {
    options(html)
        .into_iter()
        .filter(|(id, name)| !id.is_empty() && !name.is_empty())
        .map(|(id, class_name)| ClassRecord {
            id,
            class_name,
            class_type: "Lecture".to_string(),
        })
        .collect()
}

pub fn parse_semesters(html: &str) -> Vec<Semester> {
    SEMESTER_RE
        .captures_iter(html)
        .filter_map(|caps| {
            Some(Semester {
                value: caps[1].to_string(),
                label: caps[2].to_string(),
                number: caps[3].parse().ok()?,
            })
        })
        .collect()
}

pub fn parse_profile(html: &str) -> Option<UserProfile> {
    if html.trim().is_empty() || !html.contains("elem-info-wrapper") {
        return None;
    }

    let mut profile = UserProfile::default();
    for caps in PROFILE_PAIR_RE.captures_iter(html) {
        let key = text_content(&caps[1]);
        let value = text_content(&caps[2]);
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let slot = match key.as_str() {
            "Name" => &mut profile.name,
            "PRN" => &mut profile.prn,
            "SRN" => &mut profile.srn,
            "Program" => &mut profile.program,
            "Branch" => &mut profile.branch,
            "Semester" => &mut profile.semester,
            "Section" => &mut profile.section,
            _ => continue,
        };
        *slot = Some(value);
    }

    profile.email = input_value(html, "updateMail");
    profile.phone = input_value(html, "updateContact");

    if let Some(prn) = profile.prn.as_deref() {
        if let Some(caps) = PRN_CAMPUS_RE.captures(prn) {
            let code = caps[1].parse::<u8>().ok();
            profile.campus_code = code;
            profile.campus = match code {
                Some(1) => Some("RR".to_string()),
                Some(2) => Some("EC".to_string()),
                _ => None,
            };
        }
    }

    (!profile.is_empty()).then_some(profile)
}

/// Reads the dashboard info bar: each `<div>` holds an `<h6>` label and the
/// value as its own text.
pub fn parse_gpa(html: &str) -> GpaRecord {
    let mut record = GpaRecord::default();
    for chunk in html.split("</div>") {
        let Some(start) = chunk.rfind("<div") else {
            continue;
        };
        let inner = &chunk[start..];
        let Some(label) = H6_RE.captures(inner).map(|caps| text_content(&caps[1])) else {
            continue;
        };
        let value = text_content(&H6_RE.replace_all(inner, " "));
        match label.as_str() {
            "Earned Credits" => {
                if let Some(caps) = CREDITS_RE.captures(&value) {
                    record.earned_credits = caps[1].parse().unwrap_or(0.0);
                    record.total_credits = caps[2].parse().unwrap_or(0.0);
                }
            }
            "SGPA" => record.sgpa = value.parse().unwrap_or(0.0),
            "CGPA" => record.cgpa = value.parse().unwrap_or(0.0),
            _ => {}
        }
    }
    record
}

pub fn parse_attendance(html: &str) -> Vec<AttendanceRecord> {
    let Some(body) = ATTENDANCE_BODY_RE.captures(html) else {
        return Vec::new();
    };
    ROW_RE
        .captures_iter(&body[1])
        .filter_map(|row| {
            let cells = CELL_RE
                .captures_iter(&row[1])
                .map(|cell| text_content(&cell[1]))
                .collect::<Vec<_>>();
            if cells.len() < 4 {
                return None;
            }
            let classes_text = cells[2].clone();
            let (attended, total) = match classes_text.split_once('/') {
                Some((attended, total)) if classes_text != "NA" => {
                    (attended.trim().parse().ok(), total.trim().parse().ok())
                }
                _ => (None, None),
            };
            Some(AttendanceRecord {
                course_code: cells[0].clone(),
                course_name: cells[1].clone(),
                attended,
                total,
                percentage: cells[3].parse().ok(),
                classes_text,
            })
        })
        .collect()
}

/// Collects every download link on a material page, deduplicated by URL.
pub fn parse_download_links(html: &str) -> Vec<DownloadLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    let mut push = |url: String, kind: LinkKind, name: &str| {
        if seen.insert(url.clone()) {
            let name = text_content(name);
            links.push(DownloadLink {
                url,
                kind,
                display_name: (!name.is_empty()).then_some(name),
            });
        }
    };

    for caps in COURSEDOC_RE.captures_iter(html) {
        push(
            format!("/Academy/s/referenceMeterials/downloadcoursedoc/{}", &caps[1]),
            LinkKind::CourseDoc,
            &caps[2],
        );
    }

    for caps in IFRAME_RE.captures_iter(html) {
        if caps[0].contains("downloadslidecoursedoc") {
            push(strip_fragment(&caps[1]), LinkKind::SlideCourseDoc, &caps[2]);
        }
    }

    for caps in HREF_RE.captures_iter(html) {
        let href = &caps[1];
        if href.contains("downloadslidecoursedoc") || href.contains("downloadcoursedoc") {
            push(strip_fragment(href), LinkKind::Direct, &caps[2]);
        }
    }

    links
}

/// Profile links from the faculty directory's A-Z search page.
pub fn parse_faculty_search(html: &str) -> Vec<FacultyHit> {
    let mut seen = HashSet::new();
    ANCHOR_RE
        .captures_iter(html)
        .filter(|caps| has_class(&caps[1], "chat-contacts-item"))
        .filter_map(|caps| {
            let path = attr(&caps[1], &HREF_ATTR_RE)?;
            let name = H4_RE
                .captures(&caps[2])
                .map(|name| text_content(&name[1]))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| text_content(&caps[2]));
            seen.insert(path.clone()).then_some(FacultyHit { path, name })
        })
        .collect()
}

pub fn parse_faculty_profile(html: &str) -> FacultyProfile {
    let mut basic_info = BTreeMap::new();
    if let Some(name) = first_text(&CARD_TITLE_RE, html) {
        basic_info.insert("Name".to_string(), name);
    }
    let designation = DESIGNATION_RE
        .captures(html)
        .map(|caps| text_content(&ELEMENT_RE.replace_all(&caps[1], " ")))
        .filter(|text| !text.is_empty());
    if let Some(designation) = designation {
        basic_info.insert("Designation".to_string(), designation);
    }
    let image = FULL_IMAGE_RE
        .find(html)
        .and_then(|tag| attr(tag.as_str(), &DATA_BG_RE));
    if let Some(image) = image {
        basic_info.insert("Image URL".to_string(), image);
    }

    let mut sidebar = BTreeMap::new();
    for caps in CONTACT_CARD_RE.captures_iter(html) {
        let label = SPAN_RE
            .captures_iter(&caps[1])
            .map(|span| text_content(&span[1]))
            .collect::<Vec<_>>()
            .join(" ");
        let value = text_content(&SPAN_RE.replace_all(&caps[1], " "));
        if !label.is_empty() && !value.is_empty() {
            sidebar.insert(label, value);
        }
    }

    FacultyProfile {
        basic_info,
        sidebar,
        tabs: profile_tabs(html),
    }
}

/// Tabs come from the `tabs-menu` anchors; each tab's content runs from its
/// `id` to the next tab's. Inside, every `bookings-item` section maps its
/// `h3` headers to the section's list paragraphs.
fn profile_tabs(html: &str) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    let Some(menu) = TABS_MENU_RE.captures(html) else {
        return BTreeMap::new();
    };
    let entries = ANCHOR_RE
        .captures_iter(&menu[1])
        .filter_map(|caps| {
            let target = attr(&caps[1], &HREF_ATTR_RE)?;
            let id = target.strip_prefix('#')?.to_string();
            Some((text_content(&caps[2]).to_lowercase(), id))
        })
        .collect::<Vec<_>>();
    let starts = entries
        .iter()
        .map(|(_, id)| element_position(html, id))
        .collect::<Vec<_>>();

    let mut tabs = BTreeMap::new();
    for ((name, _), start) in entries.iter().zip(&starts) {
        let Some(start) = *start else {
            continue;
        };
        let end = starts
            .iter()
            .flatten()
            .copied()
            .filter(|other| *other > start)
            .min()
            .unwrap_or(html.len());
        let sections = tab_sections(&html[start..end]);
        if !name.is_empty() && !sections.is_empty() {
            tabs.insert(name.clone(), sections);
        }
    }
    tabs
}

fn tab_sections(content: &str) -> BTreeMap<String, Vec<String>> {
    let starts = BOOKINGS_ITEM_RE
        .find_iter(content)
        .map(|found| found.start())
        .collect::<Vec<_>>();
    let mut sections = BTreeMap::new();
    for (position, start) in starts.iter().enumerate() {
        let end = starts.get(position + 1).copied().unwrap_or(content.len());
        let section = &content[*start..end];
        let items = LIST_ITEM_RE
            .captures_iter(section)
            .flat_map(|item| {
                PARAGRAPH_RE
                    .captures_iter(&item[1])
                    .map(|paragraph| text_content(&paragraph[1]))
                    .collect::<Vec<_>>()
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>();
        if items.is_empty() {
            continue;
        }
        for header in H3_RE.captures_iter(section) {
            let header = text_content(&header[1]);
            if !header.is_empty() {
                sections.insert(header, items.clone());
            }
        }
    }
    sections
}

fn element_position(html: &str, id: &str) -> Option<usize> {
    [format!(r#"id="{id}""#), format!("id='{id}'")]
        .iter()
        .filter_map(|needle| html.find(needle.as_str()))
        .min()
}

fn attr(attrs: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(attrs)
        .and_then(|caps| caps.get(1).or(caps.get(2)))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn has_class(attrs: &str, class: &str) -> bool {
    attr(attrs, &CLASS_ATTR_RE)
        .map(|classes| classes.split_whitespace().any(|name| name == class))
        .unwrap_or(false)
}

fn first_text(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures(html)
        .map(|caps| text_content(&caps[1]))
        .filter(|text| !text.is_empty())
}

/// Resolves a material link against the portal base URL (the `.../Academy`
/// root). Rooted paths keep only the base's origin.
pub fn resolve_download_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{}{url}", origin(base_url))
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

fn origin(url: &str) -> &str {
    let host_start = url.find("://").map_or(0, |index| index + 3);
    match url[host_start..].find('/') {
        Some(index) => &url[..host_start + index],
        None => url,
    }
}

/// Strips tags, decodes the common entities and collapses whitespace.
pub fn text_content(fragment: &str) -> String {
    let without_tags = TAG_RE.replace_all(fragment, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn options(html: &str) -> Vec<(String, String)> {
    OPTION_RE
        .captures_iter(html)
        .map(|caps| {
            let id = VALUE_ATTR_RE
                .captures(&caps[1])
                .and_then(|value| value.get(1).or(value.get(2)).or(value.get(3)))
                .map(|value| clean_id(value.as_str()))
                .unwrap_or_default();
            (id, text_content(&caps[2]))
        })
        .collect()
}

fn clean_id(id: &str) -> String {
    id.trim()
        .replace('\\', "")
        .trim_matches(|ch| ch == '"' || ch == '\'')
        .to_string()
}

fn input_value(html: &str, id: &str) -> Option<String> {
    let id_attr = Regex::new(&format!(r#"(?i)\bid\s*=\s*["']{}["']"#, regex::escape(id))).ok()?;
    INPUT_RE
        .find_iter(html)
        .map(|tag| tag.as_str())
        .find(|tag| id_attr.is_match(tag))
        .and_then(|tag| VALUE_ATTR_RE.captures(tag))
        .and_then(|caps| caps.get(1).or(caps.get(2)).or(caps.get(3)))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn strip_fragment(url: &str) -> String {
    url.split('#').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_from_options() {
        let html = r#"<option value=" 20974 ">UE22CS251A - Data Structures</option>
            <option value='20975'>UE22MA241B-Linear Algebra</option>
            <option value="">Select</option>"#;
        let subjects = parse_subjects(html);
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].id, "20974");
        assert_eq!(subjects[0].code, "UE22CS251A");
        assert_eq!(subjects[0].name, "UE22CS251A - Data Structures");
        assert_eq!(subjects[1].code, "UE22MA241B");
    }

    #[test]
    fn units_and_classes() {
        let units = parse_units(
            r#"<option value="u1">Unit 1: Linked Lists</option><option value="u2">Trees</option>"#,
        );
        assert_eq!(units[0].number, "Unit 1");
        assert_eq!(units[1].number, "Trees");

        let classes = parse_classes(r#"<option value="c1">Intro &amp; Setup</option>"#);
        assert_eq!(classes[0].class_name, "Intro & Setup");
        assert_eq!(classes[0].class_type, "Lecture");
    }

    #[test]
    fn semesters() {
        let semesters = parse_semesters(
            r#"<option value="1021">Sem-3</option><option value="1022">Sem-4</option>"#,
        );
        assert_eq!(semesters.len(), 2);
        assert_eq!(semesters[1].value, "1022");
        assert_eq!(semesters[1].number, 4);
    }

    #[test]
    fn profile_fields() {
        let html = r#"<div class="elem-info-wrapper">
            <div class="form-group"><label class="lbl-title-light">Name</label><label>Asha Rao</label></div>
            <div class="form-group"><label class="lbl-title-light">PRN</label><label>PES2202200123</label></div>
            <div class="form-group"><label class="lbl-title-light">SRN</label><label>PES2UG22CS123</label></div>
            <div class="form-group"><label class="lbl-title-light">Branch</label><label>CSE</label></div>
            </div>
            <input type="text" value="asha@example.com" id="updateMail">
            <input id="updateContact" value="9999999999">"#;
        let profile = parse_profile(html).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Asha Rao"));
        assert_eq!(profile.srn.as_deref(), Some("PES2UG22CS123"));
        assert_eq!(profile.email.as_deref(), Some("asha@example.com"));
        assert_eq!(profile.phone.as_deref(), Some("9999999999"));
        assert_eq!(profile.campus.as_deref(), Some("EC"));
        assert_eq!(profile.campus_code, Some(2));
        assert!(parse_profile("<p>login</p>").is_none());
    }

    #[test]
    fn gpa_info_bar() {
        let html = r#"<div class="info-contents"><div class="dashboard-info-bar">
            <div><h6>Earned Credits</h6>21 / 24</div>
            <div><h6>SGPA</h6>8.65</div>
            <div><h6>CGPA</h6> 8.4 </div>
            </div></div>"#;
        let gpa = parse_gpa(html);
        assert_eq!(gpa.earned_credits, 21.0);
        assert_eq!(gpa.total_credits, 24.0);
        assert_eq!(gpa.sgpa, 8.65);
        assert_eq!(gpa.cgpa, 8.4);
        assert_eq!(parse_gpa(""), GpaRecord::default());
    }

    #[test]
    fn attendance_rows() {
        let html = r#"<table><tbody id="subjetInfo">
            <tr><td>UE22CS251A</td><td>DS</td><td>65/80</td><td>81</td></tr>
            <tr><td>UE22MA241B</td><td>LA</td><td>NA</td><td>NA</td></tr>
            <tr><td>short</td></tr>
            </tbody></table>"#;
        let rows = parse_attendance(html);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].attended, Some(65));
        assert_eq!(rows[0].total, Some(80));
        assert_eq!(rows[0].percentage, Some(81));
        assert_eq!(rows[1].attended, None);
        assert_eq!(rows[1].percentage, None);
    }

    #[test]
    fn download_links_are_collected_once() {
        let html = r#"
            <a href="javascript:void(0)" onclick="downloadcoursedoc('abc-1', 'x')">Lecture 1 Notes</a>
            <div onclick="loadIframe('/Academy/s/referenceMeterials/downloadslidecoursedoc/77#view=1')"></div>
            <a href="/Academy/s/referenceMeterials/downloadslidecoursedoc/77#page=2">Deck</a>
            <a href="/Academy/other">Other</a>"#;
        let links = parse_download_links(html);
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].url,
            "/Academy/s/referenceMeterials/downloadcoursedoc/abc-1"
        );
        assert_eq!(links[0].display_name.as_deref(), Some("Lecture 1 Notes"));
        assert_eq!(links[1].kind, LinkKind::SlideCourseDoc);
        assert_eq!(
            links[1].url,
            "/Academy/s/referenceMeterials/downloadslidecoursedoc/77"
        );
    }

    #[test]
    fn resolve_urls() {
        let base = "https://www.pesuacademy.com/Academy";
        assert_eq!(
            resolve_download_url(base, "/Academy/s/x"),
            "https://www.pesuacademy.com/Academy/s/x"
        );
        assert_eq!(resolve_download_url(base, "https://cdn/x"), "https://cdn/x");
        assert_eq!(
            resolve_download_url(base, "s/x"),
            "https://www.pesuacademy.com/Academy/s/x"
        );
    }

    #[test]
    fn resolve_urls_follow_the_configured_host() {
        let base = "http://localhost:9000/Academy/";
        assert_eq!(
            resolve_download_url(base, "/Academy/s/referenceMeterials/downloadcoursedoc/1"),
            "http://localhost:9000/Academy/s/referenceMeterials/downloadcoursedoc/1"
        );
        assert_eq!(
            resolve_download_url(base, "s/x"),
            "http://localhost:9000/Academy/s/x"
        );
        assert_eq!(
            resolve_download_url("http://localhost:9000", "/s/x"),
            "http://localhost:9000/s/x"
        );
    }

    #[test]
    fn faculty_hits_come_from_contact_links() {
        let html = r#"<div class="staff-list">
            <a class="chat-contacts-item" href="/dr-ananya-rao">
                <div class="photo"></div><h4>Dr. Ananya Rao</h4><p>CSE</p>
            </a>
            <a href="/about">About</a>
            <a class="chat-contacts-item active" href='/prof-kiran'>Prof. Kiran</a>
            <a class="chat-contacts-item" href="/dr-ananya-rao"><h4>Duplicate</h4></a>
        </div>"#;
        let hits = parse_faculty_search(html);
        assert_eq!(
            hits,
            vec![
                FacultyHit {
                    path: "/dr-ananya-rao".to_string(),
                    name: "Dr. Ananya Rao".to_string(),
                },
                FacultyHit {
                    path: "/prof-kiran".to_string(),
                    name: "Prof. Kiran".to_string(),
                },
            ]
        );
        assert!(parse_faculty_search("<p>No results</p>").is_empty());
    }

    #[test]
    fn faculty_profile_sections() {
        let html = r##"
            <div class="agent_card-title"><h4>Dr. Ananya Rao</h4></div>
            <div class="geodir-category-location"><h5>Professor <span>CSE</span></h5></div>
            <div class="bg" id="full-image" data-bg="https://staff.pes.edu/img/rao.jpg"></div>
            <div class="contat-card"><span>Email</span> ananya&#39;s@pes.edu</div>
            <div class="contat-card"><span>Campus</span> RR Campus</div>
            <ul class="tabs-menu">
                <li><a href="#tab-1">Education</a></li>
                <li><a href="#tab-2">Research</a></li>
            </ul>
            <div id="tab-1">
                <div class="bookings-item"><h3>Degrees</h3>
                    <ul><li><p>PhD, IISc</p></li><li><p>M.Tech</p></li></ul>
                </div>
            </div>
            <div id="tab-2">
                <div class="bookings-item"><h3>Interests</h3>
                    <ul><li><p>Databases</p></li></ul>
                </div>
                <div class="bookings-item"><h3>Empty</h3></div>
            </div>"##;
        let profile = parse_faculty_profile(html);
        assert_eq!(profile.basic_info["Name"], "Dr. Ananya Rao");
        assert_eq!(profile.basic_info["Designation"], "Professor");
        assert_eq!(
            profile.basic_info["Image URL"],
            "https://staff.pes.edu/img/rao.jpg"
        );
        assert_eq!(profile.sidebar["Email"], "ananya's@pes.edu");
        assert_eq!(profile.sidebar["Campus"], "RR Campus");
        assert_eq!(
            profile.tabs["education"]["Degrees"],
            vec!["PhD, IISc", "M.Tech"]
        );
        assert_eq!(profile.tabs["research"]["Interests"], vec!["Databases"]);
        assert!(!profile.tabs["research"].contains_key("Empty"));
        assert!(parse_faculty_profile("<html></html>").is_empty());
    }
}

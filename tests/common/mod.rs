#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use lopdf::{Dictionary, Document, Object};
use pesu_sync::config::DEFAULT_BASE_URL;
use pesu_sync::error::PesuError;
use pesu_sync::portal::{CredentialProvider, Endpoint, PortalClient, RawPayload};

pub const SESSION: &str = "test-session";

/// Scripted portal: responses are keyed by [`endpoint_key`] or by URL.
/// Anything unscripted answers 404.
#[derive(Default)]
pub struct MockPortal {
    responses: Mutex<HashMap<String, RawPayload>>,
    failures: Mutex<HashMap<String, u16>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    base_url: Option<String>,
}

impl MockPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: Some(base_url.to_string()),
            ..Self::default()
        }
    }

    pub fn respond(&self, key: &str, payload: RawPayload) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), payload);
    }

    pub fn fail(&self, key: &str, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), status);
    }

    pub fn calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn answer(&self, key: String) -> Result<RawPayload, PesuError> {
        self.calls.lock().unwrap().push(key.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.failures.lock().unwrap().get(&key).copied() {
            return Err(PesuError::PortalStatus {
                status,
                message: "scripted failure".to_string(),
            });
        }
        let response = self.responses.lock().unwrap().get(&key).cloned();
        response.ok_or(PesuError::PortalStatus {
            status: 404,
            message: format!("no scripted response for {key}"),
        })
    }
}

pub fn endpoint_key(endpoint: &Endpoint) -> String {
    match endpoint {
        Endpoint::UserProfile => "profile".to_string(),
        Endpoint::SubjectList => "subjects".to_string(),
        Endpoint::CourseUnits { subject_id } => format!("units:{subject_id}"),
        Endpoint::UnitClasses { unit_id } => format!("classes:{unit_id}"),
        Endpoint::SemesterList => "semesters".to_string(),
        Endpoint::SemesterGpa { semester_id } => format!("gpa:{semester_id}"),
        Endpoint::Attendance { semester_id } => format!("attendance:{semester_id}"),
        Endpoint::CourseMaterial {
            subject_id,
            class_id,
            category,
        } => format!("material:{subject_id}:{class_id}:{}", category.id()),
        Endpoint::FacultySearch { query } => format!("faculty-search:{query}"),
        Endpoint::FacultyProfile { path } => format!("faculty:{path}"),
    }
}

impl PortalClient for MockPortal {
    async fn fetch(&self, session: &str, endpoint: &Endpoint) -> Result<RawPayload, PesuError> {
        if endpoint.needs_session() {
            assert_eq!(session, SESSION);
        }
        self.answer(endpoint_key(endpoint)).await
    }

    async fn fetch_url(&self, session: &str, url: &str) -> Result<RawPayload, PesuError> {
        assert_eq!(session, SESSION);
        self.answer(format!("url:{url}")).await
    }

    fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

#[derive(Default)]
pub struct MockCredentials {
    pub token: Option<String>,
    calls: Mutex<usize>,
}

impl MockCredentials {
    pub fn logged_in() -> Self {
        Self {
            token: Some(SESSION.to_string()),
            calls: Mutex::new(0),
        }
    }

    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CredentialProvider for MockCredentials {
    async fn session(&self) -> Option<String> {
        *self.calls.lock().unwrap() += 1;
        self.token.clone()
    }
}

pub const PROFILE_HTML: &str = r#"<div class="elem-info-wrapper">
    <div><label class="lbl-title-light">Name</label><label>Asha Rao</label></div>
    <div><label class="lbl-title-light">PRN</label><label>PES1202200123</label></div>
    <div><label class="lbl-title-light">SRN</label><label>PES1UG22CS123</label></div>
    <div><label class="lbl-title-light">Branch</label><label>CSE</label></div>
</div>"#;

pub const SUBJECTS_HTML: &str = r#"<option value="">Select</option>
<option value="101">UE22CS251A - Database Management Systems</option>
<option value="102">UE22MA151A - Engineering Mathematics</option>
<option value="103">UE22EC251A - Signals</option>"#;

pub fn options(entries: &[(&str, &str)]) -> RawPayload {
    let html = entries
        .iter()
        .map(|(id, text)| format!(r#"<option value="{id}">{text}</option>"#))
        .collect::<String>();
    RawPayload::json_string(&html)
}

/// Profile, subject list, semesters and a two-subject tree:
/// 101 has units 1a (classes c1, c2) and 1b (class c3); 102 has unit 2a
/// (class c4). Subject 103 belongs to another branch and is never fetched.
pub fn script_full_portal(portal: &MockPortal) {
    portal.respond("profile", RawPayload::html(PROFILE_HTML));
    portal.respond("subjects", RawPayload::html(SUBJECTS_HTML));
    portal.respond(
        "units:101",
        options(&[("1a", "Unit 1: Relational Model"), ("1b", "Unit 2: SQL")]),
    );
    portal.respond("units:102", options(&[("2a", "Unit 1: Calculus")]));
    portal.respond(
        "classes:1a",
        options(&[("c1", "Introduction"), ("c2", "Keys and Constraints")]),
    );
    portal.respond("classes:1b", options(&[("c3", "Joins")]));
    portal.respond("classes:2a", options(&[("c4", "Limits")]));
    portal.respond(
        "semesters",
        RawPayload::html(r#"<option value="901">Sem-1</option><option value="902">Sem-2</option>"#),
    );
    portal.respond(
        "gpa:901",
        RawPayload::html(
            r#"<div><h6>Earned Credits</h6>20 / 20</div><div><h6>SGPA</h6>9.0</div><div><h6>CGPA</h6>9.0</div>"#,
        ),
    );
    portal.respond(
        "gpa:902",
        RawPayload::html(
            r#"<div><h6>Earned Credits</h6>20 / 20</div><div><h6>SGPA</h6>8.0</div><div><h6>CGPA</h6>8.5</div>"#,
        ),
    );
}

/// A PDF of `pages` blank A4 pages.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let tree_id = doc.new_object_id();
    let kids = (0..pages)
        .map(|_| {
            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(tree_id));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ]),
            );
            Object::Reference(doc.add_object(Object::Dictionary(page)))
        })
        .collect::<Vec<_>>();
    let mut tree = Dictionary::new();
    tree.set("Type", Object::Name(b"Pages".to_vec()));
    tree.set("Count", Object::Integer(pages as i64));
    tree.set("Kids", Object::Array(kids));
    doc.objects.insert(tree_id, Object::Dictionary(tree));
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(tree_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn page_count(pdf: &[u8]) -> usize {
    Document::load_mem(pdf).unwrap().get_pages().len()
}

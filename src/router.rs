//! Transport-free request handling: one request in, one response out, with an
//! optional progress channel for downloads.

use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::archive;
use crate::calc::{self, AttendanceProjection, CourseGrade, SemesterResult};
use crate::domain::{
    AttendanceRecord, CacheDocument, ContentCategory, FacultyHit, FacultyProfile, GpaDocument,
    Semester, SemesterList, Subject,
};
use crate::download::{
    DownloadEngine, DownloadOptions, DownloadStats, NoProgress, ProgressEvent, ProgressSink,
};
use crate::error::PesuError;
use crate::parser;
use crate::portal::{CredentialProvider, Endpoint, PortalClient};
use crate::selection::Selection;
use crate::store::{KeyValueStore, keys, load_record};
use crate::sync::{ReconcileReport, SyncOrchestrator};
use crate::view::{self, FlatQuery, FlatRow, NestedQuery, Page, SemesterOption};

#[derive(Debug, Clone)]
pub enum Request {
    GetNested(NestedQuery),
    GetFlat(FlatQuery),
    GetAll,
    GetSemesters,
    GetGpa,
    GetAttendance { semester_id: String, target: u32 },
    /// SGPA for hypothetical grades, and the CGPA it would give on top of the
    /// cached semesters.
    CalculateSgpa { courses: Vec<CourseGrade> },
    FacultySearch { query: String },
    /// First search hit with its profile page.
    FacultyDetails { query: String },
    TriggerSync,
    Download {
        selection: Selection,
        categories: Vec<ContentCategory>,
        options: DownloadOptions,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub projection: Option<AttendanceProjection>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Response {
    Nested(Page<Subject>),
    Flat(Page<FlatRow>),
    All(Vec<Subject>),
    #[serde(rename_all = "camelCase")]
    Semesters {
        semesters: Vec<Semester>,
        options: Vec<SemesterOption>,
    },
    #[serde(rename_all = "camelCase")]
    Gpa {
        gpa: Option<GpaDocument>,
        cgpa: Option<f64>,
    },
    Attendance(Vec<AttendanceRow>),
    #[serde(rename_all = "camelCase")]
    Sgpa {
        sgpa: f64,
        projected_cgpa: Option<f64>,
    },
    FacultyHits(Vec<FacultyHit>),
    #[serde(rename_all = "camelCase")]
    Faculty {
        hit: FacultyHit,
        profile: FacultyProfile,
    },
    NoFacultyMatch,
    Synced(Vec<ReconcileReport>),
    #[serde(rename_all = "camelCase")]
    Downloaded {
        archive_path: Utf8PathBuf,
        files: Vec<String>,
        stats: DownloadStats,
    },
}

pub struct Router<P, S, C> {
    orchestrator: Arc<SyncOrchestrator<P, S, C>>,
    portal: Arc<P>,
    engine: DownloadEngine<P>,
    output_dir: Utf8PathBuf,
}

impl<P, S, C> Router<P, S, C>
where
    P: PortalClient + 'static,
    S: KeyValueStore,
    C: CredentialProvider,
{
    pub fn new(
        orchestrator: Arc<SyncOrchestrator<P, S, C>>,
        portal: Arc<P>,
        download_concurrency: usize,
        output_dir: Utf8PathBuf,
    ) -> Self {
        let engine = DownloadEngine::new(Arc::clone(&portal), download_concurrency);
        Self {
            orchestrator,
            portal,
            engine,
            output_dir,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator<P, S, C>> {
        &self.orchestrator
    }

    pub async fn handle(
        &self,
        request: Request,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Result<Response, PesuError> {
        let store = self.orchestrator.store().as_ref();
        match request {
            Request::GetNested(query) => {
                let doc = load_record::<_, CacheDocument>(store, keys::TREE).await?;
                Ok(Response::Nested(view::nested(doc.as_ref(), &query)))
            }
            Request::GetFlat(query) => {
                let doc = load_record::<_, CacheDocument>(store, keys::TREE).await?;
                Ok(Response::Flat(view::flat(doc.as_ref(), &query)))
            }
            Request::GetAll => {
                let doc = load_record::<_, CacheDocument>(store, keys::TREE).await?;
                Ok(Response::All(view::all_subjects(doc.as_ref())))
            }
            Request::GetSemesters => {
                let list = load_record::<_, SemesterList>(store, keys::SEMESTERS).await?;
                let options = view::semester_options(list.as_ref());
                Ok(Response::Semesters {
                    semesters: list.map(|list| list.semesters).unwrap_or_default(),
                    options,
                })
            }
            Request::GetGpa => {
                let gpa = load_record::<_, GpaDocument>(store, keys::GPA).await?;
                let cgpa = calc::projected_cgpa(gpa.as_ref(), &[]);
                Ok(Response::Gpa { gpa, cgpa })
            }
            Request::GetAttendance {
                semester_id,
                target,
            } => self.attendance(semester_id, target).await,
            Request::CalculateSgpa { courses } => {
                let sgpa = calc::sgpa(&courses)?;
                let gpa = load_record::<_, GpaDocument>(store, keys::GPA).await?;
                let credits = courses.iter().map(|course| course.credits).sum::<f64>();
                let projected_cgpa =
                    calc::projected_cgpa(gpa.as_ref(), &[SemesterResult { credits, sgpa }]);
                Ok(Response::Sgpa {
                    sgpa,
                    projected_cgpa,
                })
            }
            Request::FacultySearch { query } => {
                Ok(Response::FacultyHits(self.faculty_search(query).await?))
            }
            Request::FacultyDetails { query } => self.faculty_details(query).await,
            Request::TriggerSync => {
                let reports = self.orchestrator.reconcile_settled().await?;
                Ok(Response::Synced(reports))
            }
            Request::Download {
                selection,
                categories,
                options,
            } => {
                let sink: &dyn ProgressSink = match progress {
                    Some(sender) => sender,
                    None => &NoProgress,
                };
                self.download(&selection, &categories, options, sink).await
            }
        }
    }

    /// A row whose counts cannot be projected (attended above total) is
    /// returned without a projection.
    async fn attendance(&self, semester_id: String, target: u32) -> Result<Response, PesuError> {
        calc::validate_target(target)?;
        let session = self.orchestrator.current_session().await?;
        let payload = self
            .portal
            .fetch(&session, &Endpoint::Attendance { semester_id })
            .await?;
        let rows = parser::parse_attendance(&payload.html_text()?.unwrap_or_default())
            .into_iter()
            .map(|record| {
                let projection = match calc::project_record(&record, target) {
                    Some(Ok(projection)) => Some(projection),
                    Some(Err(err)) => {
                        warn!(course = %record.course_code, error = %err, "skipping projection");
                        None
                    }
                    None => None,
                };
                AttendanceRow { record, projection }
            })
            .collect();
        Ok(Response::Attendance(rows))
    }

    async fn faculty_search(&self, query: String) -> Result<Vec<FacultyHit>, PesuError> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(PesuError::InvalidQuery("faculty search needs a name".to_string()));
        }
        let payload = self
            .portal
            .fetch("", &Endpoint::FacultySearch { query })
            .await?;
        Ok(parser::parse_faculty_search(
            &payload.html_text()?.unwrap_or_default(),
        ))
    }

    async fn faculty_details(&self, query: String) -> Result<Response, PesuError> {
        let Some(hit) = self.faculty_search(query).await?.into_iter().next() else {
            return Ok(Response::NoFacultyMatch);
        };
        let payload = self
            .portal
            .fetch(
                "",
                &Endpoint::FacultyProfile {
                    path: hit.path.clone(),
                },
            )
            .await?;
        let profile = parser::parse_faculty_profile(&payload.html_text()?.unwrap_or_default());
        if profile.is_empty() {
            return Err(PesuError::parse("faculty profile", hit.path));
        }
        Ok(Response::Faculty { hit, profile })
    }

    async fn download(
        &self,
        selection: &Selection,
        categories: &[ContentCategory],
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Response, PesuError> {
        if selection.is_empty() {
            return Err(PesuError::NoItemsSelected);
        }
        if categories.is_empty() {
            return Err(PesuError::NoCategoriesSelected);
        }
        let store = self.orchestrator.store().as_ref();
        let doc = load_record::<_, CacheDocument>(store, keys::TREE)
            .await?
            .ok_or_else(|| PesuError::CacheMissing(keys::TREE.to_string()))?;
        let items = view::selected_items(Some(&doc), selection);
        if items.is_empty() {
            return Err(PesuError::NoItemsSelected);
        }

        let session = self.orchestrator.current_session().await?;
        let outcome = self
            .engine
            .run_with(&session, &items, categories, options, sink)
            .await?;

        let file_name = format!(
            "PESU_Materials_{}.zip",
            self.orchestrator.now().timestamp_millis()
        );
        let dir = self.output_dir.clone();
        let bytes = outcome.archive;
        let archive_path =
            tokio::task::spawn_blocking(move || archive::write_atomic(&dir, &file_name, &bytes))
                .await
                .map_err(|err| PesuError::Filesystem(err.to_string()))??;
        info!(path = %archive_path, "archive written");

        Ok(Response::Downloaded {
            archive_path,
            files: outcome.files,
            stats: outcome.stats,
        })
    }
}

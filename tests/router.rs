mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use tempfile::TempDir;
use zip::ZipArchive;

use common::{MockCredentials, MockPortal, script_full_portal};
use pesu_sync::calc::CourseGrade;
use pesu_sync::domain::ContentCategory;
use pesu_sync::download::DownloadOptions;
use pesu_sync::error::PesuError;
use pesu_sync::portal::RawPayload;
use pesu_sync::router::{Request, Response, Router};
use pesu_sync::selection::Selection;
use pesu_sync::store::MemoryStore;
use pesu_sync::sync::{SyncOptions, SyncOrchestrator};
use pesu_sync::view::{FlatKind, FlatQuery, NestedQuery};

type TestRouter = Router<MockPortal, MemoryStore, MockCredentials>;

fn router(portal: Arc<MockPortal>, output_dir: Utf8PathBuf) -> TestRouter {
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&portal),
        Arc::new(MemoryStore::new()),
        MockCredentials::logged_in(),
        SyncOptions::default(),
    ));
    Router::new(orchestrator, portal, 3, output_dir)
}

fn temp_output() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

#[tokio::test]
async fn views_over_an_empty_cache_are_empty() {
    let (_dir, output) = temp_output();
    let router = router(Arc::new(MockPortal::new()), output);

    let response = router
        .handle(Request::GetNested(NestedQuery::new()), None)
        .await
        .unwrap();
    assert_matches!(response, Response::Nested(page) if page.pagination.total == 0);

    let response = router.handle(Request::GetSemesters, None).await.unwrap();
    assert_matches!(response, Response::Semesters { semesters, options } => {
        assert!(semesters.is_empty());
        assert_eq!(options.len(), 9);
    });

    let response = router.handle(Request::GetGpa, None).await.unwrap();
    assert_matches!(response, Response::Gpa { gpa: None, cgpa: None });
}

#[tokio::test]
async fn sync_then_query() {
    let portal = Arc::new(MockPortal::new());
    script_full_portal(&portal);
    let (_dir, output) = temp_output();
    let router = router(Arc::clone(&portal), output);

    let response = router.handle(Request::TriggerSync, None).await.unwrap();
    assert_matches!(response, Response::Synced(reports) if reports.len() == 3);

    let response = router
        .handle(Request::GetFlat(FlatQuery::new(FlatKind::Classes)), None)
        .await
        .unwrap();
    assert_matches!(response, Response::Flat(page) if page.pagination.total == 4);

    let response = router.handle(Request::GetSemesters, None).await.unwrap();
    assert_matches!(response, Response::Semesters { semesters, options } => {
        assert_eq!(semesters.len(), 2);
        let values = options.iter().map(|option| option.value.as_str()).collect::<Vec<_>>();
        assert_eq!(values, vec!["all", "1", "2"]);
    });

    let response = router.handle(Request::GetGpa, None).await.unwrap();
    assert_matches!(response, Response::Gpa { gpa: Some(_), cgpa: Some(cgpa) } if cgpa == 8.5);
}

#[tokio::test]
async fn download_writes_one_archive() {
    let portal = Arc::new(MockPortal::new());
    script_full_portal(&portal);
    portal.respond(
        "material:101:c1:2",
        RawPayload::binary("application/pdf", b"%PDF-1".to_vec()),
    );
    portal.respond(
        "material:101:c3:2",
        RawPayload::binary("application/pdf", b"%PDF-2".to_vec()),
    );
    let (_dir, output) = temp_output();
    let router = router(Arc::clone(&portal), output.clone());
    router.handle(Request::TriggerSync, None).await.unwrap();

    let selection = ["c1", "c3"].into_iter().map(str::to_string).collect::<Selection>();
    let response = router
        .handle(
            Request::Download {
                selection,
                categories: vec![ContentCategory::SLIDES],
                options: DownloadOptions::default(),
            },
            None,
        )
        .await
        .unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "downloaded");

    let Response::Downloaded {
        archive_path,
        files,
        stats,
    } = response
    else {
        panic!("expected a download response");
    };
    assert_eq!(stats.successful, 2);
    assert_eq!(files.len(), 2);
    assert_eq!(archive_path.parent(), Some(output.as_path()));
    assert_eq!(json["data"]["archivePath"].as_str(), Some(archive_path.as_str()));
    let file_name = archive_path.file_name().unwrap();
    assert!(file_name.starts_with("PESU_Materials_") && file_name.ends_with(".zip"));

    let bytes = std::fs::read(&archive_path).unwrap();
    let archive = ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 2);
}

#[tokio::test]
async fn empty_download_requests_never_reach_the_portal() {
    let portal = Arc::new(MockPortal::new());
    let (_dir, output) = temp_output();
    let router = router(Arc::clone(&portal), output);

    let result = router
        .handle(
            Request::Download {
                selection: Selection::new(),
                categories: vec![ContentCategory::NOTES],
                options: DownloadOptions::default(),
            },
            None,
        )
        .await;
    assert_matches!(result, Err(PesuError::NoItemsSelected));

    let selection = ["c1".to_string()].into_iter().collect::<Selection>();
    let result = router
        .handle(
            Request::Download {
                selection,
                categories: Vec::new(),
                options: DownloadOptions::default(),
            },
            None,
        )
        .await;
    assert_matches!(result, Err(PesuError::NoCategoriesSelected));

    assert_eq!(portal.total_calls(), 0);
}

#[tokio::test]
async fn attendance_is_projected_per_course() {
    let portal = Arc::new(MockPortal::new());
    portal.respond(
        "attendance:901",
        RawPayload::json_string(
            r#"<table><tbody id="subjetInfo">
                <tr><td>UE22CS251A</td><td>DBMS</td><td>65/80</td><td>81</td></tr>
                <tr><td>UE22MA151A</td><td>Maths</td><td>NA</td><td>NA</td></tr>
                <tr><td>UE22PH101A</td><td>Physics</td><td>90/80</td><td>112</td></tr>
            </tbody></table>"#,
        ),
    );
    let (_dir, output) = temp_output();
    let router = router(Arc::clone(&portal), output);

    let response = router
        .handle(
            Request::GetAttendance {
                semester_id: "901".to_string(),
                target: 75,
            },
            None,
        )
        .await
        .unwrap();
    assert_matches!(response, Response::Attendance(rows) => {
        assert_eq!(rows.len(), 3);
        let projection = rows[0].projection.unwrap();
        assert_eq!(projection.can_miss, 6);
        assert_eq!(projection.needed, Some(0));
        assert_eq!(projection.percentage, 81.25);
        assert!(rows[1].projection.is_none());
        assert_eq!(rows[2].record.attended, Some(90));
        assert!(rows[2].projection.is_none());
    });

    let result = router
        .handle(
            Request::GetAttendance {
                semester_id: "901".to_string(),
                target: 0,
            },
            None,
        )
        .await;
    assert_matches!(result, Err(PesuError::InvalidQuery(_)));
}

#[tokio::test]
async fn sgpa_projects_onto_cached_semesters() {
    let portal = Arc::new(MockPortal::new());
    script_full_portal(&portal);
    let (_dir, output) = temp_output();
    let router = router(Arc::clone(&portal), output);
    let courses = ["4:S", "2:B"]
        .iter()
        .map(|course| course.parse::<CourseGrade>().unwrap())
        .collect::<Vec<_>>();

    let response = router
        .handle(
            Request::CalculateSgpa {
                courses: courses.clone(),
            },
            None,
        )
        .await
        .unwrap();
    assert_matches!(response, Response::Sgpa { sgpa, projected_cgpa: Some(cgpa) } => {
        assert_eq!(sgpa, 9.33);
        assert_eq!(cgpa, 9.33);
    });

    router.handle(Request::TriggerSync, None).await.unwrap();
    let response = router
        .handle(Request::CalculateSgpa { courses }, None)
        .await
        .unwrap();
    // (20 * 9.0 + 20 * 8.0 + 6 * 9.33) / 46
    assert_matches!(response, Response::Sgpa { projected_cgpa: Some(cgpa), .. } if cgpa == 8.61);

    let result = router
        .handle(Request::CalculateSgpa { courses: Vec::new() }, None)
        .await;
    assert_matches!(result, Err(PesuError::InvalidQuery(_)));
}

const FACULTY_SEARCH_HTML: &str = r#"
    <a class="chat-contacts-item" href="/dr-ananya-rao"><h4>Dr. Ananya Rao</h4></a>
    <a class="chat-contacts-item" href="/dr-ravi-rao"><h4>Dr. Ravi Rao</h4></a>"#;

#[tokio::test]
async fn faculty_lookup_needs_no_session() {
    let portal = Arc::new(MockPortal::new());
    portal.respond("faculty-search:rao", RawPayload::html(FACULTY_SEARCH_HTML));
    portal.respond(
        "faculty:/dr-ananya-rao",
        RawPayload::html(
            r#"<div class="agent_card-title"><h4>Dr. Ananya Rao</h4></div>
            <div class="contat-card"><span>Email</span> ananya@pes.edu</div>"#,
        ),
    );
    portal.respond("faculty-search:nobody", RawPayload::html("<p>No results</p>"));
    let (_dir, output) = temp_output();
    let router = router(Arc::clone(&portal), output);

    let response = router
        .handle(
            Request::FacultySearch {
                query: " rao ".to_string(),
            },
            None,
        )
        .await
        .unwrap();
    assert_matches!(response, Response::FacultyHits(hits) => {
        let names = hits.iter().map(|hit| hit.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Dr. Ananya Rao", "Dr. Ravi Rao"]);
    });

    let response = router
        .handle(
            Request::FacultyDetails {
                query: "rao".to_string(),
            },
            None,
        )
        .await
        .unwrap();
    assert_matches!(response, Response::Faculty { hit, profile } => {
        assert_eq!(hit.path, "/dr-ananya-rao");
        assert_eq!(profile.basic_info["Name"], "Dr. Ananya Rao");
        assert_eq!(profile.sidebar["Email"], "ananya@pes.edu");
    });

    let response = router
        .handle(
            Request::FacultyDetails {
                query: "nobody".to_string(),
            },
            None,
        )
        .await
        .unwrap();
    assert_matches!(response, Response::NoFacultyMatch);

    let result = router
        .handle(
            Request::FacultySearch {
                query: "  ".to_string(),
            },
            None,
        )
        .await;
    assert_matches!(result, Err(PesuError::InvalidQuery(_)));
}

//! Bulk course-material download: every selected class times every requested
//! category, fetched with bounded concurrency and packed into one ZIP, either
//! as a unit/category tree or merged into one PDF per subject.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::archive::{self, ArchiveFile};
use crate::domain::{ContentCategory, DownloadItem};
use crate::error::PesuError;
use crate::parser;
use crate::pdf;
use crate::pool;
use crate::portal::{Endpoint, PayloadKind, PortalClient, RawPayload};

pub const DEFAULT_EXTENSION: &str = ".pdf";
const MAX_NAME_LEN: usize = 100;

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
    ),
    ("application/vnd.ms-powerpoint", ".ppt"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("application/msword", ".doc"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
    ("application/vnd.ms-excel", ".xls"),
    ("image/png", ".png"),
    ("image/jpeg", ".jpg"),
    ("text/plain", ".txt"),
    ("application/zip", ".zip"),
];

static DISPOSITION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*?=["']?(?:UTF-8'')?([^"';\n]+)"#).expect("valid regex")
});
static FILE_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([a-zA-Z0-9]+)$").expect("valid regex"));
static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Processing,
    Zipping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub current_item: String,
    pub status: DownloadStatus,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn event(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is watching anymore.
        let _ = self.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    NetworkError,
    NoLinksFound,
    AllLinksFailed,
    UnknownResponseType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl DownloadFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub unit_number: usize,
    pub class_id: String,
    pub class_name: String,
    pub category: ContentCategory,
    pub kind: FailureKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub failed_items: Vec<FailedItem>,
    /// PDFs folded into a per-subject merged document.
    pub merged: usize,
    pub merged_subjects: usize,
    pub non_pdf_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// One `{Subject}.pdf` per subject instead of the unit/category tree.
    pub merge_by_subject: bool,
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub archive: Vec<u8>,
    /// Archive paths in the order they were written.
    pub files: Vec<String>,
    pub stats: DownloadStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchedFile {
    display_name: Option<String>,
    extension: String,
    data: Vec<u8>,
}

struct Fetched {
    item: DownloadItem,
    category: ContentCategory,
    files: Vec<FetchedFile>,
}

#[derive(Default)]
struct MergeCounts {
    merged: usize,
    merged_subjects: usize,
    non_pdf_count: usize,
}

struct TaskOutput {
    index: usize,
    item: DownloadItem,
    category: ContentCategory,
    result: Result<Vec<FetchedFile>, DownloadFailure>,
}

pub struct DownloadEngine<P> {
    portal: Arc<P>,
    concurrency: usize,
}

impl<P> DownloadEngine<P>
where
    P: PortalClient + 'static,
{
    pub fn new(portal: Arc<P>, concurrency: usize) -> Self {
        Self {
            portal,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(
        &self,
        session: &str,
        items: &[DownloadItem],
        categories: &[ContentCategory],
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, PesuError> {
        self.run_with(session, items, categories, DownloadOptions::default(), sink)
            .await
    }

    /// Runs the whole batch. Individual failures end up in the stats; only an
    /// empty request or a failed archive build is an error.
    pub async fn run_with(
        &self,
        session: &str,
        items: &[DownloadItem],
        categories: &[ContentCategory],
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, PesuError> {
        if items.is_empty() {
            return Err(PesuError::NoItemsSelected);
        }
        if categories.is_empty() {
            return Err(PesuError::NoCategoriesSelected);
        }

        let total = items.len() * categories.len();
        info!(
            items = items.len(),
            categories = categories.len(),
            total,
            "starting bulk download"
        );

        let tasks = items
            .iter()
            .flat_map(|item| categories.iter().map(move |category| (item, *category)))
            .enumerate()
            .map(|(index, (item, category))| {
                let portal = Arc::clone(&self.portal);
                let session = session.to_string();
                let item = item.clone();
                async move {
                    let result = fetch_task(portal.as_ref(), &session, &item, category).await;
                    TaskOutput {
                        index,
                        item,
                        category,
                        result,
                    }
                }
            })
            .collect::<Vec<_>>();

        let mut completed = 0;
        let mut outputs = Vec::with_capacity(total);
        pool::run_bounded(self.concurrency, tasks, |output: TaskOutput| {
            completed += 1;
            debug!(
                class = %output.item.class_id,
                category = %output.category,
                ok = output.result.is_ok(),
                "download task finished"
            );
            sink.event(ProgressEvent {
                current: completed,
                total,
                current_item: output.item.class_name.clone(),
                status: DownloadStatus::Downloading,
            });
            outputs.push(output);
        })
        .await;
        outputs.sort_by_key(|output| output.index);

        let mut fetched = Vec::new();
        let mut failed_items = Vec::new();
        for output in outputs {
            match output.result {
                Ok(files) => fetched.push(Fetched {
                    item: output.item,
                    category: output.category,
                    files,
                }),
                Err(failure) => {
                    warn!(
                        class = %output.item.class_id,
                        category = %output.category,
                        kind = ?failure.kind,
                        error = %failure.message,
                        "download task failed"
                    );
                    failed_items.push(FailedItem {
                        subject_id: output.item.subject_id,
                        subject_code: output.item.subject_code,
                        subject_name: output.item.subject_name,
                        unit_number: output.item.unit_number,
                        class_id: output.item.class_id,
                        class_name: output.item.class_name,
                        category: output.category,
                        kind: failure.kind,
                        error: failure.message,
                    });
                }
            }
        }

        let mut counts = MergeCounts::default();
        let files = if options.merge_by_subject {
            sink.event(ProgressEvent {
                current: total,
                total,
                current_item: "Grouping files by subject...".to_string(),
                status: DownloadStatus::Processing,
            });
            merged_files(fetched, &mut counts, |subject| {
                sink.event(ProgressEvent {
                    current: total,
                    total,
                    current_item: format!("Processing {subject}..."),
                    status: DownloadStatus::Processing,
                })
            })
        } else {
            sink.event(ProgressEvent {
                current: total,
                total,
                current_item: "Organizing files...".to_string(),
                status: DownloadStatus::Processing,
            });
            individual_files(fetched)
        };

        sink.event(ProgressEvent {
            current: total,
            total,
            current_item: "Generating ZIP file...".to_string(),
            status: DownloadStatus::Zipping,
        });
        let archive = archive::build_zip(&files)?;

        let failed = failed_items.len();
        let stats = DownloadStats {
            total,
            successful: total - failed,
            failed,
            failed_items,
            merged: counts.merged,
            merged_subjects: counts.merged_subjects,
            non_pdf_count: counts.non_pdf_count,
        };
        info!(
            successful = stats.successful,
            failed = stats.failed,
            files = files.len(),
            "bulk download finished"
        );
        Ok(DownloadOutcome {
            archive,
            files: files.into_iter().map(|file| file.path).collect(),
            stats,
        })
    }
}

/// Unit and category folders per subject, every fetched file kept.
fn individual_files(fetched: Vec<Fetched>) -> Vec<ArchiveFile> {
    let mut layout = ArchiveLayout::default();
    let mut files = Vec::new();
    for Fetched {
        item,
        category,
        files: downloaded,
    } in fetched
    {
        let count = downloaded.len();
        for (position, file) in downloaded.into_iter().enumerate() {
            let suffix = (count > 1).then_some(position + 1);
            let path = layout.place(&item, category, &file, suffix);
            files.push(ArchiveFile {
                path,
                extension: file.extension,
                data: file.data,
            });
        }
    }
    files
}

struct SubjectGroup {
    name: String,
    pdfs: Vec<(String, FetchedFile)>,
    others: Vec<(String, FetchedFile)>,
}

/// One `{Subject}.pdf` per subject at the archive root, other formats under
/// `{Subject}/`. A subject whose PDFs cannot be merged keeps them as
/// individual files in its folder.
fn merged_files(
    fetched: Vec<Fetched>,
    counts: &mut MergeCounts,
    mut on_subject: impl FnMut(&str),
) -> Vec<ArchiveFile> {
    let mut order = Vec::<String>::new();
    let mut groups = HashMap::<String, SubjectGroup>::new();
    for Fetched {
        item,
        files: downloaded,
        ..
    } in fetched
    {
        let group = groups.entry(item.subject_id.clone()).or_insert_with(|| {
            order.push(item.subject_id.clone());
            SubjectGroup {
                name: item.subject_name.clone(),
                pdfs: Vec::new(),
                others: Vec::new(),
            }
        });
        let count = downloaded.len();
        for (position, file) in downloaded.into_iter().enumerate() {
            let suffix = (count > 1).then_some(position + 1);
            let stem = file_stem(&item, &file, suffix);
            if file.extension == DEFAULT_EXTENSION {
                group.pdfs.push((stem, file));
            } else {
                group.others.push((stem, file));
            }
        }
    }

    let mut layout = ArchiveLayout::default();
    let mut files = Vec::new();
    for subject_id in order {
        let Some(group) = groups.remove(&subject_id) else {
            continue;
        };
        on_subject(&group.name);
        let folder = sanitize_name(&group.name);

        let pdf_count = group.pdfs.len();
        if pdf_count == 1 {
            files.extend(group.pdfs.into_iter().map(|(_, file)| ArchiveFile {
                path: layout.claim("", &folder, DEFAULT_EXTENSION),
                extension: file.extension,
                data: file.data,
            }));
        } else if pdf_count > 1 {
            let inputs = group
                .pdfs
                .iter()
                .map(|(_, file)| file.data.as_slice())
                .collect::<Vec<_>>();
            match pdf::merge(&inputs) {
                Ok(data) => {
                    files.push(ArchiveFile {
                        path: layout.claim("", &folder, DEFAULT_EXTENSION),
                        extension: DEFAULT_EXTENSION.to_string(),
                        data,
                    });
                    counts.merged += pdf_count;
                    counts.merged_subjects += 1;
                }
                Err(err) => {
                    warn!(subject = %group.name, error = %err, "keeping PDFs unmerged");
                    for (stem, file) in group.pdfs {
                        files.push(ArchiveFile {
                            path: layout.claim(&folder, &stem, &file.extension),
                            extension: file.extension,
                            data: file.data,
                        });
                    }
                }
            }
        }

        for (stem, file) in group.others {
            files.push(ArchiveFile {
                path: layout.claim(&folder, &stem, &file.extension),
                extension: file.extension,
                data: file.data,
            });
            counts.non_pdf_count += 1;
        }
    }
    files
}

async fn fetch_task<P: PortalClient>(
    portal: &P,
    session: &str,
    item: &DownloadItem,
    category: ContentCategory,
) -> Result<Vec<FetchedFile>, DownloadFailure> {
    let endpoint = Endpoint::CourseMaterial {
        subject_id: item.subject_id.clone(),
        class_id: item.class_id.clone(),
        category,
    };
    let payload = portal
        .fetch(session, &endpoint)
        .await
        .map_err(|err| DownloadFailure::new(FailureKind::NetworkError, err.to_string()))?;

    match payload.kind() {
        PayloadKind::Binary => Ok(vec![FetchedFile {
            display_name: None,
            extension: detect_extension(&payload),
            data: payload.body,
        }]),
        PayloadKind::Html => {
            let html = payload
                .html_text()
                .map_err(|err| {
                    DownloadFailure::new(FailureKind::UnknownResponseType, err.to_string())
                })?
                .unwrap_or_default();
            let links = parser::parse_download_links(&html);
            if links.is_empty() {
                return Err(DownloadFailure::new(
                    FailureKind::NoLinksFound,
                    "No download links found",
                ));
            }

            let mut fetched = Vec::new();
            let mut last_error = None;
            for link in links {
                let url = parser::resolve_download_url(portal.base_url(), &link.url);
                match portal.fetch_url(session, &url).await {
                    Ok(file) if file.kind() != PayloadKind::Html => fetched.push(FetchedFile {
                        display_name: link.display_name,
                        extension: detect_extension(&file),
                        data: file.body,
                    }),
                    Ok(_) => last_error = Some(format!("{url}: got a page instead of a file")),
                    Err(err) => last_error = Some(format!("{url}: {err}")),
                }
            }
            if fetched.is_empty() {
                let detail = last_error.unwrap_or_default();
                return Err(DownloadFailure::new(
                    FailureKind::AllLinksFailed,
                    format!("All download links failed ({detail})"),
                ));
            }
            Ok(fetched)
        }
        PayloadKind::Unknown => Err(DownloadFailure::new(
            FailureKind::UnknownResponseType,
            "Unknown response type",
        )),
    }
}

/// Extension from the `Content-Disposition` file name, then the MIME type,
/// then `.pdf`.
pub fn detect_extension(payload: &RawPayload) -> String {
    let from_disposition = payload
        .content_disposition
        .as_deref()
        .and_then(|value| DISPOSITION_NAME_RE.captures(value))
        .and_then(|caps| {
            FILE_EXT_RE
                .captures(caps[1].trim())
                .map(|ext| format!(".{}", ext[1].to_lowercase()))
        });
    if let Some(extension) = from_disposition {
        return extension;
    }

    let content_type = payload.content_type.as_deref().unwrap_or_default();
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| content_type.contains(mime))
        .map(|(_, extension)| extension.to_string())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Path-safe name: reserved characters and whitespace runs become `_`,
/// capped at 100 characters.
pub fn sanitize_name(name: &str) -> String {
    let replaced = UNSAFE_CHARS_RE.replace_all(name.trim(), "_");
    let collapsed = WHITESPACE_RE.replace_all(&replaced, "_");
    let capped = collapsed.chars().take(MAX_NAME_LEN).collect::<String>();
    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped
    }
}

/// Assigns archive paths and keeps them unique.
#[derive(Default)]
struct ArchiveLayout {
    used: HashSet<String>,
}

impl ArchiveLayout {
    fn place(
        &mut self,
        item: &DownloadItem,
        category: ContentCategory,
        file: &FetchedFile,
        suffix: Option<usize>,
    ) -> String {
        let subject = sanitize_name(&item.subject_name);
        let folder = if category.is_unit_scoped() {
            format!("{subject}/{}/{}", item.unit_number, category.name())
        } else {
            format!("{subject}/{}", category.name())
        };
        let stem = file_stem(item, file, suffix);
        self.claim(&folder, &stem, &file.extension)
    }

    /// First free `{folder}/{stem}{extension}`, trying `_2`, `_3`, ... on
    /// collisions. An empty folder places the file at the archive root.
    fn claim(&mut self, folder: &str, stem: &str, extension: &str) -> String {
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };
        let mut path = format!("{prefix}{stem}{extension}");
        let mut attempt = 2;
        while !self.used.insert(path.clone()) {
            path = format!("{prefix}{stem}_{attempt}{extension}");
            attempt += 1;
        }
        path
    }
}

fn file_stem(item: &DownloadItem, file: &FetchedFile, suffix: Option<usize>) -> String {
    let raw_name = file.display_name.as_deref().unwrap_or(&item.class_name);
    let stem = sanitize_name(strip_extension(raw_name, &file.extension));
    match suffix {
        Some(suffix) => format!("{stem}_{suffix}"),
        None => stem,
    }
}

fn strip_extension<'a>(name: &'a str, extension: &str) -> &'a str {
    let trimmed = name.trim();
    match trimmed.len().checked_sub(extension.len()) {
        Some(cut)
            if cut > 0
                && trimmed.is_char_boundary(cut)
                && trimmed[cut..].eq_ignore_ascii_case(extension) =>
        {
            &trimmed[..cut]
        }
        _ => trimmed,
    }
}

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use pesu_sync::calc::CourseGrade;
use pesu_sync::config::{ConfigLoader, ResolvedConfig};
use pesu_sync::domain::ContentCategory;
use pesu_sync::download::{DownloadOptions, ProgressSink};
use pesu_sync::error::PesuError;
use pesu_sync::output::{JsonOutput, StderrProgress};
use pesu_sync::portal::{EnvCredentials, PortalHttpClient};
use pesu_sync::router::{Request, Router};
use pesu_sync::selection::Selection;
use pesu_sync::store::FileStore;
use pesu_sync::sync::{Resource, Scheduler, SyncOptions, SyncOrchestrator};
use pesu_sync::view::{FlatKind, FlatQuery, NestedQuery, SemesterFilter};

type PortalRouter = Router<PortalHttpClient, FileStore, EnvCredentials>;

#[derive(Parser)]
#[command(name = "pesu-sync")]
#[command(about = "Sync, browse and bulk-download PESU Academy course material")]
#[command(version, author)]
struct Cli {
    /// Path to a pesu-sync.json config file.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch whatever is missing from the local cache")]
    Sync(SyncArgs),
    #[command(about = "Show the cached subject tree")]
    Subjects(SubjectsArgs),
    #[command(about = "List one kind of cached entity")]
    List(ListArgs),
    #[command(about = "Download selected classes into one ZIP archive")]
    Download(DownloadArgs),
    #[command(about = "Show cached semesters")]
    Semesters,
    #[command(about = "Show cached GPA per semester, or compute SGPA for given grades")]
    Gpa(GpaArgs),
    #[command(about = "Fetch attendance for a semester")]
    Attendance(AttendanceArgs),
    #[command(about = "Look up faculty in the staff directory")]
    Faculty(FacultyArgs),
    #[command(about = "Drop a cached resource so the next sync refetches it")]
    Invalidate(InvalidateArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// Keep running and resync on every interval tick.
    #[arg(long)]
    watch: bool,

    /// Session token to store before syncing.
    #[arg(long)]
    session: Option<String>,
}

#[derive(Args)]
struct SubjectsArgs {
    #[arg(long)]
    search: Option<String>,

    #[arg(long, default_value = "all")]
    semester: SemesterFilter,

    #[arg(long, default_value_t = 0)]
    page: usize,

    #[arg(long, default_value_t = pesu_sync::view::DEFAULT_PAGE_SIZE)]
    limit: usize,
}

#[derive(Args)]
struct ListArgs {
    kind: FlatKind,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long)]
    unit: Option<String>,

    #[arg(long)]
    search: Option<String>,

    #[arg(long, default_value_t = 0)]
    page: usize,

    #[arg(long, default_value_t = pesu_sync::view::DEFAULT_PAGE_SIZE)]
    limit: usize,
}

#[derive(Args)]
struct DownloadArgs {
    /// Class id to include (repeatable).
    #[arg(long = "class")]
    classes: Vec<String>,

    /// Content category name or id: slides, notes, assignments, qb, qa.
    #[arg(long = "category", required = true)]
    categories: Vec<ContentCategory>,

    /// Merge each subject's PDFs into one `<Subject>.pdf`.
    #[arg(long)]
    merge_by_subject: bool,
}

#[derive(Args)]
struct GpaArgs {
    /// Course as `<credits>:<grade>` (repeatable), e.g. `4:A`.
    #[arg(long = "course")]
    courses: Vec<CourseGrade>,
}

#[derive(Args)]
struct FacultyArgs {
    query: String,

    /// Fetch the profile of the first match instead of listing matches.
    #[arg(long)]
    details: bool,
}

#[derive(Args)]
struct AttendanceArgs {
    semester_id: String,

    #[arg(long, default_value_t = pesu_sync::calc::DEFAULT_ATTENDANCE_TARGET)]
    target: u32,
}

#[derive(Args)]
struct InvalidateArgs {
    resource: Resource,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PesuError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PesuError) -> u8 {
    match error {
        PesuError::ConfigRead(_)
        | PesuError::ConfigParse(_)
        | PesuError::InvalidQuery(_)
        | PesuError::MissingSession
        | PesuError::NoItemsSelected
        | PesuError::NoCategoriesSelected => 2,
        PesuError::PortalHttp(_) | PesuError::PortalStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(run_command(cli.command, config))
}

fn build_router(config: &ResolvedConfig) -> Result<PortalRouter, PesuError> {
    let portal = Arc::new(PortalHttpClient::new(config)?);
    let store = Arc::new(FileStore::new(config.store_dir.clone()));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&portal),
        store,
        EnvCredentials,
        SyncOptions::from(config),
    ));
    Ok(Router::new(
        orchestrator,
        portal,
        config.download_concurrency,
        config.output_dir.clone(),
    ))
}

async fn run_command(command: Commands, config: ResolvedConfig) -> miette::Result<()> {
    let router = build_router(&config)?;
    let request = match command {
        Commands::Sync(args) => return run_sync(&router, &config, args).await,
        Commands::Invalidate(args) => {
            router.orchestrator().invalidate(args.resource).await?;
            return JsonOutput::print_json(&router.orchestrator().status()).into_diagnostic();
        }
        Commands::Download(args) => return run_download(&router, args).await,
        Commands::Subjects(args) => Request::GetNested(NestedQuery {
            search: args.search,
            semester: args.semester,
            page: args.page,
            limit: args.limit,
        }),
        Commands::List(args) => Request::GetFlat(FlatQuery {
            subject_id: args.subject,
            unit_id: args.unit,
            search: args.search,
            page: args.page,
            limit: args.limit,
            ..FlatQuery::new(args.kind)
        }),
        Commands::Semesters => Request::GetSemesters,
        Commands::Gpa(args) if args.courses.is_empty() => Request::GetGpa,
        Commands::Gpa(args) => Request::CalculateSgpa {
            courses: args.courses,
        },
        Commands::Faculty(args) if args.details => Request::FacultyDetails { query: args.query },
        Commands::Faculty(args) => Request::FacultySearch { query: args.query },
        Commands::Attendance(args) => Request::GetAttendance {
            semester_id: args.semester_id,
            target: args.target,
        },
    };
    let response = router.handle(request, None).await?;
    JsonOutput::print_response(&response).into_diagnostic()
}

async fn run_sync(
    router: &PortalRouter,
    config: &ResolvedConfig,
    args: SyncArgs,
) -> miette::Result<()> {
    let orchestrator = router.orchestrator();
    if let Some(token) = args.session.as_deref() {
        orchestrator.accept_credential(token).await?;
    }

    if !args.watch {
        let response = router.handle(Request::TriggerSync, None).await?;
        JsonOutput::print_response(&response).into_diagnostic()?;
        return Ok(());
    }

    let scheduler = Scheduler::spawn(Arc::clone(orchestrator), config.sync_interval);
    tracing::info!(interval = ?config.sync_interval, "watching; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.into_diagnostic()?;
    scheduler.cancel();
    JsonOutput::print_json(&orchestrator.status()).into_diagnostic()
}

async fn run_download(router: &PortalRouter, args: DownloadArgs) -> miette::Result<()> {
    let selection = args.classes.into_iter().collect::<Selection>();
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            StderrProgress.event(event);
        }
    });

    let result = router
        .handle(
            Request::Download {
                selection,
                categories: args.categories,
                options: DownloadOptions {
                    merge_by_subject: args.merge_by_subject,
                },
            },
            Some(&sender),
        )
        .await;
    drop(sender);
    printer.await.into_diagnostic()?;

    JsonOutput::print_response(&result?).into_diagnostic()
}

//! Level-triggered reconciliation of the cached portal resources.
//!
//! Every trigger runs the same pass: look at what the store holds, fetch only
//! what is missing, commit each resource with a single store write. A
//! per-resource in-memory lock keeps two passes from fetching the same thing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ResolvedConfig, SubjectFilterConfig};
use crate::domain::{
    CacheDocument, ClassRecord, GpaDocument, GpaRecord, SemesterList, SessionCredential, Subject,
    SubjectCode, SubjectSummary, Unit, UserProfile,
};
use crate::error::PesuError;
use crate::parser::{self, ParsedUnit};
use crate::pool;
use crate::portal::{CredentialProvider, Endpoint, PortalClient, RawPayload};
use crate::store::{KeyValueStore, keys, load_record, save_record};

/// Upper bound on back-to-back passes after a dependency was committed.
const MAX_FOLLOW_UPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Credential,
    Profile,
    Tree,
    Semesters,
    Gpa,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Credential,
        Resource::Profile,
        Resource::Tree,
        Resource::Semesters,
        Resource::Gpa,
    ];

    pub fn store_key(self) -> &'static str {
        match self {
            Resource::Credential => keys::SESSION,
            Resource::Profile => keys::PROFILE,
            Resource::Tree => keys::TREE,
            Resource::Semesters => keys::SEMESTERS,
            Resource::Gpa => keys::GPA,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::str::FromStr for Resource {
    type Err = PesuError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "credential" | "session" => Ok(Resource::Credential),
            "profile" => Ok(Resource::Profile),
            "tree" | "subjects" => Ok(Resource::Tree),
            "semesters" => Ok(Resource::Semesters),
            "gpa" => Ok(Resource::Gpa),
            _ => Err(PesuError::InvalidQuery(format!("unknown resource: {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceState {
    Idle,
    Fetching,
    Committed,
    Failed,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub attempted: Vec<Resource>,
    pub committed: Vec<Resource>,
    pub failed: Vec<(Resource, String)>,
    /// Another pass holds the lock or has already committed the resource.
    pub skipped: Vec<Resource>,
    /// A dependency is not stored yet.
    pub deferred: Vec<Resource>,
}

impl ReconcileReport {
    /// A dependency landed during this pass, so dependents can now run.
    pub fn needs_follow_up(&self) -> bool {
        self.committed
            .iter()
            .any(|resource| matches!(resource, Resource::Profile | Resource::Semesters))
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub fetch_concurrency: usize,
    pub tree_max_age: Option<chrono::Duration>,
    pub subject_filter: SubjectFilterConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: 5,
            tree_max_age: None,
            subject_filter: SubjectFilterConfig::default(),
        }
    }
}

impl From<&ResolvedConfig> for SyncOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            fetch_concurrency: config.fetch_concurrency,
            tree_max_age: config.tree_max_age,
            subject_filter: config.subject_filter.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct ResourceLocks {
    held: [AtomicBool; 5],
}

impl ResourceLocks {
    fn try_acquire(&self, resource: Resource) -> Option<LockGuard<'_>> {
        self.held[resource.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LockGuard {
                locks: self,
                resource,
            })
    }
}

struct LockGuard<'a> {
    locks: &'a ResourceLocks,
    resource: Resource,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.locks.held[self.resource.index()].store(false, Ordering::Release);
    }
}

/// What the store held when a pass started. Dependents are gated on this
/// snapshot, not on values committed later in the same pass.
struct Snapshot {
    session: Option<String>,
    profile: Option<UserProfile>,
    tree_present: bool,
    semesters: Option<SemesterList>,
    gpa_present: bool,
}

pub struct SyncOrchestrator<P, S, C> {
    portal: Arc<P>,
    store: Arc<S>,
    credentials: C,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    locks: ResourceLocks,
    states: Mutex<[ResourceState; 5]>,
}

impl<P, S, C> SyncOrchestrator<P, S, C>
where
    P: PortalClient + 'static,
    S: KeyValueStore,
    C: CredentialProvider,
{
    pub fn new(portal: Arc<P>, store: Arc<S>, credentials: C, options: SyncOptions) -> Self {
        Self::with_clock(portal, store, credentials, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        portal: Arc<P>,
        store: Arc<S>,
        credentials: C,
        options: SyncOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            portal,
            store,
            credentials,
            clock,
            options,
            locks: ResourceLocks::default(),
            states: Mutex::new([ResourceState::Idle; 5]),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stored session token, or a fresh one from the credential provider.
    pub async fn current_session(&self) -> Result<String, PesuError> {
        let stored = load_record::<_, SessionCredential>(self.store.as_ref(), keys::SESSION)
            .await?
            .map(|credential| credential.token)
            .filter(|token| !token.is_empty());
        match stored {
            Some(token) => Ok(token),
            None => self
                .credentials
                .session()
                .await
                .ok_or(PesuError::MissingSession),
        }
    }

    pub fn status(&self) -> BTreeMap<Resource, ResourceState> {
        let states = self
            .states
            .lock()
            .map(|states| *states)
            .unwrap_or([ResourceState::Idle; 5]);
        Resource::ALL
            .iter()
            .map(|resource| (*resource, states[resource.index()]))
            .collect()
    }

    /// Drops the stored value so the next pass fetches it again.
    pub async fn invalidate(&self, resource: Resource) -> Result<(), PesuError> {
        info!(resource = ?resource, "invalidating cached resource");
        self.store.remove(resource.store_key()).await?;
        self.set_state(resource, ResourceState::Idle);
        Ok(())
    }

    /// Credential-arrival event: stores the token and replaces any previous one.
    pub async fn accept_credential(&self, token: &str) -> Result<(), PesuError> {
        let credential = SessionCredential {
            token: token.trim().to_string(),
            obtained_at: self.clock.now(),
        };
        save_record(self.store.as_ref(), keys::SESSION, &credential).await?;
        self.set_state(Resource::Credential, ResourceState::Committed);
        Ok(())
    }

    /// Runs passes until no newly committed dependency unblocks more work.
    pub async fn reconcile_settled(&self) -> Result<Vec<ReconcileReport>, PesuError> {
        let mut reports = Vec::new();
        for _ in 0..=MAX_FOLLOW_UPS {
            let report = self.reconcile().await?;
            let follow_up = report.needs_follow_up();
            reports.push(report);
            if !follow_up {
                break;
            }
        }
        Ok(reports)
    }

    /// One reconciliation pass. Safe to call at any time and from several
    /// callers at once.
    pub async fn reconcile(&self) -> Result<ReconcileReport, PesuError> {
        let mut report = ReconcileReport::default();
        let snapshot = self.snapshot().await?;

        let session = match snapshot.session {
            Some(session) => Some(session),
            None => self.sync_credential(&mut report).await,
        };
        let Some(session) = session else {
            debug!("no portal session; deferring all portal resources");
            report.deferred.extend([
                Resource::Profile,
                Resource::Tree,
                Resource::Semesters,
                Resource::Gpa,
            ]);
            return Ok(report);
        };

        let Some(profile) = snapshot.profile else {
            self.sync_profile(&session, &mut report).await;
            report
                .deferred
                .extend([Resource::Tree, Resource::Semesters, Resource::Gpa]);
            return Ok(report);
        };

        if !snapshot.tree_present {
            self.sync_tree(&session, &profile, &mut report).await;
        }

        match snapshot.semesters {
            None => {
                self.sync_semesters(&session, &mut report).await;
                report.deferred.push(Resource::Gpa);
            }
            Some(semesters) if !snapshot.gpa_present => {
                self.sync_gpa(&session, &semesters, &mut report).await;
            }
            Some(_) => {}
        }

        Ok(report)
    }

    async fn snapshot(&self) -> Result<Snapshot, PesuError> {
        let store = self.store.as_ref();
        let session = load_record::<_, SessionCredential>(store, keys::SESSION)
            .await?
            .map(|credential| credential.token)
            .filter(|token| !token.is_empty());
        let profile = load_record::<_, UserProfile>(store, keys::PROFILE).await?;
        let tree_present = self.is_present(Resource::Tree).await?;
        let semesters = load_record::<_, SemesterList>(store, keys::SEMESTERS).await?;
        let gpa_present = store.load(keys::GPA).await?.is_some();
        Ok(Snapshot {
            session,
            profile,
            tree_present,
            semesters,
            gpa_present,
        })
    }

    /// Whether the store holds a usable value. Trees older than the
    /// configured maximum age count as absent.
    async fn is_present(&self, resource: Resource) -> Result<bool, PesuError> {
        if resource != Resource::Tree {
            return Ok(self.store.load(resource.store_key()).await?.is_some());
        }
        let tree = load_record::<_, CacheDocument>(self.store.as_ref(), keys::TREE).await?;
        Ok(match (tree, self.options.tree_max_age) {
            (Some(doc), Some(max_age)) => self.clock.now() - doc.fetched_at <= max_age,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    async fn sync_credential(&self, report: &mut ReconcileReport) -> Option<String> {
        let _guard = self.begin(Resource::Credential, report).await?;
        let result = match self.credentials.session().await {
            Some(token) => self.accept_credential(&token).await.map(|_| token),
            None => Err(PesuError::MissingSession),
        };
        self.finish(Resource::Credential, result, report)
    }

    async fn sync_profile(&self, session: &str, report: &mut ReconcileReport) {
        let Some(_guard) = self.begin(Resource::Profile, report).await else {
            return;
        };
        let result = self.fetch_profile(session).await;
        if let Err(PesuError::PortalStatus {
            status: 401 | 403, ..
        }) = &result
        {
            warn!("portal rejected the session; dropping stored credential");
            if let Err(err) = self.store.remove(keys::SESSION).await {
                warn!(error = %err, "failed to drop stored credential");
            }
        }
        self.finish(Resource::Profile, result, report);
    }

    async fn fetch_profile(&self, session: &str) -> Result<UserProfile, PesuError> {
        let payload = self.portal.fetch(session, &Endpoint::UserProfile).await?;
        let html = payload.html_text()?.unwrap_or_default();
        match parser::parse_profile(&html) {
            Some(profile) => {
                save_record(self.store.as_ref(), keys::PROFILE, &profile).await?;
                Ok(profile)
            }
            None => {
                warn!("could not parse profile page; keeping raw payload");
                save_record(self.store.as_ref(), keys::PROFILE_RAW, &html).await?;
                Err(PesuError::parse("user profile", "profile details not found"))
            }
        }
    }

    async fn sync_tree(&self, session: &str, profile: &UserProfile, report: &mut ReconcileReport) {
        let Some(_guard) = self.begin(Resource::Tree, report).await else {
            return;
        };
        let result = self.commit_tree(session, profile).await;
        if let Ok(doc) = &result {
            info!(subjects = doc.subjects.len(), "subject tree committed");
        }
        self.finish(Resource::Tree, result, report);
    }

    async fn commit_tree(
        &self,
        session: &str,
        profile: &UserProfile,
    ) -> Result<CacheDocument, PesuError> {
        let doc = self.build_tree(session, profile).await?;
        save_record(self.store.as_ref(), keys::TREE, &doc).await?;
        Ok(doc)
    }

    /// Builds the whole tree in memory. A failed unit or class fetch leaves
    /// that node empty and the pass carries on.
    async fn build_tree(
        &self,
        session: &str,
        profile: &UserProfile,
    ) -> Result<CacheDocument, PesuError> {
        let payload = self.portal.fetch(session, &Endpoint::SubjectList).await?;
        let all_subjects = parser::parse_subjects(&payload.html_text()?.unwrap_or_default());
        if all_subjects.is_empty() {
            return Err(PesuError::parse("subject list", "no subjects in response"));
        }
        let relevant = filter_relevant(&all_subjects, profile, &self.options.subject_filter);
        info!(
            total = all_subjects.len(),
            relevant = relevant.len(),
            "building subject tree"
        );

        let unit_requests = relevant
            .iter()
            .map(|subject| {
                (
                    subject.id.clone(),
                    Endpoint::CourseUnits {
                        subject_id: subject.id.clone(),
                    },
                )
            })
            .collect::<Vec<_>>();
        let mut unit_payloads = self.fetch_all(session, unit_requests).await;

        let mut builder = TreeBuilder::default();
        for subject in &relevant {
            let units = match unit_payloads.remove(&subject.id) {
                Some(Ok(payload)) => {
                    parse_or_empty(&payload, "unit list", &subject.id, parser::parse_units)
                }
                Some(Err(err)) => {
                    warn!(subject = %subject.id, error = %err, "unit fetch failed");
                    Vec::new()
                }
                None => Vec::new(),
            };
            builder.add_subject(subject, units);
        }

        let class_requests = builder
            .unit_keys()
            .into_iter()
            .map(|(subject_id, unit_id)| {
                let endpoint = Endpoint::UnitClasses {
                    unit_id: unit_id.clone(),
                };
                ((subject_id, unit_id), endpoint)
            })
            .collect::<Vec<_>>();
        let class_payloads = self.fetch_all(session, class_requests).await;

        for ((subject_id, unit_id), result) in class_payloads {
            let classes = match result {
                Ok(payload) => {
                    parse_or_empty(&payload, "class list", &unit_id, parser::parse_classes)
                }
                Err(err) => {
                    warn!(unit = %unit_id, error = %err, "class fetch failed");
                    continue;
                }
            };
            builder.set_classes(&subject_id, &unit_id, classes);
        }

        Ok(builder.finish(all_subjects, self.clock.now()))
    }

    async fn sync_semesters(&self, session: &str, report: &mut ReconcileReport) {
        let Some(_guard) = self.begin(Resource::Semesters, report).await else {
            return;
        };
        let result = self.fetch_semesters(session).await;
        self.finish(Resource::Semesters, result, report);
    }

    async fn fetch_semesters(&self, session: &str) -> Result<SemesterList, PesuError> {
        let payload = self.portal.fetch(session, &Endpoint::SemesterList).await?;
        let semesters = parser::parse_semesters(&payload.html_text()?.unwrap_or_default());
        if semesters.is_empty() {
            return Err(PesuError::parse("semester list", "no semesters in response"));
        }
        let list = SemesterList {
            semesters,
            fetched_at: self.clock.now(),
        };
        save_record(self.store.as_ref(), keys::SEMESTERS, &list).await?;
        Ok(list)
    }

    async fn sync_gpa(
        &self,
        session: &str,
        semesters: &SemesterList,
        report: &mut ReconcileReport,
    ) {
        let Some(_guard) = self.begin(Resource::Gpa, report).await else {
            return;
        };
        let result = self.fetch_gpa(session, semesters).await;
        self.finish(Resource::Gpa, result, report);
    }

    async fn fetch_gpa(
        &self,
        session: &str,
        semesters: &SemesterList,
    ) -> Result<GpaDocument, PesuError> {
        let requests = semesters
            .semesters
            .iter()
            .map(|semester| {
                (
                    semester.value.clone(),
                    Endpoint::SemesterGpa {
                        semester_id: semester.value.clone(),
                    },
                )
            })
            .collect::<Vec<_>>();
        let payloads = self.fetch_all(session, requests).await;

        let mut records = BTreeMap::new();
        for (semester_id, result) in payloads {
            match result.and_then(|payload| payload.html_text()) {
                Ok(html) => {
                    let record: GpaRecord = parser::parse_gpa(&html.unwrap_or_default());
                    records.insert(semester_id, record);
                }
                Err(err) => warn!(semester = %semester_id, error = %err, "GPA fetch failed"),
            }
        }
        if records.is_empty() && !semesters.semesters.is_empty() {
            return Err(PesuError::PortalHttp(
                "GPA could not be fetched for any semester".to_string(),
            ));
        }

        let doc = GpaDocument {
            semesters: records,
            fetched_at: self.clock.now(),
        };
        save_record(self.store.as_ref(), keys::GPA, &doc).await?;
        Ok(doc)
    }

    async fn fetch_all<K>(
        &self,
        session: &str,
        requests: Vec<(K, Endpoint)>,
    ) -> HashMap<K, Result<RawPayload, PesuError>>
    where
        K: Eq + std::hash::Hash + Send + 'static,
    {
        let jobs = requests
            .into_iter()
            .map(|(key, endpoint)| {
                let portal = Arc::clone(&self.portal);
                let session = session.to_string();
                async move {
                    let result = portal.fetch(&session, &endpoint).await;
                    (key, result)
                }
            })
            .collect::<Vec<_>>();
        let mut results = HashMap::new();
        pool::run_bounded(self.options.fetch_concurrency, jobs, |(key, result)| {
            results.insert(key, result);
        })
        .await;
        results
    }

    /// Takes the resource lock. Returns `None` when another pass holds it, or
    /// when that pass committed the resource after this one took its snapshot.
    async fn begin(
        &self,
        resource: Resource,
        report: &mut ReconcileReport,
    ) -> Option<LockGuard<'_>> {
        let Some(guard) = self.locks.try_acquire(resource) else {
            debug!(resource = ?resource, "fetch already in flight; skipping");
            report.skipped.push(resource);
            return None;
        };
        if resource != Resource::Credential {
            match self.is_present(resource).await {
                Ok(true) => {
                    debug!(resource = ?resource, "committed by a concurrent pass; skipping");
                    report.skipped.push(resource);
                    return None;
                }
                Ok(false) => {}
                Err(err) => warn!(resource = ?resource, error = %err, "store check failed"),
            }
        }
        self.set_state(resource, ResourceState::Fetching);
        report.attempted.push(resource);
        Some(guard)
    }

    fn finish<T>(
        &self,
        resource: Resource,
        result: Result<T, PesuError>,
        report: &mut ReconcileReport,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.set_state(resource, ResourceState::Committed);
                report.committed.push(resource);
                Some(value)
            }
            Err(err) => {
                warn!(resource = ?resource, error = %err, "resource sync failed");
                self.set_state(resource, ResourceState::Failed);
                report.failed.push((resource, err.to_string()));
                None
            }
        }
    }

    fn set_state(&self, resource: Resource, state: ResourceState) {
        if let Ok(mut states) = self.states.lock() {
            states[resource.index()] = state;
        }
    }
}

fn parse_or_empty<T>(
    payload: &RawPayload,
    record: &str,
    node: &str,
    parse: impl FnOnce(&str) -> Vec<T>,
) -> Vec<T> {
    match payload.html_text() {
        Ok(Some(html)) => parse(&html),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(node = %node, record, error = %err, "unreadable payload");
            Vec::new()
        }
    }
}

/// Subjects that belong to this student: matching program prefix, batch and
/// branch, plus first-year common courses and university-wide codes.
pub fn filter_relevant(
    subjects: &[SubjectSummary],
    profile: &UserProfile,
    filter: &SubjectFilterConfig,
) -> Vec<SubjectSummary> {
    let batch = profile.batch();
    subjects
        .iter()
        .filter(|subject| !subject.id.is_empty())
        .filter(|subject| {
            let code = subject.code.trim().to_uppercase();
            if filter
                .university_wide_prefixes
                .iter()
                .any(|prefix| code.starts_with(prefix.as_str()))
            {
                return true;
            }
            if !filter
                .program_prefixes
                .iter()
                .any(|prefix| code.starts_with(prefix.as_str()))
            {
                return false;
            }
            let Some(batch) = batch.as_ref() else {
                return true;
            };
            let Some(parsed) = SubjectCode::parse(&code) else {
                return false;
            };
            parsed.batch == batch.batch
                && (parsed.branch == batch.branch || parsed.semester().is_some_and(|sem| sem <= 2))
        })
        .cloned()
        .collect()
}

/// Local structure a pass fills in before the single commit write.
#[derive(Default)]
struct TreeBuilder {
    subjects: BTreeMap<String, Subject>,
}

impl TreeBuilder {
    fn add_subject(&mut self, summary: &SubjectSummary, units: Vec<ParsedUnit>) {
        if self.subjects.contains_key(&summary.id) {
            return;
        }
        let mut seen = HashSet::new();
        let units = units
            .into_iter()
            .filter(|unit| seen.insert(unit.id.clone()))
            .map(|unit| Unit {
                id: unit.id,
                name: unit.name,
                number: unit.number,
                classes: Vec::new(),
            })
            .collect();
        self.subjects.insert(
            summary.id.clone(),
            Subject {
                id: summary.id.clone(),
                code: summary.code.clone(),
                name: summary.name.clone(),
                units,
            },
        );
    }

    fn unit_keys(&self) -> Vec<(String, String)> {
        self.subjects
            .values()
            .flat_map(|subject| {
                subject
                    .units
                    .iter()
                    .map(|unit| (subject.id.clone(), unit.id.clone()))
            })
            .collect()
    }

    fn set_classes(&mut self, subject_id: &str, unit_id: &str, classes: Vec<ClassRecord>) {
        let Some(unit) = self
            .subjects
            .get_mut(subject_id)
            .and_then(|subject| subject.units.iter_mut().find(|unit| unit.id == unit_id))
        else {
            return;
        };
        let mut seen = HashSet::new();
        unit.classes = classes
            .into_iter()
            .filter(|class| seen.insert(class.id.clone()))
            .collect();
    }

    fn finish(self, all_subjects: Vec<SubjectSummary>, fetched_at: DateTime<Utc>) -> CacheDocument {
        CacheDocument {
            subjects: self.subjects,
            all_subjects_flat: all_subjects,
            fetched_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Tick,
    CredentialArrived(String),
    Manual,
}

/// Cloneable handle for firing triggers at a running [`Scheduler`].
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    sender: mpsc::UnboundedSender<Trigger>,
}

impl TriggerHandle {
    /// Returns false once the scheduler has stopped.
    pub fn fire(&self, trigger: Trigger) -> bool {
        self.sender.send(trigger).is_ok()
    }
}

/// Repeating reconciliation task. Dropping or cancelling it stops the loop.
pub struct Scheduler {
    handle: JoinHandle<()>,
    triggers: TriggerHandle,
}

impl Scheduler {
    pub fn spawn<P, S, C>(orchestrator: Arc<SyncOrchestrator<P, S, C>>, period: Duration) -> Self
    where
        P: PortalClient + 'static,
        S: KeyValueStore + 'static,
        C: CredentialProvider + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                let trigger = tokio::select! {
                    _ = ticker.tick() => Trigger::Tick,
                    received = receiver.recv() => match received {
                        Some(trigger) => trigger,
                        None => break,
                    },
                };
                debug!(trigger = ?trigger, "sync triggered");
                if let Trigger::CredentialArrived(token) = &trigger {
                    if let Err(err) = orchestrator.accept_credential(token).await {
                        warn!(error = %err, "failed to store credential");
                    }
                }
                if let Err(err) = orchestrator.reconcile_settled().await {
                    warn!(error = %err, "reconciliation pass failed");
                }
            }
        });
        Self {
            handle,
            triggers: TriggerHandle { sender },
        }
    }

    pub fn triggers(&self) -> TriggerHandle {
        self.triggers.clone()
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

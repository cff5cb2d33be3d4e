//! Generation orchestrator: AI backfill for sections the mapping left
//! empty.
//!
//! The phase is embarrassingly parallel across record×section pairs: a
//! semaphore-bounded worker pool processes jobs with no ordering
//! guarantees between them, while an in-flight key set keeps two workers
//! off the same record+section. Budget admission goes through the
//! run-scoped [`CostLedger`] before every dispatch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use termforge_genai::{GenerationBackend, GenerationRequest};
use termforge_shared::{
    ContentRecord, CostLedgerEntry, GapOrder, GenerationConfig, GenerationJob, JobStatus,
    QualityConfig, RecordKey, Result, Section, SectionContent, SectionId, SectionStatus,
};
use termforge_storage::Storage;

use crate::events::{EventSink, PipelineEvent};
use crate::ledger::CostLedger;
use crate::quality::{QualityDecision, QualityEvaluator};

/// Exit report of a generation run.
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub jobs_created: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_budget_exceeded: u64,
    /// Jobs whose content came back below the salvage floor and was
    /// flagged for human review.
    pub jobs_flagged: u64,
    pub total_cost_usd: f64,
    pub elapsed: Duration,
}

/// One empty section awaiting content.
#[derive(Debug, Clone)]
struct Gap {
    key: RecordKey,
    term: String,
    section: SectionId,
    context: serde_json::Value,
}

/// Terminal outcome of one job, for report aggregation.
enum JobOutcome {
    Succeeded,
    Flagged,
    Failed,
    BudgetExceeded,
    Skipped,
}

/// Shared state handed to every worker.
struct WorkerCtx {
    storage: Arc<Storage>,
    backend: Arc<dyn GenerationBackend>,
    ledger: CostLedger,
    evaluator: QualityEvaluator,
    events: Arc<dyn EventSink>,
    config: GenerationConfig,
}

/// Run AI backfill for every empty section of every record of a source.
///
/// The gap scan reads actual section state from the store, so a stale
/// job row can never hide a still-empty section.
#[instrument(skip_all, fields(source_hash = %source_hash))]
pub async fn run_generation(
    source_hash: &str,
    storage: Arc<Storage>,
    backend: Arc<dyn GenerationBackend>,
    config: &GenerationConfig,
    quality: QualityConfig,
    events: Arc<dyn EventSink>,
) -> Result<GenerationReport> {
    let start = Instant::now();

    let mut gaps = scan_gaps(&storage, source_hash).await?;
    if config.order == GapOrder::BottomUp {
        gaps.reverse();
    }

    let jobs_created = gaps.len() as u64;
    info!(
        source_hash,
        gaps = jobs_created,
        concurrency = config.concurrency,
        budget_usd = config.budget_ceiling_usd,
        order = ?config.order,
        "starting generation run"
    );

    let ctx = Arc::new(WorkerCtx {
        storage,
        backend,
        ledger: CostLedger::new(config.budget_ceiling_usd, 0.0),
        evaluator: QualityEvaluator::new(quality),
        events,
        config: config.clone(),
    });
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let in_flight = Arc::new(Mutex::new(HashSet::<(String, SectionId)>::new()));

    let mut handles = Vec::with_capacity(gaps.len());
    for gap in gaps {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let in_flight = in_flight.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");

            let guard_key = (gap.key.0.clone(), gap.section);
            {
                let mut guard = in_flight.lock().expect("in-flight lock poisoned");
                if !guard.insert(guard_key.clone()) {
                    return JobOutcome::Skipped;
                }
            }

            let outcome = run_job(&ctx, &gap).await;

            in_flight
                .lock()
                .expect("in-flight lock poisoned")
                .remove(&guard_key);
            outcome
        }));
    }

    let mut report = GenerationReport {
        jobs_created,
        ..Default::default()
    };
    for handle in handles {
        match handle.await {
            Ok(JobOutcome::Succeeded) => report.jobs_succeeded += 1,
            Ok(JobOutcome::Flagged) => report.jobs_flagged += 1,
            Ok(JobOutcome::Failed) => report.jobs_failed += 1,
            Ok(JobOutcome::BudgetExceeded) => report.jobs_budget_exceeded += 1,
            Ok(JobOutcome::Skipped) => {}
            Err(e) => {
                warn!(error = %e, "generation worker panicked");
                report.jobs_failed += 1;
            }
        }
    }
    report.total_cost_usd = ctx.ledger.spent();
    report.elapsed = start.elapsed();

    info!(
        jobs_created = report.jobs_created,
        jobs_succeeded = report.jobs_succeeded,
        jobs_failed = report.jobs_failed,
        jobs_budget_exceeded = report.jobs_budget_exceeded,
        jobs_flagged = report.jobs_flagged,
        total_cost_usd = report.total_cost_usd,
        elapsed_ms = report.elapsed.as_millis(),
        "generation run complete"
    );

    Ok(report)
}

/// Page through the source's records and collect every empty section,
/// one gap per record×section pair.
async fn scan_gaps(storage: &Storage, source_hash: &str) -> Result<Vec<Gap>> {
    const PAGE_SIZE: u64 = 500;

    let mut gaps = Vec::new();
    let mut offset = 0u64;
    loop {
        let page = storage
            .list_records_page(source_hash, PAGE_SIZE, offset)
            .await?;
        if page.is_empty() {
            break;
        }
        offset += page.len() as u64;

        for record in &page {
            let context = context_payload(record);
            for section in record.empty_sections() {
                gaps.push(Gap {
                    key: record.key.clone(),
                    term: record.term.clone(),
                    section,
                    context: context.clone(),
                });
            }
        }
    }
    Ok(gaps)
}

/// Context handed to the backend: whatever the mapping already knows
/// about the term.
fn context_payload(record: &ContentRecord) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(section) = record.sections.get(&SectionId::DefinitionOverview) {
        if let Some(SectionContent::Text(text)) = &section.content {
            map.insert("definition".into(), serde_json::Value::String(text.clone()));
        }
    }
    if let Some(category) = &record.category_ref {
        map.insert("category".into(), serde_json::Value::String(category.clone()));
    }
    serde_json::Value::Object(map)
}

/// Drive one job through its state machine:
/// `queued → running → {succeeded | failed | budget_exceeded}`.
async fn run_job(ctx: &WorkerCtx, gap: &Gap) -> JobOutcome {
    let mut job = GenerationJob::queued(
        gap.key.clone(),
        gap.section,
        ctx.config.default_model.clone(),
    );
    emit_transition(ctx, &job);
    if let Err(e) = ctx.storage.save_job(&job).await {
        warn!(job_id = %job.id, error = %e, "failed to persist queued job");
        return JobOutcome::Failed;
    }

    let estimate = ctx.config.estimated_call_cost_usd;
    // Best salvage-band candidate across attempts.
    let mut best: Option<(String, f64)> = None;
    let mut regenerated = false;

    loop {
        // Budget admission precedes every dispatch; over the ceiling the
        // job terminates without the backend ever being called.
        if !ctx.ledger.admit(estimate) {
            ctx.events.emit(&PipelineEvent::BudgetExceeded {
                job_id: job.id.clone(),
                ceiling_usd: ctx.ledger.ceiling(),
                projected_usd: ctx.ledger.spent() + estimate,
            });
            append_ledger(ctx, &job, 0.0).await;
            return finish_job(ctx, job, JobStatus::BudgetExceeded, None, |storage, job| {
                empty_marker_update(storage, job)
            })
            .await;
        }

        job.attempts += 1;
        if job.attempts == 1 {
            job.status = JobStatus::Running;
            emit_transition(ctx, &job);
            if let Err(e) = ctx.storage.save_job(&job).await {
                warn!(job_id = %job.id, error = %e, "failed to persist running job");
            }
        }

        // The final attempt routes to the fallback model.
        job.model_id = if job.attempts >= ctx.config.max_attempts
            && !ctx.config.fallback_model.is_empty()
        {
            ctx.config.fallback_model.clone()
        } else {
            ctx.config.default_model.clone()
        };

        let request = GenerationRequest {
            term: gap.term.clone(),
            section: gap.section,
            context: gap.context.clone(),
            model_id: job.model_id.clone(),
        };

        match ctx.backend.generate(&request).await {
            Ok(generated) => {
                ctx.ledger.settle(estimate, generated.cost_incurred);
                job.cost_incurred += generated.cost_incurred;
                append_ledger(ctx, &job, generated.cost_incurred).await;

                let verdict =
                    ctx.evaluator
                        .evaluate(gap.section, &gap.term, &generated.content);
                job.quality_score = Some(verdict.score);

                match verdict.decision {
                    QualityDecision::Verified => {
                        let section = section_value(
                            generated.content,
                            SectionStatus::Verified,
                            verdict.score,
                        );
                        return finish_job(
                            ctx,
                            job,
                            JobStatus::Succeeded,
                            Some(verdict.score),
                            move |storage, job| section_update(storage, job, section),
                        )
                        .await;
                    }
                    QualityDecision::Regenerate => {
                        if best.as_ref().is_none_or(|(_, s)| verdict.score > *s) {
                            best = Some((generated.content, verdict.score));
                        }
                        // One automatic regeneration, counted against the
                        // attempt budget.
                        if !regenerated && job.attempts < ctx.config.max_attempts {
                            regenerated = true;
                            continue;
                        }
                        let (content, score) =
                            best.take().expect("salvage band always records a candidate");
                        job.quality_score = Some(score);
                        let section =
                            section_value(content, SectionStatus::Generated, score);
                        return finish_job(
                            ctx,
                            job,
                            JobStatus::Succeeded,
                            Some(score),
                            move |storage, job| section_update(storage, job, section),
                        )
                        .await;
                    }
                    QualityDecision::Flagged => {
                        let section = section_value(
                            generated.content,
                            SectionStatus::Flagged,
                            verdict.score,
                        );
                        let outcome = finish_job(
                            ctx,
                            job,
                            JobStatus::Succeeded,
                            Some(verdict.score),
                            move |storage, job| section_update(storage, job, section),
                        )
                        .await;
                        return match outcome {
                            JobOutcome::Succeeded => JobOutcome::Flagged,
                            other => other,
                        };
                    }
                }
            }
            Err(e) if e.is_retryable() && job.attempts < ctx.config.max_attempts => {
                ctx.ledger.settle(estimate, 0.0);
                append_ledger(ctx, &job, 0.0).await;
                let delay = ctx.config.backoff_base_ms << (job.attempts - 1);
                warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    delay_ms = delay,
                    error = %e,
                    "generation attempt failed, backing off"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                ctx.ledger.settle(estimate, 0.0);
                append_ledger(ctx, &job, 0.0).await;
                warn!(job_id = %job.id, attempts = job.attempts, error = %e, "job failed");
                return finish_job(ctx, job, JobStatus::Failed, None, |storage, job| {
                    flagged_marker_update(storage, job)
                })
                .await;
            }
        }
    }
}

/// Persist the terminal state: exactly one section update and one job
/// row per terminal job.
async fn finish_job<F, Fut>(
    ctx: &WorkerCtx,
    mut job: GenerationJob,
    status: JobStatus,
    quality_score: Option<f64>,
    update: F,
) -> JobOutcome
where
    F: FnOnce(Arc<Storage>, GenerationJob) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    job.status = status;
    job.quality_score = quality_score.or(job.quality_score);
    job.finished_at = Some(Utc::now());
    emit_transition(ctx, &job);

    if let Err(e) = update(ctx.storage.clone(), job.clone()).await {
        warn!(job_id = %job.id, error = %e, "terminal section update failed");
        if let Err(e) = ctx.storage.save_job(&job).await {
            warn!(job_id = %job.id, error = %e, "failed to persist job row");
        }
        return JobOutcome::Failed;
    }
    if let Err(e) = ctx.storage.save_job(&job).await {
        warn!(job_id = %job.id, error = %e, "failed to persist job row");
    }

    match status {
        JobStatus::Succeeded => JobOutcome::Succeeded,
        JobStatus::BudgetExceeded => JobOutcome::BudgetExceeded,
        _ => JobOutcome::Failed,
    }
}

fn section_value(content: String, status: SectionStatus, score: f64) -> Section {
    Section {
        content: Some(SectionContent::Text(content)),
        status,
        source_confidence: (score / 100.0) as f32,
    }
}

async fn section_update(storage: Arc<Storage>, job: GenerationJob, section: Section) -> Result<()> {
    storage
        .update_section(&job.record_key, job.section, &section)
        .await
}

/// Terminal failure marker: no content, flagged for review.
async fn flagged_marker_update(storage: Arc<Storage>, job: GenerationJob) -> Result<()> {
    let marker = Section {
        content: None,
        status: SectionStatus::Flagged,
        source_confidence: 0.0,
    };
    storage
        .update_section(&job.record_key, job.section, &marker)
        .await
}

/// Budget-stopped jobs leave the slot empty so a later run with fresh
/// budget picks it up again.
async fn empty_marker_update(storage: Arc<Storage>, job: GenerationJob) -> Result<()> {
    storage
        .update_section(&job.record_key, job.section, &Section::empty())
        .await
}

async fn append_ledger(ctx: &WorkerCtx, job: &GenerationJob, amount: f64) {
    let entry = CostLedgerEntry {
        job_id: job.id.clone(),
        model_id: job.model_id.clone(),
        amount,
        created_at: Utc::now(),
    };
    if let Err(e) = ctx.storage.append_cost(&entry).await {
        warn!(job_id = %job.id, error = %e, "failed to append cost ledger entry");
    }
}

fn emit_transition(ctx: &WorkerCtx, job: &GenerationJob) {
    ctx.events.emit(&PipelineEvent::JobTransition {
        job_id: job.id.clone(),
        record_key: job.record_key.clone(),
        section: job.section,
        status: job.status,
        attempt: job.attempts,
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SilentEvents;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use termforge_genai::GeneratedContent;
    use termforge_shared::{AppConfig, TermForgeError};
    use uuid::Uuid;

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("tf_gen_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    fn test_config() -> GenerationConfig {
        let mut config = GenerationConfig::from(&AppConfig::default());
        config.backoff_base_ms = 1;
        config.concurrency = 4;
        config
    }

    /// Record with every section mapped except the given gaps.
    fn record_with_gaps(key: &str, term: &str, gaps: &[SectionId]) -> ContentRecord {
        let mut record = ContentRecord::new(RecordKey(key.into()), term, "src-hash");
        record.row_content_hash = "h".into();
        for id in SectionId::ALL {
            if !gaps.contains(&id) {
                record.sections.insert(
                    id,
                    Section::mapped(SectionContent::Text(format!(
                        "Mapped content about {term} for this slot."
                    ))),
                );
            }
        }
        record
    }

    enum Scripted {
        Content { text: String, cost: f64 },
        Retryable,
        Terminal,
    }

    /// Scripted backend: pops responses in order, then defaults to solid
    /// content.
    struct FakeBackend {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<(String, SectionId, String)>>,
    }

    impl FakeBackend {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn solid_content(term: &str) -> String {
            format!(
                "{term} is a foundational concept in machine learning practice. \
                 It appears across model training, evaluation, and deployment. \
                 Practitioners rely on {term} daily, and its behavior is well \
                 documented in textbooks, courses, and reference material."
            )
        }
    }

    #[async_trait]
    impl GenerationBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> termforge_shared::Result<GeneratedContent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((
                request.term.clone(),
                request.section,
                request.model_id.clone(),
            ));

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Content { text, cost }) => Ok(GeneratedContent {
                    content: text,
                    cost_incurred: cost,
                    tokens_in: 100,
                    tokens_out: 50,
                    model: request.model_id.clone(),
                    latency_ms: 5,
                }),
                Some(Scripted::Retryable) => {
                    Err(TermForgeError::generation_retryable("scripted 429"))
                }
                Some(Scripted::Terminal) => {
                    Err(TermForgeError::generation_terminal("scripted 400"))
                }
                None => Ok(GeneratedContent {
                    content: Self::solid_content(&request.term),
                    cost_incurred: 0.001,
                    tokens_in: 100,
                    tokens_out: 50,
                    model: request.model_id.clone(),
                    latency_ms: 5,
                }),
            }
        }
    }

    async fn run(
        storage: Arc<Storage>,
        backend: Arc<FakeBackend>,
        config: &GenerationConfig,
    ) -> GenerationReport {
        run_generation(
            "src-hash",
            storage,
            backend,
            config,
            QualityConfig::default(),
            Arc::new(SilentEvents),
        )
        .await
        .expect("generation run")
    }

    #[tokio::test]
    async fn creates_exactly_one_job_per_empty_section() {
        let storage = test_storage().await;
        let record = record_with_gaps(
            "attention",
            "Attention",
            &[SectionId::Faqs, SectionId::CaseStudies, SectionId::HowItWorks],
        );
        storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();

        let backend = FakeBackend::new(vec![]);
        let report = run(storage.clone(), backend.clone(), &test_config()).await;

        assert_eq!(report.jobs_created, 3);
        assert_eq!(report.jobs_succeeded, 3);
        assert_eq!(backend.calls(), 3);

        let stored = storage.get_record(&record.key).await.unwrap().unwrap();
        assert!(stored.empty_sections().is_empty());
        assert_eq!(
            stored.sections[&SectionId::Faqs].status,
            SectionStatus::Verified
        );

        // A second run finds nothing left to do.
        let report = run(storage, backend, &test_config()).await;
        assert_eq!(report.jobs_created, 0);
    }

    #[tokio::test]
    async fn retries_then_succeeds_with_full_ledger_trail() {
        let storage = test_storage().await;
        let record = record_with_gaps("relu", "ReLU", &[SectionId::Faqs]);
        storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();

        let backend = FakeBackend::new(vec![Scripted::Retryable, Scripted::Retryable]);
        let report = run(storage.clone(), backend.clone(), &test_config()).await;

        assert_eq!(report.jobs_succeeded, 1);
        assert_eq!(backend.calls(), 3);

        let jobs = storage.list_jobs_for_record(&record.key).await.unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempts, 3);
        // One ledger entry per attempt: two zero-cost, one real.
        assert_eq!(storage.ledger_entry_count(&job.id).await.unwrap(), 3);
        let cost = storage.cost_for_job(&job.id).await.unwrap();
        assert!((cost - 0.001).abs() < 1e-9);
        // Final attempt routed to the fallback model.
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[2].2, test_config().fallback_model);
    }

    #[tokio::test]
    async fn terminal_failure_flags_the_section() {
        let storage = test_storage().await;
        let record = record_with_gaps("gan", "GAN", &[SectionId::Faqs]);
        storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();

        let backend = FakeBackend::new(vec![Scripted::Terminal]);
        let report = run(storage.clone(), backend.clone(), &test_config()).await;

        assert_eq!(report.jobs_failed, 1);
        assert_eq!(report.jobs_succeeded, 0);
        // Terminal classification short-circuits: exactly one call.
        assert_eq!(backend.calls(), 1);

        let stored = storage.get_record(&record.key).await.unwrap().unwrap();
        let section = &stored.sections[&SectionId::Faqs];
        assert_eq!(section.status, SectionStatus::Flagged);
        assert!(section.content.is_none());

        let jobs = storage.list_jobs_for_record(&record.key).await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(storage.ledger_entry_count(&jobs[0].id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn budget_ceiling_stops_jobs_before_dispatch() {
        let storage = test_storage().await;
        let record = record_with_gaps(
            "bert",
            "BERT",
            &[SectionId::Faqs, SectionId::CaseStudies],
        );
        storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();

        let mut config = test_config();
        config.budget_ceiling_usd = 0.0;
        let backend = FakeBackend::new(vec![]);
        let report = run(storage.clone(), backend.clone(), &config).await;

        assert_eq!(report.jobs_budget_exceeded, 2);
        assert_eq!(backend.calls(), 0, "backend must not be called over budget");

        // Sections stay empty so a funded re-run can pick them up.
        let stored = storage.get_record(&record.key).await.unwrap().unwrap();
        assert_eq!(stored.empty_sections().len(), 2);

        // Zero-cost ledger entries keep the audit trail complete.
        let jobs = storage.list_jobs_for_record(&record.key).await.unwrap();
        assert_eq!(jobs.len(), 2);
        for job in &jobs {
            assert_eq!(job.status, JobStatus::BudgetExceeded);
            assert_eq!(storage.ledger_entry_count(&job.id).await.unwrap(), 1);
            assert_eq!(storage.cost_for_job(&job.id).await.unwrap(), 0.0);
        }
    }

    #[tokio::test]
    async fn budget_admits_some_jobs_then_stops() {
        let storage = test_storage().await;
        let record = record_with_gaps(
            "lstm",
            "LSTM",
            &[SectionId::Faqs, SectionId::CaseStudies, SectionId::HowItWorks],
        );
        storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();

        let mut config = test_config();
        config.concurrency = 1;
        config.estimated_call_cost_usd = 0.002;
        config.budget_ceiling_usd = 0.005;
        let backend = FakeBackend::new(vec![]);
        let report = run(storage.clone(), backend.clone(), &config).await;

        // Two reservations of 0.002 fit under 0.005; settles at 0.001
        // each free room for the third.
        assert_eq!(
            report.jobs_succeeded + report.jobs_budget_exceeded,
            3,
            "every job reached a terminal state"
        );
        assert!(report.total_cost_usd <= config.budget_ceiling_usd + config.estimated_call_cost_usd);
    }

    #[tokio::test]
    async fn salvage_band_regenerates_once() {
        let storage = test_storage().await;
        let record = record_with_gaps("gradient-descent", "Gradient Descent", &[SectionId::HowItWorks]);
        storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();

        // First response is thin (salvage band), second is solid.
        let backend = FakeBackend::new(vec![Scripted::Content {
            text: "Gradient Descent minimizes loss.".into(),
            cost: 0.001,
        }]);
        let report = run(storage.clone(), backend.clone(), &test_config()).await;

        assert_eq!(report.jobs_succeeded, 1);
        assert_eq!(backend.calls(), 2);

        let stored = storage.get_record(&record.key).await.unwrap().unwrap();
        assert_eq!(
            stored.sections[&SectionId::HowItWorks].status,
            SectionStatus::Verified
        );

        let jobs = storage.list_jobs_for_record(&record.key).await.unwrap();
        assert_eq!(jobs[0].attempts, 2);
    }

    #[tokio::test]
    async fn unsalvageable_content_is_flagged_for_review() {
        let storage = test_storage().await;
        let record = record_with_gaps("svm", "SVM", &[SectionId::HowItWorks]);
        storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();

        let backend = FakeBackend::new(vec![Scripted::Content {
            text: "I cannot generate content for this request.".into(),
            cost: 0.001,
        }]);
        let report = run(storage.clone(), backend.clone(), &test_config()).await;

        assert_eq!(report.jobs_flagged, 1);
        // Flagged means no retry loop: one call only.
        assert_eq!(backend.calls(), 1);

        let stored = storage.get_record(&record.key).await.unwrap().unwrap();
        let section = &stored.sections[&SectionId::HowItWorks];
        assert_eq!(section.status, SectionStatus::Flagged);
        assert!(section.content.is_some(), "flagged content kept for review");
    }

    #[tokio::test]
    async fn bottom_up_order_reverses_processing() {
        let storage = test_storage().await;
        for key in ["alpha", "zeta"] {
            let record = record_with_gaps(key, key, &[SectionId::Faqs]);
            storage.upsert_records(std::slice::from_ref(&record)).await.unwrap();
        }

        let mut config = test_config();
        config.concurrency = 1;
        config.order = GapOrder::BottomUp;
        let backend = FakeBackend::new(vec![]);
        run(storage, backend.clone(), &config).await;

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.first().map(|r| r.0.as_str()), Some("zeta"));
    }
}

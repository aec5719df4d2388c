use crate::{
    artifact::ArtifactResolver,
    checkpoint::{CheckpointStore, FailureLog, FailureRecord, JudgmentResult},
    config::Scoring,
    judge::{JudgeClient, JudgeError, Transport},
    manifest::Sample,
    parser,
};
use anyhow::{Result, anyhow};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const PROGRESS_EVERY: usize = 10;

pub struct Pipeline<T: Transport> {
    client: JudgeClient<T>,
    resolver: ArtifactResolver,
    scoring: Scoring,
    parse_retries: u32,
    workers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub already_committed: usize,
    pub judged: usize,
    pub needs_review: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
}

struct Shared<'s> {
    store: &'s mut CheckpointStore,
    failures: &'s mut FailureLog,
    stats: RunStats,
    done: usize,
    pending: usize,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(
        client: JudgeClient<T>,
        resolver: ArtifactResolver,
        parse_retries: u32,
        workers: usize,
    ) -> Self {
        let scoring = client.settings().scoring.clone();
        Self {
            client,
            resolver,
            scoring,
            parse_retries,
            workers: workers.max(1),
        }
    }

    /// Judges every sample not yet in `store`. Per-sample failures are
    /// recorded and the batch continues; only storage errors abort the run.
    pub fn run(
        &self,
        samples: &[Sample],
        store: &mut CheckpointStore,
        failures: &mut FailureLog,
    ) -> Result<RunStats> {
        let started = Instant::now();
        let queue: VecDeque<&Sample> = samples.iter().filter(|s| !store.contains(s.index)).collect();
        let pending = queue.len();

        let stats = RunStats {
            total: samples.len(),
            already_committed: samples.len() - pending,
            ..Default::default()
        };
        info!(
            total = stats.total,
            committed = stats.already_committed,
            pending,
            workers = self.workers,
            "starting judge run"
        );

        let queue = Mutex::new(queue);
        let shared = Mutex::new(Shared {
            store,
            failures,
            stats,
            done: 0,
            pending,
        });
        let abort = AtomicBool::new(false);

        let workers = self.workers.min(pending.max(1));
        if workers == 1 {
            self.worker(&queue, &shared, &abort)?;
        } else {
            std::thread::scope(|scope| -> Result<()> {
                let handles: Vec<_> = (0..workers)
                    .map(|_| scope.spawn(|| self.worker(&queue, &shared, &abort)))
                    .collect();
                let mut first_err = None;
                for h in handles {
                    let res = h.join().map_err(|_| anyhow!("judge worker panicked"))?;
                    if let Err(err) = res {
                        first_err.get_or_insert(err);
                    }
                }
                first_err.map_or(Ok(()), Err)
            })?;
        }

        let shared = shared
            .into_inner()
            .map_err(|_| anyhow!("run state lock poisoned"))?;
        info!(
            judged = shared.stats.judged,
            failed = shared.stats.failed,
            needs_review = shared.stats.needs_review,
            elapsed_s = started.elapsed().as_secs(),
            "judge run finished"
        );
        Ok(shared.stats)
    }

    fn worker(
        &self,
        queue: &Mutex<VecDeque<&Sample>>,
        shared: &Mutex<Shared<'_>>,
        abort: &AtomicBool,
    ) -> Result<()> {
        loop {
            if abort.load(Ordering::SeqCst) {
                return Ok(());
            }
            // Each index leaves the queue exactly once, so it is never in flight twice.
            let next = queue
                .lock()
                .map_err(|_| anyhow!("queue lock poisoned"))?
                .pop_front();
            let Some(sample) = next else {
                return Ok(());
            };

            let outcome = self.evaluate(sample);

            let mut guard = shared.lock().map_err(|_| anyhow!("run state lock poisoned"))?;
            if let Err(err) = commit(&mut guard, sample.index, outcome) {
                abort.store(true, Ordering::SeqCst);
                return Err(err);
            }
            guard.done += 1;
            if guard.done % PROGRESS_EVERY == 0 || guard.done == guard.pending {
                info!(
                    "progress {}/{} | judged={} failed={}",
                    guard.done, guard.pending, guard.stats.judged, guard.stats.failed
                );
            }
        }
    }

    /// Resolve, judge and parse one sample. A response with no readable score
    /// is requested again up to `parse_retries` times.
    pub fn evaluate(&self, sample: &Sample) -> Result<JudgmentResult, JudgeError> {
        let generated = self.resolver.resolve(sample.index, sample.category);
        let expected = self.resolver.expected_path(sample.index, sample.category);
        let req = self
            .client
            .build_request(sample, generated.as_deref(), &expected)?;

        let mut last_raw = String::new();
        for attempt in 0..=self.parse_retries {
            let raw = self.client.send(sample.index, &req)?;
            match parser::parse(&raw, &self.scoring) {
                Ok(parsed) => {
                    return Ok(JudgmentResult::from_parsed(
                        sample.index,
                        parsed,
                        raw,
                        &self.client.settings().model,
                    ));
                }
                Err(err) => {
                    warn!(index = sample.index, attempt, "unparseable judge output: {err}");
                    last_raw = raw;
                }
            }
        }
        Err(JudgeError::MalformedOutput {
            message: format!(
                "no score fields after {} response(s)",
                self.parse_retries + 1
            ),
            raw: last_raw,
        })
    }
}

fn commit(
    shared: &mut Shared<'_>,
    index: u64,
    outcome: Result<JudgmentResult, JudgeError>,
) -> Result<()> {
    match outcome {
        Ok(result) => {
            if result.needs_review {
                warn!(index, issues = ?result.issues, "judgment flagged for review");
                shared.stats.needs_review += 1;
            }
            debug!(index, overall = ?result.overall, "committing judgment");
            shared.store.put(result)?;
            shared.failures.clear(index)?;
            shared.stats.judged += 1;
        }
        Err(err) => {
            error!(index, "sample failed: {err}");
            let record = FailureRecord::from_error(index, &err);
            *shared
                .stats
                .failures_by_kind
                .entry(record.kind.as_str().to_string())
                .or_insert(0) += 1;
            shared.failures.record(record)?;
            shared.stats.failed += 1;
        }
    }
    Ok(())
}

/// Re-extracts scores from stored raw responses. Entries whose response still
/// cannot be parsed keep their committed values.
pub fn reparse_all(
    results: &BTreeMap<u64, JudgmentResult>,
    scoring: &Scoring,
) -> BTreeMap<u64, JudgmentResult> {
    results
        .iter()
        .map(|(index, r)| {
            let updated = match parser::parse(&r.raw_response, scoring) {
                Ok(parsed) => JudgmentResult::from_parsed_at(
                    *index,
                    parsed,
                    r.raw_response.clone(),
                    &r.model,
                    r.judged_at.clone(),
                ),
                Err(err) => {
                    warn!(index, "reparse failed, keeping committed scores: {err}");
                    r.clone()
                }
            };
            (*index, updated)
        })
        .collect()
}

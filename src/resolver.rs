use crate::errors::FetchError;
use crate::models::{CardId, CollectionRate, MetricSource, PartnerDefinition, PartnerFigures};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Anything that can turn a card id into a number.
pub trait MetricFetcher: Send + Sync + 'static {
    fn fetch(&self, card: CardId) -> impl Future<Output = Result<f64, FetchError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    Sequential,
    Bounded(usize),
}

impl Default for FetchStrategy {
    fn default() -> Self {
        Self::Bounded(DEFAULT_CONCURRENCY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Current,
    Prior,
    Collection,
}

#[derive(Debug, Clone, Copy)]
struct Job {
    partner: usize,
    field: Field,
    card: CardId,
}

/// Resolves every partner to its figures, in partner order.
///
/// Fetch failures never escape: a failed amount counts as zero and a failed
/// collection rate becomes [`CollectionRate::Unavailable`].
pub async fn resolve<F: MetricFetcher>(
    partners: &[PartnerDefinition],
    fetcher: Arc<F>,
    strategy: FetchStrategy,
) -> Vec<PartnerFigures> {
    let jobs = plan_jobs(partners);
    let outcomes = match strategy {
        FetchStrategy::Sequential => run_sequential(&jobs, fetcher.as_ref()).await,
        FetchStrategy::Bounded(limit) => run_bounded(&jobs, fetcher, limit).await,
    };

    for (job, outcome) in jobs.iter().zip(&outcomes) {
        if let Err(err) = outcome {
            warn!(
                partner = %partners[job.partner].name,
                card = job.card,
                field = ?job.field,
                "metric unavailable: {err}"
            );
        }
    }

    partners
        .iter()
        .enumerate()
        .map(|(idx, partner)| assemble(idx, partner, &jobs, &outcomes))
        .collect()
}

fn plan_jobs(partners: &[PartnerDefinition]) -> Vec<Job> {
    let mut jobs = Vec::new();
    for (partner, definition) in partners.iter().enumerate() {
        let MetricSource::Fetched {
            current_cards,
            prior_cards,
            collection_card,
        } = &definition.metrics
        else {
            continue;
        };
        let fields = current_cards
            .iter()
            .map(|card| (Field::Current, *card))
            .chain(prior_cards.iter().map(|card| (Field::Prior, *card)))
            .chain(collection_card.iter().map(|card| (Field::Collection, *card)));
        jobs.extend(fields.map(|(field, card)| Job {
            partner,
            field,
            card,
        }));
    }
    jobs
}

async fn run_sequential<F: MetricFetcher>(
    jobs: &[Job],
    fetcher: &F,
) -> Vec<Result<f64, FetchError>> {
    let mut outcomes = Vec::with_capacity(jobs.len());
    for job in jobs {
        outcomes.push(fetcher.fetch(job.card).await);
    }
    outcomes
}

async fn run_bounded<F: MetricFetcher>(
    jobs: &[Job],
    fetcher: Arc<F>,
    limit: usize,
) -> Vec<Result<f64, FetchError>> {
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    for (idx, job) in jobs.iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let permits = Arc::clone(&permits);
        let card = job.card;
        set.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => fetcher.fetch(card).await,
                Err(_) => Err(FetchError::Transport("worker pool closed".to_string())),
            };
            (idx, outcome)
        });
    }

    let mut outcomes: Vec<Result<f64, FetchError>> = jobs
        .iter()
        .map(|_| Err(FetchError::Transport("fetch task did not finish".to_string())))
        .collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, outcome)) => outcomes[idx] = outcome,
            Err(err) => error!("metric fetch task failed: {err}"),
        }
    }
    outcomes
}

fn assemble(
    idx: usize,
    partner: &PartnerDefinition,
    jobs: &[Job],
    outcomes: &[Result<f64, FetchError>],
) -> PartnerFigures {
    match &partner.metrics {
        MetricSource::Manual {
            current,
            prior,
            collection_rate,
        } => PartnerFigures {
            current: Some(*current),
            prior: *prior,
            collection_rate: collection_rate.map_or(CollectionRate::Unavailable, CollectionRate::Known),
        },
        MetricSource::Fetched {
            current_cards,
            prior_cards,
            ..
        } => {
            let sum = |field: Field| -> f64 {
                field_outcomes(jobs, outcomes, idx, field)
                    .map(|outcome| outcome.as_ref().copied().unwrap_or(0.0))
                    .sum()
            };
            let collection_rate = match field_outcomes(jobs, outcomes, idx, Field::Collection).next() {
                Some(Ok(rate)) => CollectionRate::Known(*rate),
                _ => CollectionRate::Unavailable,
            };

            PartnerFigures {
                current: (!current_cards.is_empty()).then(|| sum(Field::Current)),
                prior: (!prior_cards.is_empty()).then(|| sum(Field::Prior)),
                collection_rate,
            }
        }
    }
}

fn field_outcomes<'a>(
    jobs: &'a [Job],
    outcomes: &'a [Result<f64, FetchError>],
    partner: usize,
    field: Field,
) -> impl Iterator<Item = &'a Result<f64, FetchError>> + 'a {
    jobs.iter()
        .zip(outcomes)
        .filter(move |(job, _)| job.partner == partner && job.field == field)
        .map(|(_, outcome)| outcome)
}

use std::time::{Duration, Instant};

use shared::{VoteChoice, VoterId};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, info, instrument};

use crate::{
    api::ApiConnector,
    config::HarnessConfig,
    db::DbConnector,
    error::{HarnessError, Result},
    queue::QueueConnector,
    waiter::{expect_vote_updated, VoteReader, WaitPolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    ApiVoteForA,
    ApiChangeVote,
    WorkerVoteForA,
    WorkerChangeVote,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::ApiVoteForA,
        Scenario::ApiChangeVote,
        Scenario::WorkerVoteForA,
        Scenario::WorkerChangeVote,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::ApiVoteForA => "api::vote_for_a",
            Scenario::ApiChangeVote => "api::change_vote",
            Scenario::WorkerVoteForA => "worker::vote_for_a",
            Scenario::WorkerChangeVote => "worker::change_vote",
        }
    }

    /// Connects fresh clients and runs the scenario against the live stack.
    #[instrument(skip(config), fields(scenario = self.name()))]
    pub async fn run(self, config: &HarnessConfig) -> Result<()> {
        let db = DbConnector::connect(&config.db).await?;

        match self {
            Scenario::ApiVoteForA => {
                let api = ApiConnector::new(&config.api)?;
                api_vote_for_a(&api, &db, config.wait).await
            }
            Scenario::ApiChangeVote => {
                let api = ApiConnector::new(&config.api)?;
                api_change_vote(&api, &db, config.wait).await
            }
            Scenario::WorkerVoteForA => {
                let mut queue = QueueConnector::connect(&config.queue).await?;
                worker_vote_for_a(&mut queue, &db, config.wait).await
            }
            Scenario::WorkerChangeVote => {
                let mut queue = QueueConnector::connect(&config.queue).await?;
                worker_change_vote(&mut queue, &db, config.wait).await
            }
        }
    }
}

pub struct ScenarioReport {
    pub scenario: Scenario,
    pub started_at: OffsetDateTime,
    pub elapsed: Duration,
    pub outcome: Result<()>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn started_at_rfc3339(&self) -> String {
        self.started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.started_at.to_string())
    }
}

/// Runs every scenario in order; one failure does not stop the rest.
pub async fn run_all(config: &HarnessConfig) -> Vec<ScenarioReport> {
    let mut reports = Vec::with_capacity(Scenario::ALL.len());

    for scenario in Scenario::ALL {
        info!("▶ Running {}", scenario.name());
        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();

        let outcome = scenario.run(config).await;
        if let Err(e) = &outcome {
            let class = if e.kind().is_data_fault() { "stored data" } else { "infrastructure" };
            error!("✗ {} failed ({} fault, {:?}): {}", scenario.name(), class, e.kind(), e);
        }

        reports.push(ScenarioReport {
            scenario,
            started_at,
            elapsed: clock.elapsed(),
            outcome,
        });
    }

    reports
}

/// No prior record; one vote through the API lands in the store.
pub async fn api_vote_for_a<R: VoteReader + ?Sized>(api: &ApiConnector, db: &R, policy: WaitPolicy) -> Result<()> {
    let a = VoteChoice::new("a")?;
    let (session, voter_id) = api.voter_id().await?;

    expect_vote_updated(db, &voter_id, policy, api.post_vote(&a, Some(&session))).await?;
    expect_vote(db, &voter_id, &a).await
}

/// A second vote from the same session replaces the first.
pub async fn api_change_vote<R: VoteReader + ?Sized>(api: &ApiConnector, db: &R, policy: WaitPolicy) -> Result<()> {
    let a = VoteChoice::new("a")?;
    let b = VoteChoice::new("b")?;
    let (session, voter_id) = api.voter_id().await?;

    let session = expect_vote_updated(db, &voter_id, policy, api.post_vote(&a, Some(&session))).await?;
    expect_vote_updated(db, &voter_id, policy, api.post_vote(&b, Some(&session))).await?;
    expect_vote(db, &voter_id, &b).await
}

/// No prior record; a vote pushed straight onto the queue is stored by the worker.
pub async fn worker_vote_for_a<R: VoteReader + ?Sized>(
    queue: &mut QueueConnector,
    db: &R,
    policy: WaitPolicy,
) -> Result<()> {
    let a = VoteChoice::new("a")?;
    let voter_id = VoterId::generate();

    expect_vote_updated(db, &voter_id, policy, queue.push_vote(&a, &voter_id)).await?;
    expect_vote(db, &voter_id, &a).await
}

/// A later queued vote for the same voter overwrites the stored one.
pub async fn worker_change_vote<R: VoteReader + ?Sized>(
    queue: &mut QueueConnector,
    db: &R,
    policy: WaitPolicy,
) -> Result<()> {
    let a = VoteChoice::new("a")?;
    let b = VoteChoice::new("b")?;
    let voter_id = VoterId::generate();

    expect_vote_updated(db, &voter_id, policy, queue.push_vote(&a, &voter_id)).await?;
    expect_vote_updated(db, &voter_id, policy, queue.push_vote(&b, &voter_id)).await?;
    expect_vote(db, &voter_id, &b).await
}

/// Post-condition check: the stored vote must equal `expected`.
pub async fn expect_vote<R: VoteReader + ?Sized>(db: &R, voter_id: &VoterId, expected: &VoteChoice) -> Result<()> {
    let found = db.fetch_vote(voter_id).await?;
    if found.as_ref() == Some(expected) {
        return Ok(());
    }

    Err(HarnessError::UnexpectedVote {
        voter_id: voter_id.clone(),
        expected: expected.clone(),
        found,
    })
}

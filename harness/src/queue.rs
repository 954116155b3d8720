use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    Client, Cmd,
};
use shared::{QueueEnd, VoteChoice, VoteMessage, VoterId};
use tracing::debug;

use crate::{
    config::QueueConfig,
    error::{HarnessError, Result},
};

/// Producer side of the worker's vote queue.
#[derive(Clone)]
pub struct QueueConnector {
    connection: ConnectionManager,
    key: String,
    expect_drained: bool,
}

impl QueueConnector {
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let manager_config = ConnectionManagerConfig::new().set_number_of_retries(1);

        let client = Client::open(config.url())?;
        let connection = client
            .get_connection_manager_with_config(manager_config)
            .await?;

        debug!(url = %config.url(), key = %config.key, "Connected to vote queue");
        Ok(Self {
            connection,
            key: config.key.clone(),
            expect_drained: config.expect_drained,
        })
    }

    /// Pushes a vote to the back of the queue.
    pub async fn push_vote(&mut self, vote: &VoteChoice, voter_id: &VoterId) -> Result<i64> {
        self.enqueue(vote, voter_id, QueueEnd::Tail).await
    }

    /// Inserts a vote at the front of the queue, ahead of anything pending.
    pub async fn insert_vote(&mut self, vote: &VoteChoice, voter_id: &VoterId) -> Result<i64> {
        self.enqueue(vote, voter_id, QueueEnd::Head).await
    }

    pub async fn enqueue(&mut self, vote: &VoteChoice, voter_id: &VoterId, end: QueueEnd) -> Result<i64> {
        let payload = encode_vote(vote, voter_id)?;

        let depth: i64 = push_command(&self.key, &payload, end)
            .query_async(&mut self.connection)
            .await?;

        debug!(voter_id = %voter_id, vote = %vote, ?end, depth, "Enqueued vote");
        check_depth(depth, self.expect_drained)?;
        Ok(depth)
    }
}

/// RPUSH for the tail, LPUSH for the head.
pub fn push_command(key: &str, payload: &str, end: QueueEnd) -> Cmd {
    let mut cmd = match end {
        QueueEnd::Tail => redis::cmd("RPUSH"),
        QueueEnd::Head => redis::cmd("LPUSH"),
    };
    cmd.arg(key).arg(payload);
    cmd
}

pub fn encode_vote(vote: &VoteChoice, voter_id: &VoterId) -> Result<String> {
    let message = VoteMessage {
        vote: vote.clone(),
        voter_id: voter_id.clone(),
    };
    Ok(serde_json::to_string(&message)?)
}

/// The worker is expected to have drained everything but the pushed message.
pub fn check_depth(depth: i64, expect_drained: bool) -> Result<()> {
    if expect_drained && depth != 1 {
        return Err(HarnessError::QueueNotDrained { depth });
    }
    Ok(())
}

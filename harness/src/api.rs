use reqwest::{header::COOKIE, Client, Response};
use shared::{SessionToken, VoteChoice, VoterId};
use tracing::{debug, warn};

use crate::{
    config::ApiConfig,
    error::{HarnessError, Result},
};

/// Client for the vote web API.
///
/// Holds no session state: the token issued on first contact is returned to
/// the caller, who passes it back on every later request.
#[derive(Clone)]
pub struct ApiConnector {
    client: Client,
    url: String,
    session_cookie: String,
}

impl ApiConnector {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.url(),
            session_cookie: config.session_cookie.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GETs the index page so the API issues a session cookie.
    pub async fn open_session(&self) -> Result<SessionToken> {
        debug!(url = %self.url, "Getting {} cookie", self.session_cookie);
        let response = self.client.get(&self.url).send().await?.error_for_status()?;

        self.session_from(&response).ok_or_else(|| {
            warn!("No {} cookie", self.session_cookie);
            self.missing_session()
        })
    }

    /// Opens a session and returns the voter id the API assigned to it.
    pub async fn voter_id(&self) -> Result<(SessionToken, VoterId)> {
        let session = self.open_session().await?;
        let voter_id = session.voter_id()?;
        Ok((session, voter_id))
    }

    /// POSTs a vote. Without a session the API assigns a fresh voter id.
    ///
    /// Returns the session in effect afterwards: a re-issued cookie wins over
    /// the one sent.
    pub async fn post_vote(&self, vote: &VoteChoice, session: Option<&SessionToken>) -> Result<SessionToken> {
        let mut request = self.client.post(&self.url).form(&[("vote", vote.as_str())]);
        if let Some(session) = session {
            request = request.header(COOKIE, format!("{}={}", self.session_cookie, session));
        }

        let response = request.send().await?.error_for_status()?;
        debug!(vote = %vote, status = %response.status(), "Posted vote");

        self.session_from(&response)
            .or_else(|| session.cloned())
            .ok_or_else(|| self.missing_session())
    }

    /// POSTs a vote on behalf of a known voter, replaying its id as the cookie.
    pub async fn post_vote_as(&self, vote: &VoteChoice, voter_id: &VoterId) -> Result<SessionToken> {
        self.post_vote(vote, Some(&SessionToken::for_voter(voter_id))).await
    }

    fn session_from(&self, response: &Response) -> Option<SessionToken> {
        response
            .cookies()
            .find(|cookie| cookie.name() == self.session_cookie)
            .map(|cookie| SessionToken::new(cookie.value()))
    }

    fn missing_session(&self) -> HarnessError {
        HarnessError::MissingSession {
            cookie: self.session_cookie.clone(),
        }
    }
}

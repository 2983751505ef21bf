//! Votes and the result collection they are merged into.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ExtractionError, TaskError};
use crate::extract::{RatingTable, VotePayload};
use crate::traits::TokenUsage;

/// How a persona's evaluation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VoteStatus {
    /// The response parsed cleanly.
    Complete,
    /// The model answered but the answer did not match the contract.
    ExtractionFailed { reason: String },
    /// The model was never reached, or never answered in time.
    InvocationFailed { kind: String, reason: String },
}

/// One persona's complete evaluation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Persona identifier.
    pub persona: String,
    /// Position of the persona in the catalog; fixes the merge order.
    pub ordinal: usize,
    pub ratings: RatingTable,
    pub justification: String,
    #[serde(default)]
    pub ranking: Vec<String>,
    pub status: VoteStatus,
    /// Model that answered, if one did.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
}

impl Vote {
    /// Package an extraction result. A failed extraction yields an empty vote.
    pub fn from_payload(
        persona: &str,
        ordinal: usize,
        payload: VotePayload,
        extraction_error: Option<ExtractionError>,
    ) -> Self {
        let status = match extraction_error {
            None => VoteStatus::Complete,
            Some(e) => VoteStatus::ExtractionFailed {
                reason: e.to_string(),
            },
        };

        Self {
            persona: persona.to_string(),
            ordinal,
            ratings: payload.ratings,
            justification: payload.justification,
            ranking: payload.ranking,
            status,
            model: None,
            latency_ms: 0,
            token_usage: None,
        }
    }

    /// A marked, empty vote standing in for a task that never got an answer.
    pub fn invocation_failed(ordinal: usize, error: &TaskError) -> Self {
        Self {
            persona: error.persona().to_string(),
            ordinal,
            ratings: RatingTable::default(),
            justification: String::new(),
            ranking: Vec::new(),
            status: VoteStatus::InvocationFailed {
                kind: error.kind().to_string(),
                reason: error.to_string(),
            },
            model: None,
            latency_ms: 0,
            token_usage: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == VoteStatus::Complete
    }
}

/// Returned when a persona tries to vote twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persona '{0}' has already voted")]
pub struct DuplicateVote(pub String);

/// Ordered, append-only collection of votes.
///
/// Votes are kept in persona ordinal order, so merging collections is
/// associative and independent of the order tasks completed in. A persona
/// can appear at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteCollection {
    votes: Vec<Vote>,
}

impl VoteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vote at its ordinal position.
    pub fn insert(&mut self, vote: Vote) -> Result<(), DuplicateVote> {
        if self.get(&vote.persona).is_some() {
            return Err(DuplicateVote(vote.persona));
        }
        let at = self
            .votes
            .partition_point(|v| (v.ordinal, v.persona.as_str()) < (vote.ordinal, vote.persona.as_str()));
        self.votes.insert(at, vote);
        Ok(())
    }

    /// Concatenate two collections.
    ///
    /// For collections over distinct personas the result does not depend on
    /// argument order. A duplicate persona keeps the vote already in `self`.
    pub fn merge(mut self, other: VoteCollection) -> Self {
        for vote in other.votes {
            if let Err(e) = self.insert(vote) {
                tracing::warn!("dropping vote during merge: {e}");
            }
        }
        self
    }

    pub fn get(&self, persona: &str) -> Option<&Vote> {
        self.votes.iter().find(|v| v.persona == persona)
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vote> {
        self.votes.iter()
    }

    pub fn as_slice(&self) -> &[Vote] {
        &self.votes
    }

    /// Number of votes with a clean extraction.
    pub fn complete_count(&self) -> usize {
        self.votes.iter().filter(|v| v.is_complete()).count()
    }
}

impl<'a> IntoIterator for &'a VoteCollection {
    type Item = &'a Vote;
    type IntoIter = std::slice::Iter<'a, Vote>;

    fn into_iter(self) -> Self::IntoIter {
        self.votes.iter()
    }
}

impl IntoIterator for VoteCollection {
    type Item = Vote;
    type IntoIter = std::vec::IntoIter<Vote>;

    fn into_iter(self) -> Self::IntoIter {
        self.votes.into_iter()
    }
}

impl FromIterator<Vote> for VoteCollection {
    fn from_iter<I: IntoIterator<Item = Vote>>(iter: I) -> Self {
        let mut collection = VoteCollection::new();
        for vote in iter {
            if let Err(e) = collection.insert(vote) {
                tracing::warn!("dropping vote: {e}");
            }
        }
        collection
    }
}

//! Wire encoding of stream requests.
//!
//! A subscribe request carries only the transaction filter, under its
//! fixed key; every other filter category is sent empty so the server
//! replaces, rather than merges, the stream's previous filters. A ping
//! carries no filters and no commitment.

use std::collections::HashMap;

use super::proto;
use crate::domain::subscription::{
    CommitmentLevel, StreamRequest, TRANSACTION_FILTER_KEY, TransactionFilter,
};

impl From<CommitmentLevel> for proto::CommitmentLevel {
    fn from(level: CommitmentLevel) -> Self {
        match level {
            CommitmentLevel::Processed => Self::Processed,
            CommitmentLevel::Confirmed => Self::Confirmed,
            CommitmentLevel::Finalized => Self::Finalized,
        }
    }
}

impl From<&TransactionFilter> for proto::SubscribeRequestFilterTransactions {
    fn from(filter: &TransactionFilter) -> Self {
        Self {
            vote: Some(filter.include_vote),
            failed: Some(filter.include_failed),
            signature: None,
            account_include: filter.account_include.clone(),
            account_exclude: filter.account_exclude.clone(),
            account_required: filter.account_required.clone(),
        }
    }
}

impl From<&StreamRequest> for proto::SubscribeRequest {
    fn from(request: &StreamRequest) -> Self {
        match request {
            StreamRequest::Subscribe { filter, commitment } => Self {
                transactions: HashMap::from([(
                    TRANSACTION_FILTER_KEY.to_string(),
                    filter.into(),
                )]),
                commitment: Some(proto::CommitmentLevel::from(*commitment) as i32),
                ..Self::default()
            },
            StreamRequest::Ping { id } => Self {
                ping: Some(proto::SubscribeRequestPing { id: *id }),
                ..Self::default()
            },
        }
    }
}

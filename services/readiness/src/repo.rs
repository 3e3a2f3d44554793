use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use assessment::TransitionError;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                RepoError::Corrupt(e.to_string())
            }
            other => RepoError::Unavailable(other.to_string()),
        }
    }
}

/// One page of a listing plus the size of the whole collection.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Apply `skip`/`limit` to an already ordered collection.
pub(crate) fn paginate<T: Clone>(ordered: &[T], skip: u64, limit: u64) -> Page<T> {
    let items = ordered
        .iter()
        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .cloned()
        .collect();
    Page {
        items,
        total: ordered.len() as u64,
    }
}

/// Postgres binds are signed.
pub(crate) fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate() {
        let xs: Vec<u32> = (0..7).collect();
        let page = paginate(&xs, 5, 10);
        assert_eq!(page.items, vec![5, 6]);
        assert_eq!(page.total, 7);
        assert!(paginate(&xs, 10, 3).items.is_empty());
    }
}

//! In-memory permission store for tests and local runs.
//!
//! Tuples are bucketed by object type in a `HashSet<StoredTuple>` for O(1)
//! write/delete. Reads filter one bucket (or all of them), sort into the
//! store's native order, and seek past the cursor with a binary search.
//!
//! `check` only answers direct tuples (plus `type:*` wildcards); evaluating
//! rewrites and usersets is the job of a real authorization engine.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    parse_object, parse_tuple_cursor, parse_user, validate_tuple, PaginatedResult,
    PaginationOptions, PermissionStore, StoredTuple, TupleCursor, TupleFilter,
};

/// In-memory implementation of [`PermissionStore`].
///
/// # Performance Characteristics
///
/// - **Write / delete tuple**: O(1) average (HashSet insert/remove)
/// - **Read tuples**: O(N log N) in the size of the scanned buckets
/// - **Check**: O(1) average
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    /// Tuples keyed by object type.
    tuples: DashMap<String, HashSet<StoredTuple>>,
}

impl MemoryPermissionStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Total number of stored tuples.
    pub fn len(&self) -> usize {
        self.tuples.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(tuple: &StoredTuple, filter: &TupleFilter, user: Option<&UserParts>) -> bool {
        filter
            .object_id
            .as_ref()
            .map_or(true, |id| &tuple.object_id == id)
            && filter
                .relation
                .as_ref()
                .map_or(true, |r| &tuple.relation == r)
            && user.map_or(true, |(ut, ui, ur)| {
                &tuple.user_type == ut && &tuple.user_id == ui && &tuple.user_relation == ur
            })
    }
}

type UserParts = (String, String, Option<String>);

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn check(&self, user: &str, relation: &str, object: &str) -> StorageResult<bool> {
        let (user_type, user_id, user_relation) =
            parse_user(user).ok_or_else(|| StorageError::InvalidInput {
                message: format!("invalid user format: '{user}'"),
            })?;
        let (object_type, object_id) =
            parse_object(object).ok_or_else(|| StorageError::InvalidInput {
                message: format!("invalid object format: '{object}'"),
            })?;

        let Some(bucket) = self.tuples.get(object_type) else {
            return Ok(false);
        };

        let mut candidate = StoredTuple {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            user_type: user_type.to_string(),
            user_id: user_id.to_string(),
            user_relation: user_relation.map(str::to_string),
        };
        if bucket.contains(&candidate) {
            return Ok(true);
        }

        // Public access granted through a type wildcard.
        if user_relation.is_none() {
            candidate.user_id = "*".to_string();
            return Ok(bucket.contains(&candidate));
        }
        Ok(false)
    }

    #[instrument(skip(self), fields(object_type = ?filter.object_type))]
    async fn read_tuples(
        &self,
        filter: &TupleFilter,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<StoredTuple>> {
        if filter.object_id.is_some() && filter.object_type.is_none() {
            return Err(StorageError::InvalidInput {
                message: "object_id filter requires object_type".to_string(),
            });
        }

        // Parse and validate the user filter upfront
        let user_filter: Option<UserParts> = match filter.user.as_deref() {
            Some(user) => {
                let (ut, ui, ur) = parse_user(user).ok_or_else(|| StorageError::InvalidInput {
                    message: format!("invalid user filter: '{user}'"),
                })?;
                Some((ut.to_string(), ui.to_string(), ur.map(str::to_string)))
            }
            None => None,
        };

        let cursor = parse_tuple_cursor(&pagination.continuation_token)?;
        let page_size = pagination.effective_page_size();

        let mut filtered: Vec<StoredTuple> = Vec::new();
        let mut collect = |bucket: &HashSet<StoredTuple>| {
            filtered.extend(
                bucket
                    .iter()
                    .filter(|t| Self::matches(t, filter, user_filter.as_ref()))
                    .cloned(),
            );
        };
        match filter.object_type.as_deref() {
            Some(object_type) => {
                if let Some(bucket) = self.tuples.get(object_type) {
                    collect(bucket.value());
                }
            }
            None => {
                for bucket in self.tuples.iter() {
                    collect(bucket.value());
                }
            }
        }

        filtered.sort();

        let start_idx = match cursor {
            Some(cursor) => {
                let last = cursor.into_tuple();
                // First tuple strictly after the cursor
                filtered
                    .binary_search(&last)
                    .map(|i| i + 1)
                    .unwrap_or_else(|i| i)
            }
            None => 0,
        };

        let remaining = filtered.len().saturating_sub(start_idx);
        let items: Vec<StoredTuple> = filtered
            .into_iter()
            .skip(start_idx)
            .take(page_size)
            .collect();

        // Only hand out a cursor when something is left to read.
        let continuation_token = if remaining > items.len() {
            items.last().map(|t| TupleCursor::from_tuple(t).encode())
        } else {
            None
        };

        Ok(PaginatedResult {
            items,
            continuation_token,
        })
    }

    async fn write_tuples(
        &self,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<()> {
        for tuple in writes.iter().chain(deletes.iter()) {
            validate_tuple(tuple)?;
        }

        for tuple in deletes {
            if let Some(mut bucket) = self.tuples.get_mut(&tuple.object_type) {
                bucket.remove(&tuple);
            }
        }
        for tuple in writes {
            self.tuples
                .entry(tuple.object_type.clone())
                .or_default()
                .insert(tuple);
        }
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

//! Fan-out/merge over per-type permission queries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::dispatcher::{result_channel, Command, Dispatcher, JobId, JobOutput, JobResult};
use crate::error::{DomainError, DomainResult};
use crate::pagination::TokenPaginator;

use super::config::ResolverConfig;
use super::traits::ObjectLister;
use super::types::{ObjectPage, QueryFilter, ResolveRequest, ResolvedPage, TypeScope};
use super::{LISTING_DURATION, LISTING_ITEMS_TOTAL};

/// Resolves one page of the permission-filtered listing.
pub struct PermissionResolver<L> {
    lister: Arc<L>,
    dispatcher: Arc<Dispatcher>,
    config: ResolverConfig,
}

impl<L: ObjectLister> PermissionResolver<L> {
    pub fn new(lister: Arc<L>, dispatcher: Arc<Dispatcher>, config: ResolverConfig) -> Self {
        Self {
            lister,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Resolves one page.
    ///
    /// # Errors
    ///
    /// - [`DomainError::Unauthorized`] without a subject; nothing is queried.
    /// - [`DomainError::UnknownObjectType`] for a single scope outside the known types.
    /// - [`DomainError::StoreQuery`] if any per-type query fails.
    /// - [`DomainError::Dispatch`] if the dispatcher rejects a job.
    /// - [`DomainError::Timeout`] if fan-out exceeds the configured deadline.
    #[instrument(skip(self, request), fields(scope = request.scope.label()))]
    pub async fn resolve(&self, request: ResolveRequest) -> DomainResult<ResolvedPage> {
        let subject = match request.subject.as_deref() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(DomainError::Unauthorized),
        };

        if let TypeScope::Single(object_type) = &request.scope {
            if !self.config.is_known_type(object_type) {
                return Err(DomainError::UnknownObjectType {
                    object_type: object_type.clone(),
                });
            }
        }

        let cursors = decode_fail_open(&request.continuation_token);
        let filters = self.build_filters(&request.scope, &cursors);

        let started = Instant::now();
        let pages = match &request.scope {
            TypeScope::Single(_) => self.query_direct(&subject, filters).await?,
            TypeScope::All => self.query_fan_out(&subject, filters).await?,
        };
        let page = merge(pages);

        metrics::histogram!(LISTING_DURATION, "scope" => request.scope.label())
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(LISTING_ITEMS_TOTAL).increment(page.items.len() as u64);
        debug!(
            count = page.items.len(),
            resumable_types = page.cursors.len(),
            "Resolved listing page"
        );

        Ok(page)
    }

    /// Builds the per-type filters in configured type order.
    ///
    /// On a continuation page only types that still carry a cursor are
    /// queried; the others were exhausted on an earlier page. Cursors for
    /// types outside the scope are ignored, so a token holding none of the
    /// scoped types starts the scope from its first page.
    fn build_filters(&self, scope: &TypeScope, cursors: &TokenPaginator) -> Vec<QueryFilter> {
        let in_scope: Vec<&String> = match scope {
            TypeScope::Single(object_type) => vec![object_type],
            TypeScope::All => self.config.known_types.iter().collect(),
        };

        for (name, _) in cursors.iter() {
            if !self.config.is_known_type(name) {
                warn!(object_type = name, "Ignoring cursor for unknown object type");
            }
        }
        let continuing = in_scope.iter().any(|t| cursors.contains(t));

        in_scope
            .into_iter()
            .filter(|t| !continuing || cursors.contains(t))
            .map(|t| QueryFilter {
                object_type: t.clone(),
                relation: self.config.relation.clone(),
                starting_cursor: cursors.cursor(t).map(str::to_string),
                page_size: self.config.page_size,
            })
            .collect()
    }

    async fn query_direct(
        &self,
        subject: &str,
        filters: Vec<QueryFilter>,
    ) -> DomainResult<Vec<(String, ObjectPage)>> {
        let mut pages = Vec::with_capacity(filters.len());
        for filter in filters {
            let page = self
                .lister
                .list_objects(subject, &filter)
                .await
                .map_err(|e| store_failure(vec![(filter.object_type.clone(), e)]))?;
            pages.push((filter.object_type, page));
        }
        Ok(pages)
    }

    async fn query_fan_out(
        &self,
        subject: &str,
        filters: Vec<QueryFilter>,
    ) -> DomainResult<Vec<(String, ObjectPage)>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let order: Vec<String> = filters.iter().map(|f| f.object_type.clone()).collect();
        let (sink, mut collector) = result_channel::<DomainResult<ObjectPage>>();
        let commands = filters
            .into_iter()
            .map(|filter| {
                let lister = Arc::clone(&self.lister);
                let subject = subject.to_string();
                Command::returns(move || async move { lister.list_objects(&subject, &filter).await })
            })
            .collect();
        // All types are queued or none are; a rejected page starts no store calls.
        let job_ids = self.dispatcher.submit_batch(commands, sink, None)?;
        let mut by_job: HashMap<JobId, String> =
            job_ids.into_iter().zip(order.iter().cloned()).collect();

        let expected = by_job.len();
        let results = match self.config.fan_out_timeout {
            Some(deadline) => tokio::time::timeout(deadline, collector.take(expected))
                .await
                .map_err(|_| DomainError::Timeout {
                    duration_ms: deadline.as_millis() as u64,
                })??,
            None => collector.take(expected).await?,
        };

        let mut pages: HashMap<String, ObjectPage> = HashMap::with_capacity(expected);
        let mut failures: Vec<(String, DomainError)> = Vec::new();
        for JobResult { key, value } in results {
            let Some(object_type) = by_job.remove(&key) else {
                warn!(job_id = %key, "Result for unknown job");
                continue;
            };
            match value {
                Ok(JobOutput::Value(Ok(page))) => {
                    pages.insert(object_type, page);
                }
                Ok(JobOutput::Value(Err(e))) => failures.push((object_type, e)),
                Ok(JobOutput::Done) => failures.push((
                    object_type,
                    DomainError::Internal {
                        message: "list job produced no value".to_string(),
                    },
                )),
                Err(e) => failures.push((
                    object_type,
                    DomainError::Internal {
                        message: e.to_string(),
                    },
                )),
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(t, _)| order.iter().position(|o| o == t));
            return Err(store_failure(failures));
        }

        Ok(order
            .into_iter()
            .filter_map(|t| pages.remove(&t).map(|page| (t, page)))
            .collect())
    }
}

/// Decodes the inbound token, falling back to the first page when it is malformed.
fn decode_fail_open(token: &str) -> TokenPaginator {
    match TokenPaginator::decode(token) {
        Ok(cursors) => cursors,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed continuation token, starting from first page");
            TokenPaginator::new()
        }
    }
}

/// Concatenates pages in the given order and collects their next cursors.
fn merge(pages: Vec<(String, ObjectPage)>) -> ResolvedPage {
    let mut items = Vec::with_capacity(pages.iter().map(|(_, p)| p.objects.len()).sum());
    let mut next = Vec::new();
    for (object_type, page) in pages {
        items.extend(page.objects);
        if let Some(cursor) = page.next_cursor {
            next.push((object_type, cursor));
        }
    }

    let mut cursors = TokenPaginator::new();
    cursors.replace_cursors(next);
    ResolvedPage { items, cursors }
}

/// Folds per-type failures into one page-level error.
///
/// A rejected cursor is reported as such only when it is the sole kind of
/// failure; any store failure turns the page into [`DomainError::StoreQuery`].
fn store_failure(mut failures: Vec<(String, DomainError)>) -> DomainError {
    let all_cursor = failures
        .iter()
        .all(|(_, e)| matches!(e, DomainError::InvalidCursor { .. }));
    if all_cursor && !failures.is_empty() {
        return failures.swap_remove(0).1;
    }

    let mut object_types = Vec::with_capacity(failures.len());
    let mut messages = Vec::with_capacity(failures.len());
    for (object_type, error) in failures {
        let message = match error {
            DomainError::StoreQuery { message, .. } => message,
            other => other.to_string(),
        };
        messages.push(format!("{object_type}: {message}"));
        object_types.push(object_type);
    }
    DomainError::StoreQuery {
        object_types,
        message: messages.join("; "),
    }
}

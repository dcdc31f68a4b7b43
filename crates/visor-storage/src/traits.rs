//! PermissionStore trait definition.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page a single list call may request.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// A stored relationship tuple: `object_type:object_id#relation@user`.
///
/// Field order matters: the derived `Ord` is the store's native listing order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoredTuple {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub user_type: String,
    pub user_id: String,
    pub user_relation: Option<String>,
}

impl StoredTuple {
    /// Parses the `user`, `relation`, `object` triple used on the wire.
    ///
    /// Accepts `user:alice` and userset users such as `group:admin#member`.
    pub fn parse(user: &str, relation: &str, object: &str) -> StorageResult<Self> {
        let (user_type, user_id, user_relation) =
            parse_user(user).ok_or_else(|| StorageError::InvalidInput {
                message: format!("invalid user format: '{user}'"),
            })?;
        let (object_type, object_id) =
            parse_object(object).ok_or_else(|| StorageError::InvalidInput {
                message: format!("invalid object format: '{object}'"),
            })?;

        let tuple = Self {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            user_type: user_type.to_string(),
            user_id: user_id.to_string(),
            user_relation: user_relation.map(str::to_string),
        };
        validate_tuple(&tuple)?;
        Ok(tuple)
    }

    /// The user in wire format.
    pub fn user(&self) -> String {
        format_user(&self.user_type, &self.user_id, self.user_relation.as_deref())
    }

    /// The object in wire format (`type:id`).
    pub fn object(&self) -> String {
        format!("{}:{}", self.object_type, self.object_id)
    }
}

/// Parses a user string into `(type, id, relation)`.
///
/// - `"user:alice"` -> `("user", "alice", None)`
/// - `"group:admin#member"` -> `("group", "admin", Some("member"))`
pub fn parse_user(user: &str) -> Option<(&str, &str, Option<&str>)> {
    let (type_id, relation) = match user.split_once('#') {
        Some((type_id, relation)) if !relation.is_empty() => (type_id, Some(relation)),
        Some(_) => return None,
        None => (user, None),
    };
    let (user_type, user_id) = type_id.split_once(':')?;
    if user_type.is_empty() || user_id.is_empty() {
        return None;
    }
    Some((user_type, user_id, relation))
}

/// Formats a user for the wire.
pub fn format_user(user_type: &str, user_id: &str, user_relation: Option<&str>) -> String {
    if let Some(rel) = user_relation {
        format!("{}:{}#{}", user_type, user_id, rel)
    } else {
        format!("{}:{}", user_type, user_id)
    }
}

/// Parses an object string (`type:id`) into its parts.
pub fn parse_object(object: &str) -> Option<(&str, &str)> {
    let (object_type, object_id) = object.split_once(':')?;
    if object_type.is_empty() || object_id.is_empty() {
        return None;
    }
    Some((object_type, object_id))
}

/// Validates the individual fields of a tuple.
pub fn validate_tuple(tuple: &StoredTuple) -> StorageResult<()> {
    let fields = [
        ("object_type", tuple.object_type.as_str()),
        ("object_id", tuple.object_id.as_str()),
        ("relation", tuple.relation.as_str()),
        ("user_type", tuple.user_type.as_str()),
        ("user_id", tuple.user_id.as_str()),
    ];
    for (name, value) in fields {
        if value.is_empty() {
            return Err(StorageError::InvalidInput {
                message: format!("{name} cannot be empty"),
            });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(StorageError::InvalidInput {
                message: format!("{name} cannot contain whitespace"),
            });
        }
    }
    Ok(())
}

/// Filter for reading tuples. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TupleFilter {
    /// Filter by object type.
    pub object_type: Option<String>,
    /// Filter by object ID (requires `object_type`).
    pub object_id: Option<String>,
    /// Filter by relation.
    pub relation: Option<String>,
    /// Filter by user, in wire format.
    pub user: Option<String>,
}

/// Pagination options for a read call.
#[derive(Debug, Clone, Default)]
pub struct PaginationOptions {
    /// Maximum number of items to return. Defaults to [`DEFAULT_PAGE_SIZE`].
    pub page_size: Option<u32>,
    /// Opaque cursor returned by the previous page.
    pub continuation_token: Option<String>,
}

impl PaginationOptions {
    /// Effective page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_page_size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE) as usize
    }
}

/// One page of results plus the cursor for the next one.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    /// `None` once the listing is exhausted.
    pub continuation_token: Option<String>,
}

/// Bounded list call for one object type.
#[derive(Debug, Clone)]
pub struct ListObjectsFilter {
    pub object_type: String,
    pub relation: String,
    pub continuation_token: Option<String>,
    pub page_size: Option<u32>,
}

/// Objects (`type:id`) the subject holds the relation on, in store order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<String>,
    pub continuation_token: Option<String>,
}

/// Filters accepted by [`PermissionStore::list_permissions_with_filters`].
#[derive(Debug, Clone)]
pub enum PermissionFilter {
    /// Relation the subject must hold (required).
    Relation(String),
    /// Object types to list, in output order (required).
    Types(Vec<String>),
    /// Per-type cursors from the previous page.
    TokenMap(HashMap<String, String>),
    /// Page size for each per-type call.
    PageSize(u32),
}

/// Combined result of a multi-type listing.
#[derive(Debug, Clone, Default)]
pub struct PermissionPage {
    pub objects: Vec<String>,
    /// Next cursor per object type. Exhausted types are absent.
    pub continuation_tokens: HashMap<String, String>,
}

/// Position of the last tuple returned by a page.
///
/// Encoded as url-safe base64 JSON so it survives query strings untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleCursor {
    #[serde(rename = "t")]
    pub object_type: String,
    #[serde(rename = "o")]
    pub object_id: String,
    #[serde(rename = "r")]
    pub relation: String,
    #[serde(rename = "ut")]
    pub user_type: String,
    #[serde(rename = "ui")]
    pub user_id: String,
    #[serde(rename = "ur", default, skip_serializing_if = "Option::is_none")]
    pub user_relation: Option<String>,
}

impl TupleCursor {
    pub fn from_tuple(tuple: &StoredTuple) -> Self {
        Self {
            object_type: tuple.object_type.clone(),
            object_id: tuple.object_id.clone(),
            relation: tuple.relation.clone(),
            user_type: tuple.user_type.clone(),
            user_id: tuple.user_id.clone(),
            user_relation: tuple.user_relation.clone(),
        }
    }

    /// The tuple this cursor points at, for ordering comparisons.
    pub fn into_tuple(self) -> StoredTuple {
        StoredTuple {
            object_type: self.object_type,
            object_id: self.object_id,
            relation: self.relation,
            user_type: self.user_type,
            user_id: self.user_id,
            user_relation: self.user_relation,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> StorageResult<Self> {
        let bytes =
            URL_SAFE_NO_PAD
                .decode(token)
                .map_err(|e| StorageError::InvalidContinuationToken {
                    message: format!("not valid base64: {e}"),
                })?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::InvalidContinuationToken {
            message: format!("unexpected cursor content: {e}"),
        })
    }
}

/// Parses an optional cursor; an empty string means "from the start".
pub fn parse_tuple_cursor(token: &Option<String>) -> StorageResult<Option<TupleCursor>> {
    match token.as_deref() {
        None | Some("") => Ok(None),
        Some(token) => TupleCursor::decode(token).map(Some),
    }
}

/// Abstract interface to a relation-based permission store.
///
/// Implementations must be safe for concurrent use: the resolver issues one
/// list call per object type from several dispatcher workers at once.
#[async_trait]
pub trait PermissionStore: Send + Sync + 'static {
    /// Short backend name for logs and readiness output.
    fn backend_name(&self) -> &'static str;

    /// Does `user` hold `relation` on `object`?
    async fn check(&self, user: &str, relation: &str, object: &str) -> StorageResult<bool>;

    /// Reads tuples matching the filter, one page at a time.
    async fn read_tuples(
        &self,
        filter: &TupleFilter,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<StoredTuple>>;

    /// Applies writes and deletes.
    async fn write_tuples(
        &self,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<()>;

    /// Deletes tuples.
    async fn delete_tuples(&self, tuples: Vec<StoredTuple>) -> StorageResult<()> {
        self.write_tuples(Vec::new(), tuples).await
    }

    /// Verifies the store is reachable.
    async fn health_check(&self) -> StorageResult<()>;

    /// One bounded page of objects of a single type that `subject` holds
    /// `filter.relation` on.
    async fn list_objects(
        &self,
        subject: &str,
        filter: &ListObjectsFilter,
    ) -> StorageResult<ObjectPage> {
        let tuple_filter = TupleFilter {
            object_type: Some(filter.object_type.clone()),
            object_id: None,
            relation: Some(filter.relation.clone()),
            user: Some(subject.to_string()),
        };
        let pagination = PaginationOptions {
            page_size: filter.page_size,
            continuation_token: filter.continuation_token.clone(),
        };

        let page = self.read_tuples(&tuple_filter, &pagination).await?;
        Ok(ObjectPage {
            objects: page.items.iter().map(StoredTuple::object).collect(),
            continuation_token: page.continuation_token.filter(|t| !t.is_empty()),
        })
    }

    /// Lists objects across several types one after another.
    ///
    /// Requires a [`PermissionFilter::Relation`] and a [`PermissionFilter::Types`]
    /// filter; the token map supplies per-type starting cursors.
    async fn list_permissions_with_filters(
        &self,
        subject: &str,
        filters: &[PermissionFilter],
    ) -> StorageResult<PermissionPage> {
        let mut relation = None;
        let mut types: &[String] = &[];
        let mut tokens = None;
        let mut page_size = None;
        for filter in filters {
            match filter {
                PermissionFilter::Relation(r) => relation = Some(r.as_str()),
                PermissionFilter::Types(t) => types = t.as_slice(),
                PermissionFilter::TokenMap(m) => tokens = Some(m),
                PermissionFilter::PageSize(s) => page_size = Some(*s),
            }
        }
        let relation = relation.ok_or_else(|| StorageError::InvalidInput {
            message: "relation filter is required".to_string(),
        })?;
        if types.is_empty() {
            return Err(StorageError::InvalidInput {
                message: "type scope filter is required".to_string(),
            });
        }

        let mut result = PermissionPage::default();
        for object_type in types {
            let filter = ListObjectsFilter {
                object_type: object_type.clone(),
                relation: relation.to_string(),
                continuation_token: tokens.and_then(|m| m.get(object_type).cloned()),
                page_size,
            };
            let page = self.list_objects(subject, &filter).await?;
            result.objects.extend(page.objects);
            if let Some(token) = page.continuation_token {
                result.continuation_tokens.insert(object_type.clone(), token);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_simple() {
        assert_eq!(parse_user("user:alice"), Some(("user", "alice", None)));
    }

    #[test]
    fn test_parse_user_userset() {
        assert_eq!(
            parse_user("group:admin#member"),
            Some(("group", "admin", Some("member")))
        );
    }

    #[test]
    fn test_parse_user_invalid() {
        assert_eq!(parse_user("alice"), None);
        assert_eq!(parse_user(":alice"), None);
        assert_eq!(parse_user("user:"), None);
        assert_eq!(parse_user("group:admin#"), None);
    }

    #[test]
    fn test_parse_object() {
        assert_eq!(parse_object("client:grafana"), Some(("client", "grafana")));
        assert_eq!(parse_object("client:"), None);
        assert_eq!(parse_object("grafana"), None);
    }

    #[test]
    fn test_stored_tuple_parse_and_format() {
        let tuple = StoredTuple::parse("group:admin#member", "can_view", "client:grafana").unwrap();
        assert_eq!(tuple.object_type, "client");
        assert_eq!(tuple.user_relation.as_deref(), Some("member"));
        assert_eq!(tuple.user(), "group:admin#member");
        assert_eq!(tuple.object(), "client:grafana");
    }

    #[test]
    fn test_stored_tuple_rejects_empty_relation() {
        let err = StoredTuple::parse("user:alice", "", "client:grafana").unwrap_err();
        assert!(err.to_string().contains("relation"));
    }

    #[test]
    fn test_cursor_decode_rejects_garbage() {
        let err = TupleCursor::decode("not-valid-base64!!!").unwrap_err();
        assert!(matches!(err, StorageError::InvalidContinuationToken { .. }));

        let not_json = URL_SAFE_NO_PAD.encode(b"{\"t\": 1}");
        let err = TupleCursor::decode(&not_json).unwrap_err();
        assert!(matches!(err, StorageError::InvalidContinuationToken { .. }));
    }

    #[test]
    fn test_empty_cursor_means_start() {
        assert!(parse_tuple_cursor(&None).unwrap().is_none());
        assert!(parse_tuple_cursor(&Some(String::new())).unwrap().is_none());
    }
}

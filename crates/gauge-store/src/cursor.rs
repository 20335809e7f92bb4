//! Pagination cursor protocol.
//!
//! Every listing accepts a [`PageRequest`] (`limit`, `pageToken`) and returns
//! a [`Page`] (`entities`, `pageToken`). The page token is the backend's
//! resumable [`Cursor`] rendered as URL-safe base64; it is present only when
//! more matching records exist. Following tokens until one is absent visits
//! every matching record exactly once, in query order, as long as nothing
//! is written during the walk.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use gauge_types::{Key, PaginationConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::mapper::to_record;
use crate::query::Query;
use crate::traits::Store;

/// Maximum decoded cursor size.
pub const MAX_CURSOR_SIZE: usize = 4096;

/// Opaque, backend-specific resume position.
#[derive(Clone, PartialEq, Eq)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    /// Wrap backend position bytes; rejects anything over [`MAX_CURSOR_SIZE`].
    pub fn new(data: Vec<u8>) -> StoreResult<Self> {
        if data.len() > MAX_CURSOR_SIZE {
            return Err(StoreError::InvalidCursor(format!(
                "cursor too large: {} bytes (max: {MAX_CURSOR_SIZE})",
                data.len()
            )));
        }
        Ok(Self(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Render as a page token.
    pub fn to_token(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Parse a page token.
    pub fn from_token(token: &str) -> StoreResult<Self> {
        // Checked before decoding; base64 inflates by 4/3.
        if token.len() > MAX_CURSOR_SIZE * 2 {
            return Err(StoreError::InvalidCursor(format!(
                "page token too large: {} bytes",
                token.len()
            )));
        }
        let data = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| StoreError::InvalidCursor(format!("invalid page token: {e}")))?;
        Self::new(data)
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cursor").field(&"<opaque>").finish()
    }
}

/// Listing request shared by every paginated operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub page_token: Option<String>,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            page_token: None,
        }
    }

    /// The request for the page after `token`.
    pub fn next(&self, token: impl Into<String>) -> Self {
        Self {
            limit: self.limit,
            page_token: Some(token.into()),
        }
    }
}

/// One page of a listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub entities: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
            page_token: None,
        }
    }

    pub fn is_last(&self) -> bool {
        self.page_token.is_none()
    }
}

/// Run `query` as one page of `page`, mapping entities to records.
pub async fn paginate<T: DeserializeOwned>(
    store: &dyn Store,
    mut query: Query,
    page: &PageRequest,
    limits: &PaginationConfig,
) -> StoreResult<Page<T>> {
    query.limit = Some(limits.effective_limit(page.limit));
    if let Some(token) = page.page_token.as_deref() {
        query.start = Some(Cursor::from_token(token)?);
    }
    let results = store.run_query(&query).await?;
    let page_token = if results.more_results {
        results.end_cursor.map(|c| c.to_token())
    } else {
        None
    };
    let entities = results
        .entities
        .into_iter()
        .map(to_record)
        .collect::<StoreResult<Vec<T>>>()?;
    Ok(Page {
        entities,
        page_token,
    })
}

/// Run `query` keys-only to exhaustion, following cursors.
pub async fn collect_keys(store: &dyn Store, query: Query) -> StoreResult<Vec<Key>> {
    let mut query = query.keys_only();
    let mut keys = Vec::new();
    loop {
        let results = store.run_query(&query).await?;
        keys.extend(results.entities.into_iter().map(|e| e.key));
        match results.end_cursor {
            Some(cursor) if results.more_results => query.start = Some(cursor),
            _ => break,
        }
    }
    Ok(keys)
}

/// Delete descendants of `root` until a sweep comes back empty.
///
/// Returns how many entities were removed. `root` itself is left alone.
pub async fn sweep_descendants(store: &dyn Store, root: &Key) -> StoreResult<usize> {
    let mut removed = 0;
    loop {
        let keys = collect_keys(store, Query::descendants(root)).await?;
        if keys.is_empty() {
            return Ok(removed);
        }
        removed += store.delete_many(&keys).await?;
    }
}

//! Cursor pagination.
//!
//! Every paginated table carries a store-assigned `cursor` column: a 64-bit
//! integer that is unique within the table and increases with insertion
//! order. Clients never see the raw value; they receive opaque cursor
//! strings (see [`encode_cursor`]) and page with GraphQL-style
//! `first`/`last`/`after`/`before` arguments ([`PageArgs`]).
//!
//! A page request is reduced to a [`BatchInfo`], which [`QueryPlan::batch`]
//! turns into a structured query description: filters, sort order and a
//! limit of `count + 1` rows. The extra row tells [`Page::from_batch`]
//! whether more data exists without a second round trip. The plan says
//! nothing about SQL; rendering it is the job of the store's query module.

use base64::Engine;
use serde::Deserialize;

use crate::error::{Result, StoreError};

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Page size used when the client gives neither `first` nor `last`.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Name of the cursor column shared by every paginated table.
pub const CURSOR_COLUMN: &str = "cursor";

/// The entity a cursor string belongs to. Decoding a cursor minted for a
/// different entity is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    Tenant,
    Connection,
    Message,
    Credential,
    Proof,
    Job,
    Event,
}

impl CursorKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Connection => "connection",
            Self::Message => "message",
            Self::Credential => "credential",
            Self::Proof => "proof",
            Self::Job => "job",
            Self::Event => "event",
        }
    }
}

/// Encodes a raw cursor value as an opaque client-facing string.
pub fn encode_cursor(kind: CursorKind, cursor: u64) -> String {
    let raw = format!("{}:{}", kind.prefix(), cursor);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

/// Decodes a client-supplied cursor string.
///
/// # Errors
///
/// Returns `StoreError::InvalidArgument` if the string is not a cursor this
/// store minted for `kind`.
pub fn decode_cursor(kind: CursorKind, encoded: &str) -> Result<u64> {
    let invalid = || StoreError::InvalidArgument(format!("invalid {} cursor", kind.prefix()));

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .map_err(|_| invalid())?;
    let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (prefix, value) = raw.split_once(':').ok_or_else(invalid)?;
    if prefix != kind.prefix() {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

/// Implemented by every entity that can be paginated.
pub trait Cursored {
    fn cursor(&self) -> u64;
}

/// A resolved page request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchInfo {
    /// Number of items to return.
    pub count: usize,
    /// Return items strictly after this cursor.
    pub after: Option<u64>,
    /// Return items strictly before this cursor.
    pub before: Option<u64>,
    /// Fetch from the end of the sequence.
    pub tail: bool,
}

impl BatchInfo {
    /// The first `count` items.
    pub fn head(count: usize) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    /// The last `count` items.
    pub fn tail(count: usize) -> Self {
        Self {
            count,
            tail: true,
            ..Self::default()
        }
    }

    pub fn after(mut self, cursor: u64) -> Self {
        self.after = Some(cursor);
        self
    }

    pub fn before(mut self, cursor: u64) -> Self {
        self.before = Some(cursor);
        self
    }

    /// # Errors
    ///
    /// `StoreError::InvalidArgument` when both `after` and `before` are set
    /// or `count` exceeds [`MAX_PAGE_SIZE`].
    pub fn validate(&self) -> Result<()> {
        if self.after.is_some() && self.before.is_some() {
            return Err(StoreError::InvalidArgument(
                "after and before cannot be combined".to_string(),
            ));
        }
        if self.count > MAX_PAGE_SIZE {
            return Err(StoreError::InvalidArgument(format!(
                "page size {} exceeds maximum of {MAX_PAGE_SIZE}",
                self.count
            )));
        }
        Ok(())
    }
}

/// Client paging arguments, as received from the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageArgs {
    pub first: Option<usize>,
    pub last: Option<usize>,
    pub after: Option<String>,
    pub before: Option<String>,
}

impl PageArgs {
    /// Resolves the arguments into a validated [`BatchInfo`], decoding
    /// cursors minted for `kind`. `last` selects tail pagination.
    ///
    /// # Errors
    ///
    /// `StoreError::InvalidArgument` for malformed cursors, for `first`
    /// combined with `last`, and for anything [`BatchInfo::validate`] rejects.
    pub fn to_batch(&self, kind: CursorKind) -> Result<BatchInfo> {
        let (count, tail) = match (self.first, self.last) {
            (Some(_), Some(_)) => {
                return Err(StoreError::InvalidArgument(
                    "first and last cannot be combined".to_string(),
                ))
            }
            (Some(first), None) => (first, false),
            (None, Some(last)) => (last, true),
            (None, None) => (DEFAULT_PAGE_SIZE, false),
        };

        let batch = BatchInfo {
            count,
            after: self
                .after
                .as_deref()
                .map(|c| decode_cursor(kind, c))
                .transpose()?,
            before: self
                .before
                .as_deref()
                .map(|c| decode_cursor(kind, c))
                .transpose()?,
            tail,
        };
        batch.validate()?;
        Ok(batch)
    }
}

/// How a filter compares its column with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    Less,
}

/// A value bound into a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// One `column <comparison> value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: &'static str,
    pub comparison: Comparison,
    pub value: FilterValue,
}

impl Predicate {
    pub fn eq(column: &'static str, value: impl Into<FilterValue>) -> Self {
        Self {
            column,
            comparison: Comparison::Equal,
            value: value.into(),
        }
    }

    pub fn ne(column: &'static str, value: impl Into<FilterValue>) -> Self {
        Self {
            column,
            comparison: Comparison::NotEqual,
            value: value.into(),
        }
    }

    fn cursor(comparison: Comparison, cursor: u64) -> Result<Self> {
        let value = i64::try_from(cursor)
            .map_err(|_| StoreError::InvalidArgument(format!("cursor out of range: {cursor}")))?;
        Ok(Self {
            column: CURSOR_COLUMN,
            comparison,
            value: FilterValue::Integer(value),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A structured query description: conjunctive filters, ordering by
/// cursor, and an optional row limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub filters: Vec<Predicate>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl QueryPlan {
    /// A plan matching the same rows as a list query with `filters`, without
    /// a limit. Count queries use it so totals agree with pages.
    pub fn count(filters: Vec<Predicate>) -> Self {
        Self {
            filters,
            order: SortOrder::Ascending,
            limit: None,
        }
    }

    /// The plan for one page. The scoping `filters` come first, followed by
    /// the cursor bound; the limit is `count + 1`.
    ///
    /// # Errors
    ///
    /// Propagates [`BatchInfo::validate`] failures.
    pub fn batch(batch: &BatchInfo, mut filters: Vec<Predicate>) -> Result<Self> {
        batch.validate()?;

        if let Some(after) = batch.after {
            filters.push(Predicate::cursor(Comparison::Greater, after)?);
        }
        if let Some(before) = batch.before {
            filters.push(Predicate::cursor(Comparison::Less, before)?);
        }

        Ok(Self {
            filters,
            order: if batch.tail {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            },
            limit: Some(batch.count + 1),
        })
    }
}

/// One page of results, always in ascending cursor order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> Page<T> {
    /// Builds a page from the rows fetched with [`QueryPlan::batch`].
    pub fn from_batch(batch: &BatchInfo, mut rows: Vec<T>) -> Self {
        let mut has_next_page = false;
        let mut has_previous_page = false;

        if rows.len() > batch.count {
            rows.truncate(batch.count);
            if batch.tail {
                has_previous_page = true;
            } else {
                has_next_page = true;
            }
        }
        if batch.after.is_some() {
            has_previous_page = true;
        }
        if batch.before.is_some() {
            has_next_page = true;
        }

        // Tail pages are fetched newest first.
        if batch.tail {
            rows.reverse();
        }

        Self {
            items: rows,
            has_next_page,
            has_previous_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_next_page: self.has_next_page,
            has_previous_page: self.has_previous_page,
        }
    }
}

impl<T: Cursored> Page<T> {
    pub fn start_cursor(&self, kind: CursorKind) -> Option<String> {
        self.items.first().map(|i| encode_cursor(kind, i.cursor()))
    }

    pub fn end_cursor(&self, kind: CursorKind) -> Option<String> {
        self.items.last().map(|i| encode_cursor(kind, i.cursor()))
    }
}

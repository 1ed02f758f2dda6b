use std::fmt;
use std::str::FromStr;

use tana_model::{TaskPriority, TaskStatus};

use crate::error::SyncError;
use crate::key::CacheKey;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// The board fetches one oversized page and groups it into columns.
pub const BOARD_PAGE_SIZE: u32 = 200;

/// Column a task list can be sorted by. Wire names are camelCase to match
/// the API's `sortBy` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Title,
    Status,
    Priority,
    Assignee,
    DueDate,
    CreatedAt,
}

impl SortColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortColumn::Title => "title",
            SortColumn::Status => "status",
            SortColumn::Priority => "priority",
            SortColumn::Assignee => "assigneeId",
            SortColumn::DueDate => "dueDate",
            SortColumn::CreatedAt => "createdAt",
        }
    }
}

impl FromStr for SortColumn {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(SortColumn::Title),
            "status" => Ok(SortColumn::Status),
            "priority" => Ok(SortColumn::Priority),
            "assigneeId" => Ok(SortColumn::Assignee),
            "dueDate" => Ok(SortColumn::DueDate),
            "createdAt" => Ok(SortColumn::CreatedAt),
            other => Err(SyncError::InvalidQuery(format!(
                "unknown sort column: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(SyncError::InvalidQuery(format!(
                "unknown sort order: {other}"
            ))),
        }
    }
}

/// Filter/sort/page state of a task list view.
///
/// Maps bidirectionally to a shareable query string and to the canonical
/// cache-key signature. `None` filters mean "all"; spelling "all" out
/// explicitly produces the identical signature, so both states share one
/// cache entry. No network I/O happens here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListQuery {
    pub search: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub sort_by: SortColumn,
    pub sort_order: SortOrder,
    pub page: u32,
    pub page_size: u32,
}

impl Default for TaskListQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            priority: None,
            sort_by: SortColumn::CreatedAt,
            sort_order: SortOrder::Desc,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TaskListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query state backing the Kanban board view.
    pub fn board() -> Self {
        Self {
            page_size: BOARD_PAGE_SIZE,
            ..Self::default()
        }
    }

    /// Header click: a new column sorts ascending; the already-active
    /// ascending column flips to descending. Page resets either way, every
    /// filter is preserved.
    pub fn with_sort_toggled(mut self, column: SortColumn) -> Self {
        if self.sort_by == column && self.sort_order == SortOrder::Asc {
            self.sort_order = SortOrder::Desc;
        } else {
            self.sort_by = column;
            self.sort_order = SortOrder::Asc;
        }
        self.page = 1;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = (!search.is_empty()).then_some(search);
        self.page = 1;
        self
    }

    pub fn with_status_filter(mut self, status: Option<TaskStatus>) -> Self {
        self.status = status;
        self.page = 1;
        self
    }

    pub fn with_priority_filter(mut self, priority: Option<TaskPriority>) -> Self {
        self.priority = priority;
        self.page = 1;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self.page = 1;
        self
    }

    /// Shareable query-string form. Parameters equal to their defaults are
    /// omitted, in particular an explicit "all" filter.
    pub fn to_query_string(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("search", encode_component(search)));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.as_str().to_string()));
        }
        if self.sort_by != SortColumn::CreatedAt {
            pairs.push(("sortBy", self.sort_by.as_str().to_string()));
        }
        if self.sort_order != SortOrder::Desc {
            pairs.push(("sortOrder", self.sort_order.as_str().to_string()));
        }
        if self.page != 1 {
            pairs.push(("page", self.page.to_string()));
        }
        if self.page_size != DEFAULT_PAGE_SIZE {
            pairs.push(("pageSize", self.page_size.to_string()));
        }

        let mut out = String::new();
        for (i, (key, value)) in pairs.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// Parse the query-string form back into a state. Unknown parameters are
    /// ignored (a shared URL may carry view parameters this engine does not
    /// own); `all` filter values collapse to `None`.
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        let mut query = Self::default();
        for pair in s.split('&').filter(|p| !p.is_empty()) {
            let Some((key, raw)) = pair.split_once('=') else {
                return Err(SyncError::InvalidQuery(format!(
                    "malformed parameter: {pair}"
                )));
            };
            let value = decode_component(raw)?;
            match key {
                "search" => query.search = (!value.is_empty()).then_some(value),
                "status" if value == "all" => query.status = None,
                "status" => {
                    query.status =
                        Some(value.parse().map_err(SyncError::InvalidQuery)?)
                }
                "priority" if value == "all" => query.priority = None,
                "priority" => {
                    query.priority =
                        Some(value.parse().map_err(SyncError::InvalidQuery)?)
                }
                "sortBy" => query.sort_by = value.parse()?,
                "sortOrder" => query.sort_order = value.parse()?,
                "page" => {
                    let page: u32 = value
                        .parse()
                        .map_err(|_| SyncError::InvalidQuery(format!("bad page: {value}")))?;
                    query.page = page.max(1);
                }
                "pageSize" => {
                    let size: u32 = value
                        .parse()
                        .map_err(|_| SyncError::InvalidQuery(format!("bad pageSize: {value}")))?;
                    query.page_size = size.max(1);
                }
                _ => {}
            }
        }
        Ok(query)
    }

    /// Canonical filter signature: deterministic order, defaults omitted.
    /// Equal states always produce equal signatures.
    pub fn signature(&self) -> String {
        self.to_query_string()
    }

    /// Cache key of the list page this state addresses.
    pub fn list_key(&self, project_id: &str) -> CacheKey {
        CacheKey::TaskList {
            project_id: project_id.to_string(),
            sig: self.signature(),
        }
    }
}

impl fmt::Display for TaskListQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode_component(s: &str) -> Result<String, SyncError> {
    let mut bytes = Vec::with_capacity(s.len());
    let mut iter = s.bytes();
    while let Some(byte) = iter.next() {
        if byte != b'%' {
            bytes.push(byte);
            continue;
        }
        let hi = iter.next();
        let lo = iter.next();
        let (Some(hi), Some(lo)) = (hi, lo) else {
            return Err(SyncError::InvalidQuery(format!("truncated escape in {s}")));
        };
        let hex = [hi, lo];
        let hex = std::str::from_utf8(&hex)
            .ok()
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        let Some(decoded) = hex else {
            return Err(SyncError::InvalidQuery(format!("bad escape in {s}")));
        };
        bytes.push(decoded);
    }
    String::from_utf8(bytes).map_err(|_| SyncError::InvalidQuery(format!("invalid utf-8 in {s}")))
}

//! List queries
//!
//! A `ListQuery` filters workflows by namespace, name, time bounds and labels, and
//! addresses a window (`offset`, `limit`) over the live-then-archive concatenation.

use chrono::{DateTime, Utc};
use std::str::FromStr;

use crate::error::ApiError;
use crate::selector::Selector;
use crate::workflow::{sort_workflows, Workflow};

/// How `ListQuery::name` is compared against workflow names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameFilter {
    #[default]
    Exact,
    Prefix,
    Contains,
    NotEquals,
}

impl FromStr for NameFilter {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "Exact" => Ok(NameFilter::Exact),
            "Prefix" => Ok(NameFilter::Prefix),
            "Contains" => Ok(NameFilter::Contains),
            "NotEquals" => Ok(NameFilter::NotEquals),
            other => Err(ApiError::InvalidArgument(format!(
                "unsupported name filter \"{}\"",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Empty means every namespace
    pub namespace: String,
    pub name: String,
    pub name_filter: NameFilter,
    pub created_after: Option<DateTime<Utc>>,
    pub finished_before: Option<DateTime<Utc>>,
    pub label_selector: Selector,
    pub offset: usize,
    /// 0 means unlimited
    pub limit: usize,
    pub show_remaining_item_count: bool,
}

impl ListQuery {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_window(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Same filter, no window
    pub fn unwindowed(&self) -> Self {
        Self {
            offset: 0,
            limit: 0,
            ..self.clone()
        }
    }

    pub fn matches(&self, wf: &Workflow) -> bool {
        if !self.namespace.is_empty() && wf.namespace() != self.namespace {
            return false;
        }
        if !self.name.is_empty() {
            let name = wf.name();
            let ok = match self.name_filter {
                NameFilter::Exact => name == self.name,
                NameFilter::Prefix => name.starts_with(&self.name),
                NameFilter::Contains => name.contains(&self.name),
                NameFilter::NotEquals => name != self.name,
            };
            if !ok {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if !wf.metadata.creation_timestamp.is_some_and(|c| c > after) {
                return false;
            }
        }
        if let Some(before) = self.finished_before {
            if !wf.status.finished_at.is_some_and(|f| f < before) {
                return false;
            }
        }
        self.label_selector.matches_labels(&wf.metadata.labels)
    }

    pub fn count<'a, I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = &'a Workflow>,
    {
        items.into_iter().filter(|wf| self.matches(wf)).count()
    }

    /// Filter, order canonically and cut the window out of `items`
    pub fn select<'a, I>(&self, items: I) -> Vec<Workflow>
    where
        I: IntoIterator<Item = &'a Workflow>,
    {
        let mut matched: Vec<Workflow> = items
            .into_iter()
            .filter(|wf| self.matches(wf))
            .cloned()
            .collect();
        sort_workflows(&mut matched);
        window(matched, self.offset, self.limit)
    }
}

/// Skip `offset` items and keep at most `limit` (0 = all)
pub fn window<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let take = if limit == 0 { usize::MAX } else { limit };
    items.into_iter().skip(offset).take(take).collect()
}

/// Decode a continuation token into an offset; the empty token is offset 0
pub fn parse_continue_token(token: &str) -> Result<usize, ApiError> {
    if token.is_empty() {
        return Ok(0);
    }
    token
        .parse::<usize>()
        .map_err(|_| ApiError::InvalidArgument(format!("invalid continue token \"{}\"", token)))
}

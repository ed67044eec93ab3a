use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root tag shared by every task-list query key. Invalidating this tag marks
/// all filtered and sorted views stale.
pub const TASKS_TAG: &str = "tasks";

/// Filter on the `done` flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoneFilter {
    #[default]
    All,
    #[serde(rename = "true")]
    Done,
    #[serde(rename = "false")]
    Open,
}

impl DoneFilter {
    /// Value of the `done` query parameter, `None` for "both"
    pub fn as_param(self) -> Option<bool> {
        match self {
            DoneFilter::All => None,
            DoneFilter::Done => Some(true),
            DoneFilter::Open => Some(false),
        }
    }
}

impl FromStr for DoneFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(DoneFilter::All),
            "true" | "done" => Ok(DoneFilter::Done),
            "false" | "open" => Ok(DoneFilter::Open),
            _ => Err(format!("unknown done filter '{}' (expected: all, true, false)", s)),
        }
    }
}

/// Sortable task fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    Title,
    DueDate,
    Category,
    Done,
    Archived,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::Title => "title",
            SortField::DueDate => "dueDate",
            SortField::Category => "category",
            SortField::Done => "done",
            SortField::Archived => "archived",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" | "created" => Ok(SortField::CreatedAt),
            "title" => Ok(SortField::Title),
            "dueDate" | "due" => Ok(SortField::DueDate),
            "category" => Ok(SortField::Category),
            "done" => Ok(SortField::Done),
            "archived" => Ok(SortField::Archived),
            _ => Err(format!(
                "unknown sort field '{}' (expected: createdAt, title, dueDate, category, done, archived)",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(format!("unknown order '{}' (expected: asc, desc)", s)),
        }
    }
}

/// The user's current filter and sort choices, as entered.
///
/// Several selections can mean the same list (`sort: None` and
/// `sort: Some(CreatedAt)`, or a blank category and no category); use
/// [`derive_key`] to compare them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub category: Option<String>,
    pub done: DoneFilter,
    pub sort: Option<SortField>,
    pub order: Option<SortOrder>,
    pub include_archived: bool,
}

/// Canonical cache address for one task list view
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    tag: &'static str,
    pub category: Option<String>,
    pub done: DoneFilter,
    pub sort: SortField,
    pub order: SortOrder,
    pub include_archived: bool,
}

/// Map a selection to its canonical key.
pub fn derive_key(selection: &Selection) -> QueryKey {
    let category = selection
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    QueryKey {
        tag: TASKS_TAG,
        category,
        done: selection.done,
        sort: selection.sort.unwrap_or_default(),
        order: selection.order.unwrap_or_default(),
        include_archived: selection.include_archived,
    }
}

impl QueryKey {
    /// Leading tag used for prefix invalidation
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Transport parameters for listing this view
    pub fn list_params(&self) -> ListParams {
        ListParams {
            category: self.category.clone(),
            include_archived: self.include_archived,
            done: self.done.as_param(),
            sort: Some(self.sort).filter(|s| *s != SortField::default()),
            order: Some(self.order).filter(|o| *o != SortOrder::default()),
        }
    }
}

impl Default for QueryKey {
    fn default() -> Self {
        derive_key(&Selection::default())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.tag)?;
        if let Some(c) = &self.category {
            write!(f, "category={},", c)?;
        }
        if let Some(done) = self.done.as_param() {
            write!(f, "done={},", done)?;
        }
        if self.include_archived {
            write!(f, "archived,")?;
        }
        write!(f, "{} {}]", self.sort.as_str(), self.order.as_str())
    }
}

/// Query parameters for `GET /api/todos`. Unset fields are left off the
/// query string and the server applies its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub category: Option<String>,
    pub include_archived: bool,
    pub done: Option<bool>,
    pub sort: Option<SortField>,
    pub order: Option<SortOrder>,
}

impl ListParams {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("category", category.to_string()));
        }
        if self.include_archived {
            pairs.push(("includeArchived", "1".to_string()));
        }
        if let Some(done) = self.done {
            pairs.push(("done", done.to_string()));
        }
        if let Some(sort) = self.sort {
            pairs.push(("sort", sort.as_str().to_string()));
        }
        if let Some(order) = self.order {
            pairs.push(("order", order.as_str().to_string()));
        }
        pairs
    }
}

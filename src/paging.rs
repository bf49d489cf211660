use crate::{BoxApiError, Result};

/// Page size for trash, group and most item listings.
pub const DEFAULT_LIMIT: u64 = 1000;
/// Page size for collaboration and user listings.
pub const DEFAULT_COLLABORATION_LIMIT: u64 = 100;

/// How a list endpoint is paged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PagingParameters {
    /// Numeric skip count plus page size. Supports sorting.
    Offset { limit: u64, offset: u64 },
    /// Opaque continuation token. `None` requests the first page.
    Marker { limit: u64, marker: Option<String> },
}

impl PagingParameters {
    /// Offset paging from the first item.
    pub fn offset(limit: u64) -> Self {
        Self::Offset { limit, offset: 0 }
    }

    pub fn offset_from(offset: u64, limit: u64) -> Self {
        Self::Offset { limit, offset }
    }

    /// Marker paging from the first page.
    pub fn marker(limit: u64) -> Self {
        Self::Marker {
            limit,
            marker: None,
        }
    }

    pub fn marker_from(marker: impl Into<String>, limit: u64) -> Self {
        Self::Marker {
            limit,
            marker: Some(marker.into()),
        }
    }

    pub fn limit(&self) -> u64 {
        match self {
            Self::Offset { limit, .. } | Self::Marker { limit, .. } => *limit,
        }
    }

    pub fn is_marker_based(&self) -> bool {
        matches!(self, Self::Marker { .. })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.limit() == 0 {
            return Err(BoxApiError::configuration("paging limit must be positive"));
        }
        Ok(())
    }
}

impl Default for PagingParameters {
    fn default() -> Self {
        Self::offset(DEFAULT_LIMIT)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Sort field and direction for offset-paged listings.
///
/// [`SortParameters::none`] is the explicit "server default order" value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortParameters {
    field: Option<String>,
    direction: SortDirection,
}

impl SortParameters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            direction: SortDirection::Descending,
        }
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_none()
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match &self.field {
            Some(field) => vec![
                ("sort", field.clone()),
                ("direction", self.direction.as_str().to_owned()),
            ],
            None => Vec::new(),
        }
    }
}

use std::fmt::Display;

/// Sort direction for [`Query::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Row filter, ordering and limit for a table request.
///
/// Renders to the backend's query-string grammar: `col=eq.value`, `order=col.asc`, `limit=n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict returned columns (defaults to `*`).
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    #[must_use]
    pub fn neq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("neq.{value}")));
        self
    }

    #[must_use]
    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        let dir = match direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        self.order = Some(format!("{column}.{dir}"));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in request order.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![(
            "select".to_string(),
            self.select.clone().unwrap_or_else(|| "*".to_string()),
        )];
        pairs.extend(self.filters.iter().cloned());
        if let Some(order) = &self.order {
            pairs.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    /// Whether the query filters rows at all. Unfiltered writes are refused.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }
}

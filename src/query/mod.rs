pub mod parser;
pub mod classifier;
pub mod method_selector;

pub use parser::*;
pub use classifier::*;
pub use method_selector::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate functions the engine can answer approximately
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Self::Sum),
            "COUNT" => Some(Self::Count),
            "AVG" => Some(Self::Avg),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::Avg => "AVG",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric columns of a stored record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    Id,
    Amount,
    Region,
    ProductId,
    Timestamp,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Id,
        Column::Amount,
        Column::Region,
        Column::ProductId,
        Column::Timestamp,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "id" => Some(Self::Id),
            "amount" => Some(Self::Amount),
            "region" => Some(Self::Region),
            "product_id" => Some(Self::ProductId),
            "timestamp" => Some(Self::Timestamp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Amount => "amount",
            Self::Region => "region",
            Self::ProductId => "product_id",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed aggregate query. Immutable once built by the parser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub function: AggregateFunction,
    /// `None` for `COUNT(*)`
    pub column: Option<Column>,
    pub table: String,
    pub group_by: Option<Column>,
    /// The text carried an `APPROX(...)` marker
    pub embedded_approx: bool,
}

impl Query {
    /// Column whose values feed the estimator. `COUNT(*)` reduces over amounts,
    /// which only matters for interval math since COUNT is never scaled from values.
    pub fn value_column(&self) -> Column {
        self.column.unwrap_or(Column::Amount)
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by.is_some()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self.column.map(|c| c.name()).unwrap_or("*");
        write!(f, "SELECT {}({}) FROM {}", self.function, target, self.table)?;
        if let Some(group) = self.group_by {
            write!(f, " GROUP BY {}", group)?;
        }
        Ok(())
    }
}

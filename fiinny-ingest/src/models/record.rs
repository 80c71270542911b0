//! Transaction record addressing
//!
//! Expense and income records are created by the client app before a job is
//! processed. The pipeline only ever patches them.

use crate::db::DocPath;

/// Collection holding a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordCollection {
    Expenses,
    Incomes,
}

impl RecordCollection {
    /// Probe order when a job does not say where its record lives
    pub const PREFERENCE: [RecordCollection; 2] =
        [RecordCollection::Expenses, RecordCollection::Incomes];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordCollection::Expenses => "expenses",
            RecordCollection::Incomes => "incomes",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "expenses" => Some(RecordCollection::Expenses),
            "incomes" => Some(RecordCollection::Incomes),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single record a job resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub path: DocPath,
    /// Known when the record was located by collection; `None` for explicit
    /// addresses
    pub collection: Option<RecordCollection>,
}

impl RecordRef {
    pub fn explicit(path: DocPath) -> Self {
        Self {
            path,
            collection: None,
        }
    }

    pub fn in_collection(path: DocPath, collection: RecordCollection) -> Self {
        Self {
            path,
            collection: Some(collection),
        }
    }
}

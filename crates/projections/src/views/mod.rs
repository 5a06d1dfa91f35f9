//! Derived stores fed by projection events.

pub mod search;

pub use search::SearchIndexProjection;

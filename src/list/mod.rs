//! Lazy record lists and derived views.
//!
//! [`DataList`] is the base lazy list over a
//! [`DataQuery`](crate::query::DataQuery): composition is pure, and only
//! a terminal operation (iterate, count, materialize) finalizes and
//! executes the statement, once per call, with no result caching.
//! [`ProjectionMap`] is the lazy key→value view with pinned override
//! entries.
//!
//! List capabilities (filter, sort, limit) are independent traits
//! implemented per concrete list type, composed by delegation through
//! [`ListDecorator`] rather than inheritance.

pub mod data_list;
pub mod map;

#[doc(inline)]
pub use data_list::{DataList, Filterable, Limitable, ListDecorator, Sortable};
#[doc(inline)]
pub use map::{ProjectionIter, ProjectionMap};

//! Deferred query composition.
//!
//! [`DataQuery`] is a value-like composer over one entity type: every
//! transformation (filter, sort, limit, parameters, manipulators) returns
//! a new composer, and nothing touches the database until `finalize()`
//! produces a [`SqlSelect`](crate::statement::SqlSelect) for the
//! execution collaborator. [`ConditionGroup`] builds nested WHERE/HAVING
//! fragments with their own connective; [`QueryManipulator`] is the
//! middleware seam that rewrites the working statement around
//! finalization.

pub mod composer;
pub mod group;
pub mod manipulator;

#[doc(inline)]
pub use composer::{DataQuery, FOREIGN_PARAM_NAMESPACE};
#[doc(inline)]
pub use group::{Clause, ConditionGroup, Connective};
#[doc(inline)]
pub use manipulator::{FinalizeContext, QueryManipulator};

//! Query execution contract and a SQL-rendering `Select` for AggressiveQuery.
//!
//! The planner only talks to [`QuerySet`]: it replaces the join set, the
//! prefetch set and the column projection. [`Select`] is the bundled
//! implementation; it renders PostgreSQL-style SQL and reports how many
//! statements a backend would run.

pub mod expr;
pub mod join;
pub mod queryset;
pub mod select;

pub use expr::{BinaryOp, Dialect, Expr};
pub use join::{Join, JoinType, ResolvedJoin, resolve_joins};
pub use queryset::{Prefetch, QuerySet};
pub use select::Select;

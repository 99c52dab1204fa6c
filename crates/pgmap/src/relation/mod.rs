//! Relation resolution.
//!
//! Requested relation names are turned into a tree of [`RelationPlan`]s. Single
//! relations (belongs-to, has-one) are joined into the statement of their parent;
//! collections (has-many, many-to-many) are fetched by one follow-up statement per plan,
//! keyed by every parent key collected at that level, and attached afterwards.
//!
//! | kind | strategy |
//! |---|---|
//! | belongs-to / has-one | `LEFT JOIN` into the parent statement |
//! | has-many | follow-up `WHERE fk = ANY($1)` |
//! | many-to-many | follow-up joined through the join table |

pub(crate) mod assemble;
mod planner;

pub use planner::{RelationPlan, Strategy, plan};

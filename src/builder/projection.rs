//! ProjectedField tree (spec.md §3 "ProjectedField (recursive)").
//!
//! A language-neutral applicative projection DSL rather than a
//! proxy/reflection-inspected closure — the redesign spec.md's Design
//! Notes §9 calls for explicitly ("callers describe projections with an
//! explicit DSL of field references"). Semantics are identical to the
//! source; only the ergonomics of *constructing* a tree differ.

use std::sync::Arc;

use crate::builder::plan::Plan;
use crate::expr::Expr;
use crate::schema::ValueMapper;

/// One named node in a projection tree.
#[derive(Clone)]
pub struct ProjectedField {
    pub name: String,
    pub node: ProjectionNode,
}

#[derive(Clone)]
pub enum ProjectionNode {
    Scalar {
        expr: Expr,
        mapper: Option<Arc<dyn ValueMapper>>,
    },
    Object {
        fields: Vec<ProjectedField>,
    },
    Collection {
        /// The child SELECT plan whose rows are aggregated per parent row
        /// (spec.md §4.5). Its own projection describes the shape of one
        /// element; its own `filters`/`order_by`/`limit`/`offset` are the
        /// per-collection clauses (`posts.order_by(...).select(...)`).
        child: Box<Plan>,
        /// The navigation property (on the parent entity) used as the
        /// correlation key (spec.md glossary "Correlation key").
        navigation: String,
        terminal: CollectionTerminal,
    },
}

#[derive(Clone)]
pub enum CollectionTerminal {
    ToList,
    ToPrimitiveList,
    FirstOrDefault,
    Count,
    Sum(Expr),
    Min(Expr),
    Max(Expr),
    Exists,
    /// Flattens a collection whose elements are themselves collections
    /// (spec.md §4.5 `select_many`). The inner collection's terminal is
    /// carried by the child plan's own projection.
    SelectMany,
}

impl CollectionTerminal {
    /// spec.md §8 "Coalesce": every terminal but `FirstOrDefault` decodes
    /// to an empty container, never null, when no child rows matched.
    pub fn coalesces_to_empty(&self) -> bool {
        !matches!(self, CollectionTerminal::FirstOrDefault)
    }

    /// spec.md §4.5/§9: whether this terminal can be satisfied by an
    /// inline correlated subquery instead of a full join (no
    /// limit/offset/order_by, simple scalar aggregation).
    pub fn is_simple_scalar_aggregate(&self) -> bool {
        matches!(
            self,
            CollectionTerminal::Count
                | CollectionTerminal::Sum(_)
                | CollectionTerminal::Min(_)
                | CollectionTerminal::Max(_)
                | CollectionTerminal::Exists
                | CollectionTerminal::FirstOrDefault
        )
    }
}

impl ProjectedField {
    pub fn scalar(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            node: ProjectionNode::Scalar { expr, mapper: None },
        }
    }

    pub fn scalar_mapped(name: impl Into<String>, expr: Expr, mapper: Arc<dyn ValueMapper>) -> Self {
        Self {
            name: name.into(),
            node: ProjectionNode::Scalar {
                expr,
                mapper: Some(mapper),
            },
        }
    }

    pub fn object(name: impl Into<String>, fields: Vec<ProjectedField>) -> Self {
        Self {
            name: name.into(),
            node: ProjectionNode::Object { fields },
        }
    }

    pub fn collection(
        name: impl Into<String>,
        navigation: impl Into<String>,
        child: Plan,
        terminal: CollectionTerminal,
    ) -> Self {
        Self {
            name: name.into(),
            node: ProjectionNode::Collection {
                child: Box::new(child),
                navigation: navigation.into(),
                terminal,
            },
        }
    }

    /// spec.md §3 "shape-stable decoding" invariant: derive the unique,
    /// deterministic alias path for every scalar leaf by joining declared
    /// names with `__`, purely a function of the declared projection
    /// (never of table/column names), so two semantically identical
    /// projections always produce the same SQL.
    pub fn collect_scalar_aliases(fields: &[ProjectedField], prefix: &str) -> Vec<(String, Expr, Option<Arc<dyn ValueMapper>>)> {
        let mut out = Vec::new();
        for field in fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{}__{}", prefix, field.name)
            };
            match &field.node {
                ProjectionNode::Scalar { expr, mapper } => {
                    out.push((path, expr.clone(), mapper.clone()));
                }
                ProjectionNode::Object { fields } => {
                    out.extend(Self::collect_scalar_aliases(fields, &path));
                }
                ProjectionNode::Collection { .. } => {
                    // Collections materialize through their own strategy-specific
                    // SQL, not as flat scalar leaves of the outer query.
                }
            }
        }
        out
    }

    /// Every `Collection` leaf reachable from `fields`, paired with its
    /// alias path computed by the same `parent__child` scheme as
    /// `collect_scalar_aliases` — so a collection nested inside an
    /// `Object` field gets a column alias distinct from a sibling
    /// top-level collection that happens to share its declared name.
    /// Object nesting is purely a projection-shape concept here: it does
    /// not change which entity/alias the collection's navigation
    /// correlates against (spec.md §4.5 correlates against the plan's
    /// root, regardless of projection nesting).
    pub fn collection_fields(fields: &[ProjectedField], prefix: &str) -> Vec<(String, &ProjectedField)> {
        let mut out = Vec::new();
        for field in fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{}__{}", prefix, field.name)
            };
            match &field.node {
                ProjectionNode::Collection { .. } => out.push((path, field)),
                ProjectionNode::Object { fields } => {
                    out.extend(Self::collection_fields(fields, &path));
                }
                ProjectionNode::Scalar { .. } => {}
            }
        }
        out
    }

    pub fn has_collection_field(fields: &[ProjectedField]) -> bool {
        fields.iter().any(|f| match &f.node {
            ProjectionNode::Collection { .. } => true,
            ProjectionNode::Object { fields } => Self::has_collection_field(fields),
            ProjectionNode::Scalar { .. } => false,
        })
    }
}

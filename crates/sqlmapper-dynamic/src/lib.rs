//! Dynamic SQL composition for SQLMapper Rust.
//!
//! Statement bodies are fragment trees (`SqlNode`) built once and applied
//! per call to produce a `BoundSql`: the final SQL text with `?` markers and
//! the ordered list of `ParameterMapping`s that fill them.
//!
//! ```ignore
//! let root = SqlNode::mixed(vec![
//!     SqlNode::text("SELECT * FROM users")?,
//!     SqlNode::where_clause(SqlNode::mixed(vec![
//!         SqlNode::if_test("name != null", SqlNode::text("AND name = #{name}")?)?,
//!         SqlNode::if_test("minAge != null", SqlNode::text("AND age >= #{minAge}")?)?,
//!     ])),
//! ]);
//! let source = SqlSource::new(root)?;
//! let bound = source.bound_sql(&params)?;
//! ```

pub mod bound;
pub mod context;
pub mod expression;
pub mod node;
pub mod source;
pub mod text;

pub use bound::{BoundSql, ParameterMapping, ParameterMode};
pub use context::DynamicContext;
pub use expression::{Expr, Scope};
pub use node::{ForeachNode, IfNode, SqlNode, TrimNode};
pub use source::{SqlSource, StaticSqlSource};
pub use text::TextNode;

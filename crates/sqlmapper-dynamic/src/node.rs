//! Fragment trees.
//!
//! A statement body is a tree of `SqlNode`s built once at configuration
//! time. Applying the tree to a `DynamicContext` appends SQL text and
//! placeholder bindings in a single left-to-right pass.

use crate::context::DynamicContext;
use crate::expression::Expr;
use crate::text::{Segment, TextNode};
use sqlmapper_core::error::BindingErrorKind;
use sqlmapper_core::{Error, Object, Result, Value};

/// A node in a fragment tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlNode {
    Text(TextNode),
    Mixed(Vec<SqlNode>),
    If(IfNode),
    Choose {
        whens: Vec<IfNode>,
        otherwise: Option<Box<SqlNode>>,
    },
    Foreach(ForeachNode),
    Trim(TrimNode),
    Bind { name: String, expr: Expr },
}

/// A condition and the fragment it guards.
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    test: Expr,
    contents: Box<SqlNode>,
}

impl IfNode {
    pub fn new(test: &str, contents: SqlNode) -> Result<Self> {
        Ok(Self {
            test: Expr::parse(test)?,
            contents: Box::new(contents),
        })
    }
}

/// Repeats its contents once per element of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeachNode {
    collection: Expr,
    collection_source: String,
    item: Option<String>,
    index: Option<String>,
    open: String,
    close: String,
    separator: String,
    nullable: bool,
    contents: Box<SqlNode>,
}

impl ForeachNode {
    /// `collection` is an expression, usually a property path.
    pub fn new(collection: &str, contents: SqlNode) -> Result<Self> {
        Ok(Self {
            collection: Expr::parse(collection)?,
            collection_source: collection.trim().to_string(),
            item: None,
            index: None,
            open: String::new(),
            close: String::new(),
            separator: String::new(),
            nullable: false,
            contents: Box::new(contents),
        })
    }

    pub fn item(mut self, name: impl Into<String>) -> Self {
        self.item = Some(name.into());
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = open.into();
        self
    }

    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = close.into();
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Treat a null collection as empty instead of failing.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    fn apply(&self, ctx: &mut DynamicContext) -> Result<()> {
        let collection = self.collection.evaluate(&*ctx);
        let entries = match collection.entries() {
            Some(entries) => entries,
            None if collection.is_null() && self.nullable => Vec::new(),
            None if collection.is_null() => {
                return Err(Error::binding(
                    BindingErrorKind::InvalidCollection,
                    format!(
                        "The expression '{}' evaluated to a null value.",
                        self.collection_source
                    ),
                ));
            }
            None => {
                return Err(Error::binding(
                    BindingErrorKind::InvalidCollection,
                    format!(
                        "Error evaluating expression '{}'. Return value ({}) was not iterable.",
                        self.collection_source, collection.to_json()
                    ),
                ));
            }
        };

        let saved_item = self.item.as_deref().and_then(|n| ctx.unbind(n));
        let saved_index = self.index.as_deref().and_then(|n| ctx.unbind(n));

        let mut pieces = Vec::with_capacity(entries.len());
        let mut outcome = Ok(());
        for (index, item) in entries {
            let n = ctx.next_unique();
            match self.iteration(ctx, n, index, item) {
                Ok(piece) if !piece.is_empty() => pieces.push(piece),
                Ok(_) => {}
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        for (name, saved) in [(&self.item, saved_item), (&self.index, saved_index)] {
            if let Some(name) = name {
                ctx.unbind(name);
                if let Some(saved) = saved {
                    ctx.bind(name.clone(), saved);
                }
            }
        }
        outcome?;

        let separator = pad_word(&self.separator);
        let mut sql = self.open.clone();
        sql.push_str(&pieces.join(&separator));
        sql.push_str(&self.close);
        ctx.append_sql(&sql);
        Ok(())
    }

    fn iteration(&self, ctx: &mut DynamicContext, n: usize, index: Object, item: Object) -> Result<String> {
        let mut renames = 0;
        if let Some(name) = &self.index {
            let binding = format!("__frch_{}_{}", name, n);
            ctx.bind(name.clone(), index.clone());
            ctx.bind(binding.clone(), index);
            ctx.push_rename(name, binding);
            renames += 1;
        }
        if let Some(name) = &self.item {
            let binding = format!("__frch_{}_{}", name, n);
            ctx.bind(name.clone(), item.clone());
            ctx.bind(binding.clone(), item);
            ctx.push_rename(name, binding);
            renames += 1;
        }
        let piece = ctx.capture(|c| self.contents.apply(c));
        for _ in 0..renames {
            ctx.pop_rename();
        }
        piece.map(|p| p.trim().to_string())
    }
}

/// Word separators such as `OR` need surrounding spaces; punctuation does not.
fn pad_word(separator: &str) -> String {
    let trimmed = separator.trim();
    if trimmed.starts_with(|c: char| c.is_ascii_alphabetic()) {
        format!(" {} ", trimmed)
    } else {
        separator.to_string()
    }
}

/// Buffers its contents and rewrites their edges.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimNode {
    prefix: String,
    suffix: String,
    prefix_overrides: Vec<String>,
    suffix_overrides: Vec<String>,
    contents: Box<SqlNode>,
}

impl TrimNode {
    pub fn new(contents: SqlNode) -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            prefix_overrides: Vec::new(),
            suffix_overrides: Vec::new(),
            contents: Box::new(contents),
        }
    }

    /// `WHERE` preset.
    pub fn where_clause(contents: SqlNode) -> Self {
        Self::new(contents)
            .prefix("WHERE")
            .prefix_overrides("AND |OR |AND\n|OR\n|AND\r|OR\r|AND\t|OR\t")
    }

    /// `SET` preset.
    pub fn set_clause(contents: SqlNode) -> Self {
        Self::new(contents)
            .prefix("SET")
            .prefix_overrides(",")
            .suffix_overrides(",")
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// `|`-separated list, matched case-insensitively.
    pub fn prefix_overrides(mut self, overrides: &str) -> Self {
        self.prefix_overrides = split_overrides(overrides);
        self
    }

    /// `|`-separated list, matched case-insensitively.
    pub fn suffix_overrides(mut self, overrides: &str) -> Self {
        self.suffix_overrides = split_overrides(overrides);
        self
    }

    fn apply(&self, ctx: &mut DynamicContext) -> Result<()> {
        let captured = ctx.capture(|c| self.contents.apply(c))?;
        let body = self.trim_overrides(captured.trim());
        if body.is_empty() {
            return Ok(());
        }
        let mut sql = String::with_capacity(self.prefix.len() + body.len() + self.suffix.len() + 2);
        for part in [self.prefix.as_str(), body, self.suffix.as_str()] {
            if part.is_empty() {
                continue;
            }
            if !sql.is_empty() {
                sql.push(' ');
            }
            sql.push_str(part);
        }
        ctx.append_sql(&sql);
        Ok(())
    }

    /// Strip the first matching prefix override and the first matching
    /// suffix override from already trimmed text.
    pub fn trim_overrides<'a>(&self, text: &'a str) -> &'a str {
        let mut body = text;
        if body.is_empty() {
            return body;
        }
        let upper = body.to_ascii_uppercase();
        if let Some(o) = self.prefix_overrides.iter().find(|o| upper.starts_with(o.as_str())) {
            body = body[o.trim().len()..].trim_start();
        }
        let upper = body.to_ascii_uppercase();
        if let Some(o) = self
            .suffix_overrides
            .iter()
            .find(|o| upper.ends_with(o.as_str()) || upper.ends_with(o.trim()))
        {
            body = body[..body.len() - o.trim().len()].trim_end();
        }
        body
    }
}

fn split_overrides(overrides: &str) -> Vec<String> {
    overrides
        .split('|')
        .filter(|o| !o.trim().is_empty())
        .map(|o| o.to_ascii_uppercase())
        .collect()
}

impl SqlNode {
    /// Literal text with `#{}` placeholders and `${}` substitutions.
    pub fn text(sql: &str) -> Result<Self> {
        Ok(SqlNode::Text(TextNode::parse(sql)?))
    }

    pub fn mixed(children: Vec<SqlNode>) -> Self {
        SqlNode::Mixed(children)
    }

    pub fn if_test(test: &str, contents: SqlNode) -> Result<Self> {
        Ok(SqlNode::If(IfNode::new(test, contents)?))
    }

    pub fn choose(whens: Vec<IfNode>, otherwise: Option<SqlNode>) -> Self {
        SqlNode::Choose {
            whens,
            otherwise: otherwise.map(Box::new),
        }
    }

    pub fn where_clause(contents: SqlNode) -> Self {
        SqlNode::Trim(TrimNode::where_clause(contents))
    }

    pub fn set_clause(contents: SqlNode) -> Self {
        SqlNode::Trim(TrimNode::set_clause(contents))
    }

    /// Evaluate `expr` and bind the result under `name`.
    pub fn bind(name: &str, expr: &str) -> Result<Self> {
        Ok(SqlNode::Bind {
            name: name.to_string(),
            expr: Expr::parse(expr)?,
        })
    }

    /// Inline a shared fragment, replacing `${name}` with fixed values.
    pub fn include(fragment: &SqlNode, properties: &[(&str, &str)]) -> Result<Self> {
        if properties.is_empty() {
            return Ok(fragment.clone());
        }
        Ok(match fragment {
            SqlNode::Text(text) => SqlNode::Text(text.with_properties(properties)?),
            SqlNode::Mixed(children) => SqlNode::Mixed(
                children
                    .iter()
                    .map(|c| SqlNode::include(c, properties))
                    .collect::<Result<_>>()?,
            ),
            SqlNode::If(node) => SqlNode::If(IfNode {
                test: node.test.clone(),
                contents: Box::new(SqlNode::include(&node.contents, properties)?),
            }),
            SqlNode::Choose { whens, otherwise } => SqlNode::Choose {
                whens: whens
                    .iter()
                    .map(|w| {
                        Ok(IfNode {
                            test: w.test.clone(),
                            contents: Box::new(SqlNode::include(&w.contents, properties)?),
                        })
                    })
                    .collect::<Result<_>>()?,
                otherwise: otherwise
                    .as_deref()
                    .map(|o| SqlNode::include(o, properties).map(Box::new))
                    .transpose()?,
            },
            SqlNode::Foreach(node) => SqlNode::Foreach(ForeachNode {
                contents: Box::new(SqlNode::include(&node.contents, properties)?),
                ..node.clone()
            }),
            SqlNode::Trim(node) => SqlNode::Trim(TrimNode {
                contents: Box::new(SqlNode::include(&node.contents, properties)?),
                ..node.clone()
            }),
            SqlNode::Bind { .. } => fragment.clone(),
        })
    }

    /// Does applying this tree depend on the parameter object?
    pub fn is_dynamic(&self) -> bool {
        match self {
            SqlNode::Text(text) => text.has_substitutions(),
            SqlNode::Mixed(children) => children.iter().any(SqlNode::is_dynamic),
            _ => true,
        }
    }

    /// Append this fragment's SQL and bindings to `ctx`.
    pub fn apply(&self, ctx: &mut DynamicContext) -> Result<()> {
        match self {
            SqlNode::Text(text) => apply_text(text, ctx),
            SqlNode::Mixed(children) => {
                for child in children {
                    child.apply(ctx)?;
                }
                Ok(())
            }
            SqlNode::If(node) => {
                if node.test.evaluate_bool(&*ctx) {
                    node.contents.apply(ctx)?;
                }
                Ok(())
            }
            SqlNode::Choose { whens, otherwise } => {
                if let Some(when) = whens.iter().find(|w| w.test.evaluate_bool(&*ctx)) {
                    return when.contents.apply(ctx);
                }
                match otherwise {
                    Some(node) => node.apply(ctx),
                    None => Ok(()),
                }
            }
            SqlNode::Foreach(node) => node.apply(ctx),
            SqlNode::Trim(node) => node.apply(ctx),
            SqlNode::Bind { name, expr } => {
                let value = expr.evaluate(&*ctx);
                ctx.bind(name.clone(), value);
                Ok(())
            }
        }
    }
}

impl From<ForeachNode> for SqlNode {
    fn from(node: ForeachNode) -> Self {
        SqlNode::Foreach(node)
    }
}

impl From<TrimNode> for SqlNode {
    fn from(node: TrimNode) -> Self {
        SqlNode::Trim(node)
    }
}

impl From<IfNode> for SqlNode {
    fn from(node: IfNode) -> Self {
        SqlNode::If(node)
    }
}

fn apply_text(text: &TextNode, ctx: &mut DynamicContext) -> Result<()> {
    let mut sql = String::with_capacity(text.raw().len());
    for segment in text.segments() {
        match segment {
            Segment::Literal(s) => sql.push_str(s),
            Segment::Placeholder(mapping) => {
                ctx.add_mapping(mapping.clone());
                sql.push('?');
            }
            Segment::Substitution(expr) => {
                let value = expr.evaluate(&*ctx);
                sql.push_str(&substitution_text(&value));
            }
        }
    }
    ctx.append_sql(&sql);
    Ok(())
}

fn substitution_text(value: &Object) -> String {
    match value {
        Object::Value(Value::Null) => String::new(),
        Object::Value(v) => v.to_string(),
        other => other.to_json().to_string(),
    }
}

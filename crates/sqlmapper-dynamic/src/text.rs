//! Tokenizing SQL text into literals, `#{}` placeholders and `${}`
//! substitutions.

use crate::bound::{ParameterMapping, ParameterMode};
use crate::expression::Expr;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlmapper_core::{Error, JdbcType, Result, RustType};

/// `name = value` inside a placeholder.
static ATTRIBUTE: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_]*)\s*=\s*(\S(?:.*\S)?)\s*$"));

fn attribute_pattern() -> Result<&'static Regex> {
    ATTRIBUTE
        .as_ref()
        .map_err(|e| Error::config(format!("invalid placeholder attribute pattern: {e}")))
}

/// One piece of parsed text.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Placeholder(ParameterMapping),
    Substitution(Expr),
}

impl Segment {
    fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// SQL text split into segments.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    raw: String,
    segments: Vec<Segment>,
}

impl TextNode {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self {
            raw: raw.to_string(),
            segments: tokenize(raw)?,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Does this text contain `${}` substitutions?
    pub fn has_substitutions(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Substitution(_)))
    }

    /// Re-parse with `${name}` occurrences replaced by fixed property values.
    pub fn with_properties(&self, properties: &[(&str, &str)]) -> Result<Self> {
        let mut raw = self.raw.clone();
        for (name, value) in properties {
            raw = raw.replace(&format!("${{{}}}", name), value);
        }
        Self::parse(&raw)
    }

    /// Is this text only literals?
    pub fn is_plain(&self) -> bool {
        self.segments.iter().all(Segment::is_literal)
    }
}

fn tokenize(raw: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = raw;

    while let Some(pos) = rest.find(['#', '$']) {
        let (before, tail) = rest.split_at(pos);
        if !tail[1..].starts_with('{') {
            literal.push_str(before);
            literal.push_str(&tail[..1]);
            rest = &tail[1..];
            continue;
        }
        if before.ends_with('\\') {
            literal.push_str(&before[..before.len() - 1]);
            literal.push_str(&tail[..2]);
            rest = &tail[2..];
            continue;
        }
        literal.push_str(before);

        let close = tail.find('}').ok_or_else(|| {
            Error::config(format!("unclosed '{}' in SQL text: {}", &tail[..2], raw))
        })?;
        let content = tail[2..close].trim();
        if content.is_empty() {
            return Err(Error::config(format!("empty '{}}}' in SQL text: {}", &tail[..2], raw)));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(if tail.starts_with('#') {
            Segment::Placeholder(parse_placeholder(content)?)
        } else {
            Segment::Substitution(Expr::parse(content)?)
        });
        rest = &tail[close + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Parse the inside of `#{...}`.
///
/// Accepts `prop`, `prop:JDBCTYPE` and `prop, attr=value, ...`.
pub fn parse_placeholder(content: &str) -> Result<ParameterMapping> {
    let mut parts = content.split(',');
    let head = parts.next().unwrap_or_default().trim();
    let (property, inline_jdbc) = match head.split_once(':') {
        Some((p, j)) => (p.trim(), Some(j.trim())),
        None => (head, None),
    };
    if property.is_empty() {
        return Err(Error::config(format!("placeholder without a property: #{{{}}}", content)));
    }

    let mut mapping = ParameterMapping::new(property);
    if let Some(name) = inline_jdbc {
        mapping.jdbc_type = Some(parse_jdbc_type(name)?);
    }
    let pattern = attribute_pattern()?;
    for part in parts {
        let caps = pattern
            .captures(part)
            .ok_or_else(|| Error::config(format!("malformed placeholder attribute '{}'", part.trim())))?;
        let value = &caps[2];
        match &caps[1] {
            "jdbcType" => mapping.jdbc_type = Some(parse_jdbc_type(value)?),
            "javaType" | "rustType" => mapping.rust_type = Some(RustType::from_alias(value)),
            "mode" => {
                mapping.mode = ParameterMode::from_name(value)
                    .ok_or_else(|| Error::config(format!("unknown parameter mode '{}'", value)))?;
            }
            "numericScale" => {
                let scale = value
                    .parse()
                    .map_err(|_| Error::config(format!("bad numericScale '{}'", value)))?;
                mapping.numeric_scale = Some(scale);
            }
            "typeHandler" => mapping.type_handler = Some(value.to_string()),
            other => {
                return Err(Error::config(format!(
                    "unknown placeholder attribute '{}' in #{{{}}}; valid attributes are \
                     jdbcType, javaType, mode, numericScale, typeHandler",
                    other, content
                )));
            }
        }
    }
    Ok(mapping)
}

fn parse_jdbc_type(name: &str) -> Result<JdbcType> {
    JdbcType::from_name(name).ok_or_else(|| Error::config(format!("unknown jdbcType '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_literals_and_markers() {
        let node = TextNode::parse("SELECT * FROM ${table} WHERE id = #{id}").unwrap();
        let segments = node.segments();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment::Literal("SELECT * FROM ".into()));
        assert!(matches!(segments[1], Segment::Substitution(_)));
        assert_eq!(segments[2], Segment::Literal(" WHERE id = ".into()));
        assert_eq!(segments[3], Segment::Placeholder(ParameterMapping::new("id")));
        assert!(node.has_substitutions());
        assert!(!node.is_plain());
    }

    #[test]
    fn bare_symbols_and_escapes_stay_literal() {
        let node = TextNode::parse(r"SELECT '#tag', '$5', '\#{x}'").unwrap();
        assert!(node.is_plain());
        assert_eq!(node.segments(), &[Segment::Literal("SELECT '#tag', '$5', '#{x}'".into())]);
    }

    #[test]
    fn placeholder_attributes() {
        let m = parse_placeholder("price, jdbcType=DECIMAL, numericScale=2, mode=INOUT").unwrap();
        assert_eq!(m.property, "price");
        assert_eq!(m.jdbc_type, Some(JdbcType::Decimal));
        assert_eq!(m.numeric_scale, Some(2));
        assert_eq!(m.mode, ParameterMode::InOut);

        let m = parse_placeholder("name:VARCHAR").unwrap();
        assert_eq!(m.jdbc_type, Some(JdbcType::Varchar));

        let m = parse_placeholder("tags, typeHandler=CsvHandler, javaType=string").unwrap();
        assert_eq!(m.type_handler.as_deref(), Some("CsvHandler"));
        assert_eq!(m.rust_type, Some(RustType::String));
    }

    #[test]
    fn placeholder_errors() {
        assert!(parse_placeholder("id, color=red").is_err());
        assert!(parse_placeholder("id, jdbcType=NOPE").is_err());
        assert!(parse_placeholder("id, mode=SIDEWAYS").is_err());
        assert!(parse_placeholder(", jdbcType=INTEGER").is_err());
        assert!(TextNode::parse("WHERE id = #{id").is_err());
        assert!(TextNode::parse("WHERE id = #{ }").is_err());
    }

    #[test]
    fn property_substitution_reparses() {
        let node = TextNode::parse("SELECT ${cols} FROM t WHERE id = #{id}").unwrap();
        let included = node.with_properties(&[("cols", "id, name")]).unwrap();
        assert_eq!(included.raw(), "SELECT id, name FROM t WHERE id = #{id}");
        assert!(!included.has_substitutions());
    }
}

//! Schema selector expressions
//!
//! A selector names the schema a tracker is looking for, optionally narrowed
//! by a filter over the rest of the capability attributes:
//!
//! ```text
//! schemaName[;filter:=(expression)]
//! ```
//!
//! The filter expression is an LDAP-style subset: `(key=value)`,
//! `(key>=value)`, `(key<=value)`, conjunction `(&(..)(..))`, disjunction
//! `(|(..)(..))`, and negation `(!(..))`. For example, a provider advertising
//! `name=myApp;resource=changelog.xml;version=2.0.0` is matched by the
//! selector `myApp;filter:=(version>=2)`.
//!
//! Compilation is fail-fast: a syntactically invalid expression is a fatal
//! configuration error raised before the tracker starts observing providers.

use std::collections::HashMap;

use crate::error::SelectorError;
use crate::provider::{ATTR_SCHEMA_NAME, ATTR_SCHEMA_RESOURCE, AttrValue};

/// A compiled schema selector: required schema name plus optional filter.
#[derive(Debug, Clone)]
pub struct SchemaSelector {
    schema: String,
    filter: Option<FilterNode>,
    raw: String,
}

impl SchemaSelector {
    /// Compile a selector expression.
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        let raw = expression.trim().to_string();
        let mut parts = raw.split(';');
        // split always yields at least one element
        let schema = parts.next().unwrap_or_default().trim();
        if schema.is_empty() {
            return Err(SelectorError::EmptySchemaName);
        }
        if schema.contains(['(', ')', '=', '<', '>']) {
            return Err(SelectorError::InvalidSchemaName(schema.to_string()));
        }

        let mut filter = None;
        for directive in parts {
            let directive = directive.trim();
            match directive.strip_prefix("filter:=") {
                Some(rest) => {
                    if filter.is_some() {
                        return Err(SelectorError::DuplicateFilter);
                    }
                    filter = Some(FilterParser::new(rest).parse()?);
                }
                None => return Err(SelectorError::UnknownDirective(directive.to_string())),
            }
        }

        Ok(Self {
            schema: schema.to_string(),
            filter,
            raw,
        })
    }

    /// The schema name this selector requires.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    /// The original expression, as given to [`parse`](Self::parse).
    pub fn expression(&self) -> &str {
        &self.raw
    }

    /// Evaluate the selector against a capability attribute map.
    ///
    /// A descriptor matches when its schema name attribute equals the
    /// selector's schema, the optional filter evaluates true, and a migration
    /// resource attribute is present — a capability without a resource can
    /// never be migrated, so it is never a candidate.
    pub fn matches(&self, attributes: &HashMap<String, AttrValue>) -> bool {
        let name_matches = attributes
            .get(ATTR_SCHEMA_NAME)
            .is_some_and(|value| value.eq_literal(&self.schema));
        if !name_matches || !attributes.contains_key(ATTR_SCHEMA_RESOURCE) {
            return false;
        }
        match &self.filter {
            Some(filter) => filter.eval(attributes),
            None => true,
        }
    }
}

/// One node of a compiled filter expression.
#[derive(Debug, Clone)]
enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Compare {
        key: String,
        op: CompareOp,
        literal: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Equal,
    AtLeast,
    AtMost,
}

impl FilterNode {
    fn eval(&self, attributes: &HashMap<String, AttrValue>) -> bool {
        use std::cmp::Ordering;
        match self {
            Self::And(operands) => operands.iter().all(|node| node.eval(attributes)),
            Self::Or(operands) => operands.iter().any(|node| node.eval(attributes)),
            Self::Not(inner) => !inner.eval(attributes),
            Self::Compare { key, op, literal } => match attributes.get(key) {
                // An absent attribute fails the clause, like any comparison
                // against nothing.
                None => false,
                Some(value) => {
                    let ordering = value.compare_literal(literal);
                    match op {
                        CompareOp::Equal => ordering == Ordering::Equal,
                        CompareOp::AtLeast => ordering != Ordering::Less,
                        CompareOp::AtMost => ordering != Ordering::Greater,
                    }
                }
            },
        }
    }
}

/// Recursive-descent parser over the filter expression bytes.
struct FilterParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> FilterParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<FilterNode, SelectorError> {
        self.skip_whitespace();
        let node = self.parse_node()?;
        self.skip_whitespace();
        if self.pos != self.input.len() {
            return Err(SelectorError::TrailingInput { at: self.pos });
        }
        Ok(node)
    }

    fn parse_node(&mut self) -> Result<FilterNode, SelectorError> {
        self.expect('(')?;
        self.skip_whitespace();
        let node = match self.peek() {
            Some('&') => {
                let at = self.pos;
                self.advance();
                FilterNode::And(self.parse_operands('&', at)?)
            }
            Some('|') => {
                let at = self.pos;
                self.advance();
                FilterNode::Or(self.parse_operands('|', at)?)
            }
            Some('!') => {
                self.advance();
                self.skip_whitespace();
                FilterNode::Not(Box::new(self.parse_node()?))
            }
            Some(_) => self.parse_compare()?,
            None => return Err(SelectorError::UnexpectedEnd),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(node)
    }

    fn parse_operands(
        &mut self,
        operator: char,
        at: usize,
    ) -> Result<Vec<FilterNode>, SelectorError> {
        let mut operands = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                break;
            }
            operands.push(self.parse_node()?);
        }
        if operands.is_empty() {
            return Err(SelectorError::EmptyOperandList { operator, at });
        }
        Ok(operands)
    }

    fn parse_compare(&mut self) -> Result<FilterNode, SelectorError> {
        let start = self.pos;
        let key_end = self.input[self.pos..]
            .find(['=', '<', '>', '(', ')'])
            .map(|offset| self.pos + offset)
            .ok_or(SelectorError::UnexpectedEnd)?;
        let key = self.input[start..key_end].trim();
        if key.is_empty() {
            return Err(SelectorError::MissingKey { at: start });
        }
        self.pos = key_end;

        let op = match self.peek() {
            Some('=') => {
                self.advance();
                CompareOp::Equal
            }
            Some('>') => {
                self.advance();
                self.expect('=')?;
                CompareOp::AtLeast
            }
            Some('<') => {
                self.advance();
                self.expect('=')?;
                CompareOp::AtMost
            }
            _ => return Err(SelectorError::MissingOperator { at: self.pos }),
        };

        let literal_start = self.pos;
        let literal_end = self.input[self.pos..]
            .find([')', '('])
            .map(|offset| self.pos + offset)
            .ok_or(SelectorError::UnexpectedEnd)?;
        if self.input[literal_end..].starts_with('(') {
            return Err(SelectorError::Expected {
                expected: ')',
                at: literal_end,
            });
        }
        let literal = self.input[literal_start..literal_end].trim().to_string();
        self.pos = literal_end;

        Ok(FilterNode::Compare {
            key: key.to_string(),
            op,
            literal,
        })
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(_) => Err(SelectorError::Expected {
                expected,
                at: self.pos,
            }),
            None => Err(SelectorError::UnexpectedEnd),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }
}

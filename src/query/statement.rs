//! Query templates and bound statements
//!
//! A [`QueryTemplate`] is a fixed query string with positional `?`
//! placeholders. Binding it to concrete values yields an immutable
//! [`BoundStatement`]; a [`StatementSet`] holds the statements an executor
//! has yet to run, in the order they were added.

use crate::error::Error;
use crate::types::Value;
use std::fmt;
use std::sync::Arc;

/// A fixed query string with positional parameters
///
/// Cloning shares the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    text: Arc<str>,
    placeholders: usize,
}

impl QueryTemplate {
    /// Create a template from query text
    ///
    /// Every `?` counts as one positional parameter; templates never
    /// contain literal question marks.
    pub fn new(text: impl Into<String>) -> Self {
        let text: String = text.into();
        let placeholders = text.matches('?').count();
        Self {
            text: Arc::from(text),
            placeholders,
        }
    }

    /// Daily distinct-user count over one bucket of one day
    pub fn daily_user_count(table: &str) -> Self {
        Self::new(format!(
            "SELECT count(userID) as count FROM {} WHERE pid=? AND day=? AND bucketID_day=?",
            table
        ))
    }

    /// Query text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of positional parameters
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    /// Bind parameter values, checking arity
    pub fn bind(&self, params: Vec<Value>) -> Result<BoundStatement, Error> {
        if params.len() != self.placeholders {
            return Err(Error::InvalidStatement(format!(
                "template expects {} parameters, got {}",
                self.placeholders,
                params.len()
            )));
        }
        Ok(BoundStatement {
            template: self.clone(),
            params,
        })
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A template with concrete parameter values; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    template: QueryTemplate,
    params: Vec<Value>,
}

impl BoundStatement {
    /// Template this statement was bound from
    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Positional parameter values
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(f, "{} [{}]", self.template, params.join(", "))
    }
}

/// Ordered statements awaiting execution
#[derive(Debug, Clone, Default)]
pub struct StatementSet {
    statements: Vec<BoundStatement>,
}

impl StatementSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement
    pub fn push(&mut self, statement: BoundStatement) {
        self.statements.push(statement);
    }

    /// Number of pending statements
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The next chunk of at most `max` statements, oldest first
    pub fn next_chunk(&self, max: usize) -> &[BoundStatement] {
        let end = max.min(self.statements.len());
        &self.statements[..end]
    }

    /// Drop the `n` oldest statements after they executed
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.statements.len());
        self.statements.drain(..n);
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.statements.clear();
    }

    /// Pending statements in order
    pub fn iter(&self) -> impl Iterator<Item = &BoundStatement> {
        self.statements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_counts_placeholders() {
        let template = QueryTemplate::daily_user_count("index_day");
        assert_eq!(template.placeholders(), 3);
        assert!(template.text().contains("FROM index_day"));
    }

    #[test]
    fn test_bind_checks_arity() {
        let template = QueryTemplate::new("SELECT * FROM t WHERE a=? AND b=?");
        assert!(template.bind(vec![1i64.into(), 2i64.into()]).is_ok());

        let err = template.bind(vec![1i64.into()]).unwrap_err();
        assert!(matches!(err, Error::InvalidStatement(_)));
    }

    #[test]
    fn test_statement_display() {
        let stmt = QueryTemplate::new("SELECT 1 WHERE pid=?")
            .bind(vec!["p1".into()])
            .unwrap();
        assert_eq!(stmt.to_string(), "SELECT 1 WHERE pid=? ['p1']");
    }

    #[test]
    fn test_set_chunks_in_order() {
        let template = QueryTemplate::new("SELECT ?");
        let mut set = StatementSet::new();
        for i in 0..5i64 {
            set.push(template.bind(vec![i.into()]).unwrap());
        }

        let first: Vec<_> = set.next_chunk(2).iter().map(|s| s.params()[0].clone()).collect();
        assert_eq!(first, vec![Value::Int(0), Value::Int(1)]);

        set.consume(2);
        assert_eq!(set.len(), 3);
        assert_eq!(set.next_chunk(10).len(), 3);
        assert_eq!(set.next_chunk(10)[0].params()[0], Value::Int(2));

        set.clear();
        assert!(set.is_empty());
        assert!(set.next_chunk(4).is_empty());
    }
}

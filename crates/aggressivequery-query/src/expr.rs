//! SQL expressions for filtering sub-queries.
//!
//! Small, composable predicate trees rendered with numbered placeholders.
//! Filters passed to prefetch sub-queries are built from these.

use aggressivequery_core::Value;

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }
}

/// A SQL predicate or operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        table: Option<String>,
        name: String,
    },

    /// Literal value, bound as a parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// IN (...) list
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// Parenthesized expression
    Paren(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
        }
    }
}

impl Expr {
    /// Unqualified column reference. Qualified against the query's table on render.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Column reference qualified with a table name or join alias.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    // ==================== Comparison Operators ====================

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        self.binary(BinaryOp::Like, Expr::lit(pattern.into()))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Expr::lit).collect(),
            negated: false,
        }
    }

    // ==================== Logical Operators ====================

    /// Logical AND. OR operands are parenthesized.
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.grouped().binary(BinaryOp::And, other.into().grouped())
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    fn grouped(self) -> Self {
        match self {
            Expr::Binary {
                op: BinaryOp::Or, ..
            } => self.paren(),
            other => other,
        }
    }

    /// Qualify every unqualified column with `table`.
    pub fn qualify(self, table: &str) -> Self {
        match self {
            Expr::Column { table: None, name } => Expr::Column {
                table: Some(table.to_string()),
                name,
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.qualify(table)),
                op,
                right: Box::new(right.qualify(table)),
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.qualify(table)),
                negated,
            },
            Expr::In {
                expr,
                values,
                negated,
            } => Expr::In {
                expr: Box::new(expr.qualify(table)),
                values,
                negated,
            },
            Expr::Paren(inner) => Expr::Paren(Box::new(inner.qualify(table))),
            other => other,
        }
    }

    /// Render with PostgreSQL placeholders.
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        self.build_with_dialect(Dialect::default(), params, offset)
    }

    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        match self {
            Expr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    dialect.quote_identifier(t),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(offset + params.len())
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build_with_dialect(dialect, params, offset);
                let right_sql = right.build_with_dialect(dialect, params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                if *negated {
                    format!("{expr_sql} IS NOT NULL")
                } else {
                    format!("{expr_sql} IS NULL")
                }
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let value_sqls: Vec<_> = values
                    .iter()
                    .map(|v| v.build_with_dialect(dialect, params, offset))
                    .collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{expr_sql} {keyword} ({})", value_sqls.join(", "))
            }

            Expr::Paren(expr) => {
                format!("({})", expr.build_with_dialect(dialect, params, offset))
            }
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::lit(v)
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Expr::lit(v)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::lit(v)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::lit(v)
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::lit(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::lit(v)
    }
}

//! InfluxQL syntax tree produced by the PromQL transpiler
//!
//! Only the subset of InfluxQL the transpiler emits is modelled here: SELECT
//! statements (optionally nested as sub-queries) and SHOW TAG VALUES. Every
//! node renders itself to wire text through [`std::fmt::Display`], so
//! `node.to_string()` is the query sent to InfluxDB.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use regex::Regex;

/// Binary operators understood by InfluxQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    EqRegex,
    NeqRegex,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::And => "AND",
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::EqRegex => "=~",
            Self::NeqRegex => "!~",
        };
        f.write_str(token)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Integer(i64),
    String(String),
    /// Source of an already compiled, fully anchored regular expression
    Regex(String),
    Time(DateTime<Utc>),
    Duration(Duration),
}

impl Literal {
    /// Anchors `pattern` the way PromQL matches label values (full string)
    /// and checks that it compiles.
    pub fn anchored_regex(pattern: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self::Regex(re.as_str().to_string()))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write_number(f, *v),
            Self::Integer(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(&quote_string(s)),
            Self::Regex(re) => write!(f, "/{}/", re.replace('/', "\\/")),
            Self::Time(t) => write!(f, "'{}'", t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Duration(d) => f.write_str(&format_duration(*d)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardKind {
    /// `*`
    All,
    /// `*::tag`
    Tag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: Operator,
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    VarRef(String),
    Call(Call),
    Binary(Box<BinaryExpr>),
    Paren(Box<Expr>),
    Wildcard(WildcardKind),
}

impl Expr {
    pub fn number(v: f64) -> Self {
        Self::Literal(Literal::Number(v))
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::VarRef(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call(Call {
            name: name.into(),
            args,
        })
    }

    pub fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary(Box::new(BinaryExpr { op, lhs, rhs }))
    }

    pub fn paren(inner: Expr) -> Self {
        Self::Paren(Box::new(inner))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(Operator::And, lhs, rhs)
    }

    /// Column name InfluxDB gives this expression in a result set.
    ///
    /// Calls are named after the function, variable references after the
    /// variable, and arithmetic after every call/variable it contains joined
    /// with `_`.
    pub fn field_name(&self) -> String {
        match self {
            Self::Call(call) => call.name.clone(),
            Self::VarRef(name) => name.clone(),
            Self::Paren(inner) => inner.field_name(),
            Self::Binary(_) => {
                let mut names = Vec::new();
                self.collect_names(&mut names);
                names.join("_")
            }
            Self::Literal(_) | Self::Wildcard(_) => String::new(),
        }
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            Self::Call(call) => names.push(call.name.clone()),
            Self::VarRef(name) => names.push(name.clone()),
            Self::Paren(inner) => inner.collect_names(names),
            Self::Binary(bin) => {
                bin.lhs.collect_names(names);
                bin.rhs.collect_names(names);
            }
            Self::Literal(_) | Self::Wildcard(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => lit.fmt(f),
            Self::VarRef(name) => f.write_str(&quote_ident(name)),
            Self::Call(call) => {
                write!(f, "{}(", call.name)?;
                write_joined(f, &call.args)?;
                f.write_str(")")
            }
            Self::Binary(bin) => write!(f, "{} {} {}", bin.lhs, bin.op, bin.rhs),
            Self::Paren(inner) => write!(f, "({inner})"),
            Self::Wildcard(WildcardKind::All) => f.write_str("*"),
            Self::Wildcard(WildcardKind::Tag) => f.write_str("*::tag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub expr: Expr,
}

impl Field {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn tag_wildcard() -> Self {
        Self::new(Expr::Wildcard(WildcardKind::Tag))
    }

    pub fn name(&self) -> String {
        self.expr.field_name()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension(pub Expr);

impl Dimension {
    /// `GROUP BY *`
    pub fn all() -> Self {
        Self(Expr::Wildcard(WildcardKind::All))
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self(Expr::var(name))
    }

    /// `time(<interval>)`
    pub fn time(interval: Duration) -> Self {
        Self(Expr::call(
            "time",
            vec![Expr::Literal(Literal::Duration(interval))],
        ))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Name(String),
    /// Anchored pattern, matched against measurement names
    Regex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Measurement(Measurement),
    SubQuery(Box<SelectStatement>),
}

impl Source {
    pub fn measurement(name: impl Into<String>) -> Self {
        Self::Measurement(Measurement::Name(name.into()))
    }

    pub fn subquery(statement: SelectStatement) -> Self {
        Self::SubQuery(Box::new(statement))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measurement(Measurement::Name(name)) => f.write_str(&quote_ident(name)),
            Self::Measurement(Measurement::Regex(re)) => {
                Literal::Regex(re.clone()).fmt(f)
            }
            Self::SubQuery(stmt) => write!(f, "({stmt})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub fields: Vec<Field>,
    pub sources: Vec<Source>,
    pub condition: Option<Expr>,
    pub dimensions: Vec<Dimension>,
    pub location: Option<Tz>,
}

impl SelectStatement {
    /// Statement that reads every column of `sub` through a sub-query
    pub fn wrapping(sub: SelectStatement) -> Self {
        Self {
            sources: vec![Source::subquery(sub)],
            ..Default::default()
        }
    }

    /// The field currently being built up by the transpiler
    pub fn last_field(&self) -> Option<&Field> {
        self.fields.last()
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        write_joined(f, &self.fields)?;
        f.write_str(" FROM ")?;
        write_joined(f, &self.sources)?;
        if let Some(cond) = &self.condition {
            write!(f, " WHERE {cond}")?;
        }
        if !self.dimensions.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_joined(f, &self.dimensions)?;
        }
        if let Some(tz) = &self.location {
            write!(f, " TZ({})", quote_string(tz.name()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowTagValuesStatement {
    pub database: String,
    pub sources: Vec<Source>,
    pub op: Operator,
    pub tag_key: String,
    pub condition: Option<Expr>,
}

impl ShowTagValuesStatement {
    /// `SHOW TAG VALUES [ON db] WITH KEY = <key>`
    pub fn with_key(database: impl Into<String>, tag_key: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            sources: Vec::new(),
            op: Operator::Eq,
            tag_key: tag_key.into(),
            condition: None,
        }
    }
}

impl fmt::Display for ShowTagValuesStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SHOW TAG VALUES")?;
        if !self.database.is_empty() {
            write!(f, " ON {}", quote_ident(&self.database))?;
        }
        if !self.sources.is_empty() {
            f.write_str(" FROM ")?;
            write_joined(f, &self.sources)?;
        }
        write!(f, " WITH KEY {} {}", self.op, quote_ident(&self.tag_key))?;
        if let Some(cond) = &self.condition {
            write!(f, " WHERE {cond}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    ShowTagValues(ShowTagValuesStatement),
}

impl Statement {
    pub fn condition_mut(&mut self) -> &mut Option<Expr> {
        match self {
            Self::Select(stmt) => &mut stmt.condition,
            Self::ShowTagValues(stmt) => &mut stmt.condition,
        }
    }

    /// Prepends `time_condition` to the WHERE clause with AND
    pub fn apply_time_condition(&mut self, time_condition: Expr) {
        let condition = self.condition_mut();
        *condition = Some(match condition.take() {
            Some(existing) => Expr::and(time_condition, existing),
            None => time_condition,
        });
    }

    /// Only SELECT carries a `TZ()` clause
    pub fn set_location(&mut self, tz: Option<Tz>) {
        if let Self::Select(stmt) = self {
            stmt.location = tz;
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(stmt) => stmt.fmt(f),
            Self::ShowTagValues(stmt) => stmt.fmt(f),
        }
    }
}

/// Result of transpiling one PromQL node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Expr(Expr),
    Statement(Statement),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(expr) => expr.fmt(f),
            Self::Statement(stmt) => stmt.fmt(f),
        }
    }
}

impl From<SelectStatement> for Node {
    fn from(stmt: SelectStatement) -> Self {
        Self::Statement(Statement::Select(stmt))
    }
}

impl From<Expr> for Node {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

/// Three decimals when that is exact, otherwise the shortest text that
/// reads back as `v`
fn write_number(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    let fixed = format!("{v:.3}");
    if fixed.parse::<f64>() == Ok(v) {
        f.write_str(&fixed)
    } else {
        write!(f, "{v}")
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.fmt(f)?;
    }
    Ok(())
}

const KEYWORDS: &[&str] = &[
    "all", "alter", "analyze", "any", "as", "asc", "begin", "by", "card", "create",
    "continuous", "database", "databases", "default", "delete", "desc", "destinations",
    "diagnostics", "distinct", "drop", "duration", "end", "every", "exact", "explain", "false",
    "field", "for", "from", "grant", "grants", "group", "groups", "in", "inf", "insert", "into",
    "key", "keys", "kill", "limit", "measurement", "measurements", "name", "offset", "on",
    "order", "password", "policies", "policy", "privileges", "queries", "query", "read",
    "replication", "resample", "retention", "revoke", "select", "series", "set", "shard",
    "shards", "slimit", "soffset", "stats", "subscription", "subscriptions", "tag", "to",
    "true", "user", "users", "values", "where", "with", "write",
];

fn ident_needs_quotes(ident: &str) -> bool {
    let mut chars = ident.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !(first.is_alphabetic() || first == '_') {
        return true;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return true;
    }
    KEYWORDS.contains(&ident.to_ascii_lowercase().as_str())
}

/// Double-quotes an identifier when InfluxQL would not lex it as one
pub fn quote_ident(ident: &str) -> String {
    if ident_needs_quotes(ident) {
        format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        ident.to_string()
    }
}

/// Single-quotes a string literal
pub fn quote_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n");
    format!("'{escaped}'")
}

/// Renders a duration with the largest unit that divides it exactly
pub fn format_duration(d: Duration) -> String {
    const UNITS: &[(u128, &str)] = &[
        (7 * 24 * 3_600_000_000_000, "w"),
        (24 * 3_600_000_000_000, "d"),
        (3_600_000_000_000, "h"),
        (60_000_000_000, "m"),
        (1_000_000_000, "s"),
        (1_000_000, "ms"),
        (1_000, "u"),
    ];
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    for (unit, suffix) in UNITS {
        if nanos % unit == 0 {
            return format!("{}{suffix}", nanos / unit);
        }
    }
    format!("{nanos}ns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn select_last_value(measurement: &str) -> SelectStatement {
        SelectStatement {
            fields: vec![
                Field::tag_wildcard(),
                Field::new(Expr::call("last", vec![Expr::var("value")])),
            ],
            sources: vec![Source::measurement(measurement)],
            dimensions: vec![Dimension::all()],
            ..Default::default()
        }
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(Literal::Number(5.0).to_string(), "5.000");
        assert_eq!(Literal::Number(-10.0).to_string(), "-10.000");
        assert_eq!(Literal::Number(0.25).to_string(), "0.250");
        assert_eq!(Literal::Number(0.0001).to_string(), "0.0001");
        assert_eq!(Literal::Number(99.95).to_string(), "99.950");
        assert_eq!(Literal::Number(1.0 / 3.0).to_string(), "0.3333333333333333");
        assert_eq!(Literal::Integer(3).to_string(), "3");
        assert_eq!(Literal::String("justastring".into()).to_string(), "'justastring'");
        assert_eq!(Literal::String("it's".into()).to_string(), r"'it\'s'");
        let t = Utc.with_ymd_and_hms(2023, 1, 6, 7, 0, 0).unwrap();
        assert_eq!(Literal::Time(t).to_string(), "'2023-01-06T07:00:00Z'");
    }

    #[test]
    fn test_anchored_regex() {
        let lit = Literal::anchored_regex("tele.*").unwrap();
        assert_eq!(lit.to_string(), "/^(?:tele.*)$/");
        let lit = Literal::anchored_regex("a/b").unwrap();
        assert_eq!(lit.to_string(), r"/^(?:a\/b)$/");
        assert!(Literal::anchored_regex("(unclosed").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("cpu"), "cpu");
        assert_eq!(quote_ident("go_goroutines"), "go_goroutines");
        assert_eq!(quote_ident("my-metric"), "\"my-metric\"");
        assert_eq!(quote_ident("select"), "\"select\"");
        assert_eq!(quote_ident("1abc"), "\"1abc\"");
        assert_eq!(quote_ident(""), "\"\"");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(Expr::call("last", vec![Expr::var("value")]).field_name(), "last");
        assert_eq!(Expr::var("usage_idle").field_name(), "usage_idle");
        let arith = Expr::binary(
            Operator::Mul,
            Expr::number(5.0),
            Expr::paren(Expr::binary(
                Operator::Sub,
                Expr::call("last", vec![Expr::var("value")]),
                Expr::number(6.0),
            )),
        );
        assert_eq!(arith.field_name(), "last");
    }

    #[test]
    fn test_select_rendering() {
        let mut stmt = Statement::Select(select_last_value("cpu"));
        assert_eq!(
            stmt.to_string(),
            "SELECT *::tag, last(value) FROM cpu GROUP BY *"
        );

        let t = Utc.with_ymd_and_hms(2023, 1, 6, 7, 0, 0).unwrap();
        stmt.apply_time_condition(Expr::binary(
            Operator::Lte,
            Expr::var("time"),
            Expr::Literal(Literal::Time(t)),
        ));
        stmt.set_location(Some(chrono_tz::Asia::Shanghai));
        assert_eq!(
            stmt.to_string(),
            "SELECT *::tag, last(value) FROM cpu WHERE time <= '2023-01-06T07:00:00Z' GROUP BY * TZ('Asia/Shanghai')"
        );
    }

    #[test]
    fn test_time_condition_is_prepended() {
        let mut inner = select_last_value("cpu");
        inner.condition = Some(Expr::binary(
            Operator::Eq,
            Expr::var("host"),
            Expr::Literal(Literal::String("telegraf".into())),
        ));
        let mut stmt = Statement::Select(inner);
        stmt.apply_time_condition(Expr::binary(
            Operator::Gte,
            Expr::var("time"),
            Expr::Literal(Literal::Integer(0)),
        ));
        assert_eq!(
            stmt.to_string(),
            "SELECT *::tag, last(value) FROM cpu WHERE time >= 0 AND host = 'telegraf' GROUP BY *"
        );
    }

    #[test]
    fn test_subquery_rendering() {
        let mut outer = SelectStatement::wrapping(select_last_value("x"));
        outer.fields = vec![
            Field::tag_wildcard(),
            Field::new(Expr::call(
                "top",
                vec![Expr::var("last"), Expr::Literal(Literal::Integer(3))],
            )),
        ];
        assert_eq!(
            outer.to_string(),
            "SELECT *::tag, top(last, 3) FROM (SELECT *::tag, last(value) FROM x GROUP BY *)"
        );
    }

    #[test]
    fn test_show_tag_values_rendering() {
        let mut stmt = ShowTagValuesStatement::with_key("prometheus", "job");
        assert_eq!(stmt.to_string(), "SHOW TAG VALUES ON prometheus WITH KEY = job");

        stmt.sources = vec![Source::measurement("go_goroutines")];
        let mut stmt = Statement::ShowTagValues(stmt);
        stmt.set_location(Some(chrono_tz::Asia::Shanghai));
        assert_eq!(
            stmt.to_string(),
            "SHOW TAG VALUES ON prometheus FROM go_goroutines WITH KEY = job"
        );

        let empty = ShowTagValuesStatement::with_key("", "");
        assert_eq!(empty.to_string(), "SHOW TAG VALUES WITH KEY = \"\"");
    }
}

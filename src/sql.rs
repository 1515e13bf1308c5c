use std::collections::HashMap;

use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use ulid::Ulid;

use chrono::{NaiveDate, NaiveTime};

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBooking(BookingRequest),
    UpdateBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectBookings {
        id: Option<Ulid>,
        filter: BookingFilter,
    },
    InsertResource(ResourceSpec),
    UpdateResourceStatus {
        id: Ulid,
        status: ResourceStatus,
    },
    UpdateResource {
        id: Ulid,
        patch: ResourcePatch,
    },
    DeleteResource {
        id: Ulid,
    },
    SelectResources {
        id: Option<Ulid>,
        filter: ResourceFilter,
    },
    SelectAvailability {
        resource_id: Ulid,
        date: NaiveDate,
        bounds: TimeWindow,
    },
}

/// Column order assumed by `INSERT INTO bookings VALUES (...)` without a column list.
const BOOKING_COLUMNS: [&str; 6] = ["resource_id", "title", "description", "date", "start_time", "end_time"];
const RESOURCE_COLUMNS: [&str; 5] = ["name", "type", "capacity", "location", "features"];

fn parse_err(e: ParserError) -> SqlError {
    SqlError::Parse(e.to_string())
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    if let Some(cmd) = parse_update_statement(&dialect, sql)? {
        return Ok(cmd);
    }
    let stmts = Parser::parse_sql(&dialect, sql).map_err(parse_err)?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    match table.as_str() {
        "bookings" => {
            let row = insert_row(insert, &BOOKING_COLUMNS)?;
            let description = match row.get("description") {
                Some(e) => opt_text(e)?.unwrap_or_default(),
                None => String::new(),
            };
            Ok(Command::InsertBooking(BookingRequest {
                resource_id: parse_ulid(required(&row, "resource_id")?, "resource_id")?,
                title: text(required(&row, "title")?)?,
                description,
                date: parse_date_expr(required(&row, "date")?, "date")?,
                start: parse_time_expr(required(&row, "start_time")?, "start_time")?,
                end: parse_time_expr(required(&row, "end_time")?, "end_time")?,
            }))
        }
        "resources" => {
            let row = insert_row(insert, &RESOURCE_COLUMNS)?;
            Ok(Command::InsertResource(ResourceSpec {
                name: text(required(&row, "name")?)?,
                kind: parse_enum(required(&row, "type")?, "type")?,
                capacity: match row.get("capacity") {
                    Some(e) => parse_capacity(e)?,
                    None => None,
                },
                location: text(required(&row, "location")?)?,
                features: match row.get("features") {
                    Some(e) => parse_features(e)?,
                    None => Vec::new(),
                },
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// The single VALUES row keyed by column name. Without an explicit column
/// list, values are matched positionally against `defaults`.
fn insert_row(insert: &ast::Insert, defaults: &[&str]) -> Result<HashMap<String, Expr>, SqlError> {
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = if insert.columns.is_empty() {
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if let Some(unknown) = columns.iter().find(|c| !defaults.contains(&c.as_str())) {
        return Err(SqlError::UnknownColumn(unknown.clone()));
    }
    if values.len() != columns.len() {
        return Err(SqlError::Parse(format!(
            "{} values for {} columns",
            values.len(),
            columns.len()
        )));
    }
    Ok(columns.into_iter().zip(values).collect())
}

fn required<'a>(row: &'a HashMap<String, Expr>, column: &'static str) -> Result<&'a Expr, SqlError> {
    row.get(column).ok_or(SqlError::MissingColumn(column))
}

// ── UPDATE ────────────────────────────────────────────────────

/// `UPDATE <table> SET <assignments> [WHERE <expr>]`, driven token by token.
/// Returns `None` when `sql` is not an UPDATE.
fn parse_update_statement(dialect: &PostgreSqlDialect, sql: &str) -> Result<Option<Command>, SqlError> {
    let mut parser = Parser::new(dialect).try_with_sql(sql).map_err(parse_err)?;
    if !parser.parse_keyword(Keyword::UPDATE) {
        return Ok(None);
    }
    let table = parser.parse_table_and_joins().map_err(parse_err)?;
    parser.expect_keyword(Keyword::SET).map_err(parse_err)?;
    let assignments = parser
        .parse_comma_separated(Parser::parse_assignment)
        .map_err(parse_err)?;
    let selection = if parser.parse_keyword(Keyword::WHERE) {
        Some(parser.parse_expr().map_err(parse_err)?)
    } else {
        None
    };
    parser.consume_token(&Token::SemiColon);
    parser.expect_token(&Token::EOF).map_err(parse_err)?;

    let table = table_factor_name(&table.relation)?;
    parse_update(&table, &assignments, selection.as_ref()).map(Some)
}

fn parse_update(
    table: &str,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
) -> Result<Command, SqlError> {
    let id = extract_where_id(selection)?;
    let mut set: Vec<(String, &Expr)> = Vec::with_capacity(assignments.len());
    for a in assignments {
        let column = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name)
                .ok_or_else(|| SqlError::Parse("empty column name".into()))?,
            _ => return Err(SqlError::Unsupported("tuple assignment".into())),
        };
        set.push((column, &a.value));
    }

    match table {
        "bookings" => match set.as_slice() {
            [(column, value)] if column == "status" => Ok(Command::UpdateBookingStatus {
                id,
                status: parse_enum(value, "status")?,
            }),
            _ => Err(SqlError::Unsupported("only status can be set on bookings".into())),
        },
        "resources" => {
            if set.iter().any(|(c, _)| c == "status") {
                return match set.as_slice() {
                    [(_, value)] => Ok(Command::UpdateResourceStatus {
                        id,
                        status: parse_enum(value, "status")?,
                    }),
                    _ => Err(SqlError::Unsupported(
                        "status cannot be combined with other columns".into(),
                    )),
                };
            }
            let mut patch = ResourcePatch::default();
            for (column, value) in set {
                match column.as_str() {
                    "name" => patch.name = Some(text(value)?),
                    "type" => patch.kind = Some(parse_enum(value, "type")?),
                    "capacity" => patch.capacity = Some(parse_capacity(value)?),
                    "location" => patch.location = Some(text(value)?),
                    "features" => patch.features = Some(parse_features(value)?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::UpdateResource { id, patch })
        }
        _ => Err(SqlError::UnknownTable(table.to_string())),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(delete.selection.as_ref())?;
    match table.as_str() {
        "bookings" => Ok(Command::DeleteBooking { id }),
        "resources" => Ok(Command::DeleteResource { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut predicates = Vec::new();
    if let Some(selection) = &select.selection {
        collect_predicates(selection, &mut predicates)?;
    }

    match table.as_str() {
        "bookings" => {
            let mut id = None;
            let mut filter = BookingFilter::default();
            for (column, op, value) in predicates {
                expect_eq(&column, &op)?;
                match column.as_str() {
                    "id" => id = Some(parse_ulid(value, "id")?),
                    "status" => filter.status = Some(parse_enum(value, "status")?),
                    "search" => filter.search = Some(text(value)?),
                    "resource_id" => filter.resource_id = Some(parse_ulid(value, "resource_id")?),
                    "date" => filter.date = Some(parse_date_expr(value, "date")?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::SelectBookings { id, filter })
        }
        "resources" => {
            let mut id = None;
            let mut filter = ResourceFilter::default();
            for (column, op, value) in predicates {
                expect_eq(&column, &op)?;
                match column.as_str() {
                    "id" => id = Some(parse_ulid(value, "id")?),
                    "type" => filter.kind = Some(parse_enum(value, "type")?),
                    "status" => filter.status = Some(parse_enum(value, "status")?),
                    "search" => filter.search = Some(text(value)?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::SelectResources { id, filter })
        }
        "availability" => {
            let (mut resource_id, mut date, mut start, mut end) = (None, None, None, None);
            for (column, op, value) in predicates {
                match (column.as_str(), op) {
                    ("resource_id", BinaryOperator::Eq) => {
                        resource_id = Some(parse_ulid(value, "resource_id")?)
                    }
                    ("date", BinaryOperator::Eq) => date = Some(parse_date_expr(value, "date")?),
                    ("start", BinaryOperator::GtEq) => start = Some(parse_time_expr(value, "start")?),
                    ("end", BinaryOperator::LtEq) => end = Some(parse_time_expr(value, "end")?),
                    (other, op) => {
                        return Err(SqlError::Unsupported(format!("availability filter {other} {op}")));
                    }
                }
            }
            let start = start.ok_or(SqlError::MissingFilter("start"))?;
            let end = end.ok_or(SqlError::MissingFilter("end"))?;
            let bounds = TimeWindow::checked(start, end).ok_or_else(|| SqlError::BadValue {
                column: "end".into(),
                reason: "must be after start".into(),
            })?;
            Ok(Command::SelectAvailability {
                resource_id: resource_id.ok_or(SqlError::MissingFilter("resource_id"))?,
                date: date.ok_or(SqlError::MissingFilter("date"))?,
                bounds,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten an AND-chain of `column <op> value` comparisons.
fn collect_predicates<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, BinaryOperator, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_predicates(left, out)?;
            collect_predicates(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("predicate {expr}")))?;
            out.push((column, op.clone(), right));
            Ok(())
        }
        Expr::Nested(inner) => collect_predicates(inner, out),
        other => Err(SqlError::Unsupported(format!("predicate {other}"))),
    }
}

fn expect_eq(column: &str, op: &BinaryOperator) -> Result<(), SqlError> {
    match op {
        BinaryOperator::Eq => Ok(()),
        other => Err(SqlError::Unsupported(format!("filter {column} {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: Option<&Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right, "id"),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// String or numeric literal as text. `NULL` is `None`.
fn opt_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(Some(s.clone())),
        Some(Value::Null) => Ok(None),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn text(expr: &Expr) -> Result<String, SqlError> {
    opt_text(expr)?.ok_or_else(|| SqlError::Parse("unexpected NULL".into()))
}

fn bad_value(column: &str, reason: impl Into<String>) -> SqlError {
    SqlError::BadValue {
        column: column.to_string(),
        reason: reason.into(),
    }
}

fn parse_ulid(expr: &Expr, column: &str) -> Result<Ulid, SqlError> {
    let s = text(expr)?;
    Ulid::from_string(&s).map_err(|e| bad_value(column, format!("bad id {s:?}: {e}")))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(expr: &Expr, column: &str) -> Result<T, SqlError> {
    text(expr)?.parse().map_err(|e: String| bad_value(column, e))
}

fn parse_date_expr(expr: &Expr, column: &str) -> Result<NaiveDate, SqlError> {
    parse_date(&text(expr)?).map_err(|e| bad_value(column, e))
}

fn parse_time_expr(expr: &Expr, column: &str) -> Result<NaiveTime, SqlError> {
    parse_time(&text(expr)?).map_err(|e| bad_value(column, e))
}

fn parse_capacity(expr: &Expr) -> Result<Option<u32>, SqlError> {
    match opt_text(expr)? {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| bad_value("capacity", format!("{s:?}: {e}"))),
    }
}

/// Comma-separated feature list. `NULL` or `''` is empty.
fn parse_features(expr: &Expr) -> Result<Vec<String>, SqlError> {
    Ok(opt_text(expr)?
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default())
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    BadValue { column: String, reason: String },
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(msg) => write!(f, "parse error: {msg}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(what) => write!(f, "unsupported: {what}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::MissingColumn(c) => write!(f, "missing column: {c}"),
            SqlError::MissingFilter(c) => write!(f, "missing WHERE filter: {c}"),
            SqlError::BadValue { column, reason } => write!(f, "invalid {column}: {reason}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const RID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn rid() -> Ulid {
        Ulid::from_string(RID).unwrap()
    }

    #[test]
    fn parse_insert_booking_with_columns() {
        let sql = format!(
            "INSERT INTO bookings (resource_id, title, description, date, start_time, end_time) \
             VALUES ('{RID}', 'Advanced Algorithms', 'Week 3', '2024-07-22', '09:00', '11:00')"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertBooking(BookingRequest {
                resource_id: rid(),
                title: "Advanced Algorithms".into(),
                description: "Week 3".into(),
                date: parse_date("2024-07-22").unwrap(),
                start: parse_time("09:00").unwrap(),
                end: parse_time("11:00").unwrap(),
            })
        );
    }

    #[test]
    fn parse_insert_booking_columns_any_order_description_optional() {
        let sql = format!(
            "INSERT INTO bookings (title, end_time, start_time, date, resource_id) \
             VALUES ('Study', '12:00:00', '11:00', '2024-07-22', '{RID}')"
        );
        let Command::InsertBooking(req) = parse_sql(&sql).unwrap() else {
            panic!("expected InsertBooking");
        };
        assert_eq!(req.description, "");
        assert_eq!(req.end, parse_time("12:00").unwrap());
    }

    #[test]
    fn parse_insert_booking_positional() {
        let sql = format!("INSERT INTO bookings VALUES ('{RID}', 'T', NULL, '2024-07-22', '09:00', '10:00')");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::InsertBooking(_)));
    }

    #[test]
    fn parse_insert_booking_bad_values() {
        let bad_date = format!(
            "INSERT INTO bookings (resource_id, title, date, start_time, end_time) \
             VALUES ('{RID}', 'T', '22/07/2024', '09:00', '10:00')"
        );
        assert!(matches!(parse_sql(&bad_date), Err(SqlError::BadValue { column, .. }) if column == "date"));

        let missing = "INSERT INTO bookings (title) VALUES ('T')";
        assert_eq!(parse_sql(missing), Err(SqlError::MissingColumn("resource_id")));

        let bad_id = "INSERT INTO bookings (resource_id, title, date, start_time, end_time) \
                      VALUES ('nope', 'T', '2024-07-22', '09:00', '10:00')";
        assert!(matches!(parse_sql(bad_id), Err(SqlError::BadValue { .. })));
    }

    #[test]
    fn parse_insert_rejects_columns_outside_the_table() {
        let sql = format!(
            "INSERT INTO bookings (resource_id, title, date, start_time, end_time, status, requester_id) \
             VALUES ('{RID}', 'T', '2024-07-22', '09:00', '10:00', 'approved', 'admin-1')"
        );
        assert_eq!(parse_sql(&sql), Err(SqlError::UnknownColumn("status".into())));

        let sql = "INSERT INTO resources (name, type, location, status) \
                   VALUES ('Lab X', 'lab', 'Building B', 'maintenance')";
        assert_eq!(parse_sql(sql), Err(SqlError::UnknownColumn("status".into())));
    }

    #[test]
    fn parse_insert_resource() {
        let sql = "INSERT INTO resources (name, type, capacity, location, features) \
                   VALUES ('Physics Lab', 'lab', 25, 'Building C', 'Fume hood, Sinks,')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::InsertResource(ResourceSpec {
                name: "Physics Lab".into(),
                kind: ResourceType::Lab,
                capacity: Some(25),
                location: "Building C".into(),
                features: vec!["Fume hood".into(), "Sinks".into()],
            })
        );
    }

    #[test]
    fn parse_insert_resource_null_capacity() {
        let sql = "INSERT INTO resources (name, type, capacity, location) \
                   VALUES ('Projector 3', 'projector', NULL, 'AV Room')";
        let Command::InsertResource(spec) = parse_sql(sql).unwrap() else {
            panic!("expected InsertResource");
        };
        assert_eq!(spec.capacity, None);
        assert!(spec.features.is_empty());

        let bad = "INSERT INTO resources (name, type, location) VALUES ('x', 'spaceship', 'y')";
        assert!(matches!(parse_sql(bad), Err(SqlError::BadValue { column, .. }) if column == "type"));
    }

    #[test]
    fn parse_update_booking_status() {
        let sql = format!("UPDATE bookings SET status = 'approved' WHERE id = '{RID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateBookingStatus { id: rid(), status: BookingStatus::Approved }
        );
        let other = format!("UPDATE bookings SET title = 'x' WHERE id = '{RID}'");
        assert!(matches!(parse_sql(&other), Err(SqlError::Unsupported(_))));
        let no_id = "UPDATE bookings SET status = 'approved'";
        assert_eq!(parse_sql(no_id), Err(SqlError::MissingFilter("id")));
    }

    #[test]
    fn parse_update_resource_status_vs_patch() {
        let sql = format!("UPDATE resources SET status = 'maintenance' WHERE id = '{RID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateResourceStatus { id: rid(), status: ResourceStatus::Maintenance }
        );

        let sql = format!("UPDATE resources SET name = 'Hall B', capacity = NULL WHERE id = '{RID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateResource {
                id: rid(),
                patch: ResourcePatch {
                    name: Some("Hall B".into()),
                    capacity: Some(None),
                    ..Default::default()
                },
            }
        );

        let mixed = format!("UPDATE resources SET status = 'in-use', name = 'x' WHERE id = '{RID}'");
        assert!(matches!(parse_sql(&mixed), Err(SqlError::Unsupported(_))));
        let unknown = format!("UPDATE resources SET colour = 'red' WHERE id = '{RID}'");
        assert_eq!(parse_sql(&unknown), Err(SqlError::UnknownColumn("colour".into())));
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(
            parse_sql(&format!("DELETE FROM bookings WHERE id = '{RID}'")).unwrap(),
            Command::DeleteBooking { id: rid() }
        );
        assert_eq!(
            parse_sql(&format!("DELETE FROM resources WHERE id = '{RID}'")).unwrap(),
            Command::DeleteResource { id: rid() }
        );
    }

    #[test]
    fn parse_select_bookings_filters() {
        assert_eq!(
            parse_sql("SELECT * FROM bookings").unwrap(),
            Command::SelectBookings { id: None, filter: BookingFilter::default() }
        );
        let sql = format!(
            "SELECT * FROM bookings WHERE status = 'pending' AND search = 'chen' \
             AND resource_id = '{RID}' AND date = '2024-07-22'"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectBookings {
                id: None,
                filter: BookingFilter {
                    status: Some(BookingStatus::Pending),
                    search: Some("chen".into()),
                    resource_id: Some(rid()),
                    date: Some(parse_date("2024-07-22").unwrap()),
                },
            }
        );
        let by_id = format!("SELECT * FROM bookings WHERE id = '{RID}'");
        assert!(matches!(parse_sql(&by_id).unwrap(), Command::SelectBookings { id: Some(_), .. }));
        let range = "SELECT * FROM bookings WHERE date > '2024-07-22'";
        assert!(matches!(parse_sql(range), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_resources_filters() {
        let sql = "SELECT * FROM resources WHERE type = 'event-space' AND status = 'available' AND search = 'center'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectResources {
                id: None,
                filter: ResourceFilter {
                    kind: Some(ResourceType::EventSpace),
                    status: Some(ResourceStatus::Available),
                    search: Some("center".into()),
                },
            }
        );
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            "SELECT * FROM availability WHERE resource_id = '{RID}' AND date = '2024-07-22' \
             AND start >= '08:00' AND \"end\" <= '18:00'"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailability {
                resource_id: rid(),
                date: parse_date("2024-07-22").unwrap(),
                bounds: TimeWindow::new(parse_time("08:00").unwrap(), parse_time("18:00").unwrap()),
            }
        );

        let missing = format!("SELECT * FROM availability WHERE resource_id = '{RID}' AND date = '2024-07-22'");
        assert_eq!(parse_sql(&missing), Err(SqlError::MissingFilter("start")));

        let reversed = format!(
            "SELECT * FROM availability WHERE resource_id = '{RID}' AND date = '2024-07-22' \
             AND start >= '18:00' AND \"end\" <= '08:00'"
        );
        assert!(matches!(parse_sql(&reversed), Err(SqlError::BadValue { .. })));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert_eq!(
            parse_sql("SELECT * FROM holds"),
            Err(SqlError::UnknownTable("holds".into()))
        );
    }

    #[test]
    fn parse_garbage_errors() {
        assert!(matches!(parse_sql("BOOK ME A ROOM"), Err(SqlError::Parse(_))));
        assert_eq!(parse_sql(""), Err(SqlError::Empty));
    }
}

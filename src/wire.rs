use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::DirectoryAuthSource;
use crate::engine::{Engine, EngineError};
use crate::identity::PrincipalDirectory;
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};

pub struct ReservoHandler {
    engine: Arc<Engine>,
    directory: Arc<PrincipalDirectory>,
    query_parser: Arc<ReservoQueryParser>,
}

impl ReservoHandler {
    pub fn new(engine: Arc<Engine>, directory: Arc<PrincipalDirectory>) -> Self {
        Self {
            engine,
            directory,
            query_parser: Arc::new(ReservoQueryParser),
        }
    }

    /// The principal behind this connection. The startup handler already
    /// checked the password; this maps the login to its directory entry.
    fn resolve_principal<C: ClientInfo>(&self, client: &C) -> PgWireResult<Principal> {
        let login = client.metadata().get("user").cloned().unwrap_or_default();
        self.directory.principal_for(&login).ok_or_else(|| {
            metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
            user_error("28000", format!("unknown user: {login}"))
        })
    }

    async fn run(&self, principal: &Principal, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(principal, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, principal: &Principal, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertBooking(request) => {
                let booking = engine
                    .create_booking(principal, request)
                    .await
                    .map_err(engine_err)?;
                Ok(booking_rows(vec![booking]))
            }
            Command::UpdateBookingStatus { id, status } => {
                let booking = engine
                    .transition_booking(principal, id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(booking_rows(vec![booking]))
            }
            Command::DeleteBooking { id } => {
                engine.withdraw_booking(principal, id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectBookings { id: Some(id), filter } => {
                let booking = engine.get_booking(principal, id).map_err(engine_err)?;
                let rows = if filter.matches(&booking) { vec![booking] } else { vec![] };
                Ok(booking_rows(rows))
            }
            Command::SelectBookings { id: None, filter } => {
                let bookings = engine.list_bookings(principal, &filter).map_err(engine_err)?;
                Ok(booking_rows(bookings))
            }
            Command::InsertResource(spec) => {
                let resource = engine
                    .create_resource(principal, spec)
                    .await
                    .map_err(engine_err)?;
                Ok(resource_rows(vec![resource]))
            }
            Command::UpdateResourceStatus { id, status } => {
                let resource = engine
                    .set_resource_status(principal, id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(resource_rows(vec![resource]))
            }
            Command::UpdateResource { id, patch } => {
                let resource = engine
                    .update_resource(principal, id, patch)
                    .await
                    .map_err(engine_err)?;
                Ok(resource_rows(vec![resource]))
            }
            Command::DeleteResource { id } => {
                engine.delete_resource(principal, id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectResources { id: Some(id), filter } => {
                let resource = engine.get_resource(id).map_err(engine_err)?;
                let rows = if filter.matches(&resource) { vec![resource] } else { vec![] };
                Ok(resource_rows(rows))
            }
            Command::SelectResources { id: None, filter } => {
                let resources = engine.list_resources(&filter).map_err(engine_err)?;
                Ok(resource_rows(resources))
            }
            Command::SelectAvailability {
                resource_id,
                date,
                bounds,
            } => {
                let windows = engine
                    .free_windows(resource_id, date, bounds)
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let rid = resource_id.to_string();
                let day = date.to_string();
                let rows: Vec<PgWireResult<_>> = windows
                    .into_iter()
                    .map(|w| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&rid)?;
                        encoder.encode_field(&day)?;
                        encoder.encode_field(&format_time(w.start))?;
                        encoder.encode_field(&format_time(w.end))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

// ── Row schemas ──────────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn booking_schema() -> Vec<FieldInfo> {
    [
        "id",
        "resource_id",
        "title",
        "description",
        "date",
        "start_time",
        "end_time",
        "status",
        "requester_id",
        "requester_name",
        "requester_role",
        "created_at",
    ]
    .into_iter()
    .map(text_field)
    .collect()
}

fn resource_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("name"),
        text_field("type"),
        FieldInfo::new("capacity".into(), None, None, Type::INT4, FieldFormat::Text),
        text_field("location"),
        text_field("status"),
        text_field("features"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    ["resource_id", "date", "start", "end"]
        .into_iter()
        .map(text_field)
        .collect()
}

fn booking_rows(bookings: Vec<Booking>) -> Response {
    let schema = Arc::new(booking_schema());
    let rows: Vec<PgWireResult<_>> = bookings
        .into_iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.resource_id.to_string())?;
            encoder.encode_field(&b.title)?;
            encoder.encode_field(&b.description)?;
            encoder.encode_field(&b.date.to_string())?;
            encoder.encode_field(&format_time(b.window.start))?;
            encoder.encode_field(&format_time(b.window.end))?;
            encoder.encode_field(&b.status.as_str().to_string())?;
            encoder.encode_field(&b.requester_id)?;
            encoder.encode_field(&b.requester_name)?;
            encoder.encode_field(&b.requester_role.as_str().to_string())?;
            encoder.encode_field(&format_ms(b.created_at))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn resource_rows(resources: Vec<Resource>) -> Response {
    let schema = Arc::new(resource_schema());
    let rows: Vec<PgWireResult<_>> = resources
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.name)?;
            encoder.encode_field(&r.kind.as_str().to_string())?;
            encoder.encode_field(&r.capacity.map(|c| c as i32))?;
            encoder.encode_field(&r.location)?;
            encoder.encode_field(&r.status.as_str().to_string())?;
            encoder.encode_field(&r.features.join(","))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// Result columns for a statement that has not been bound yet.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let words: Vec<String> = sql
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .map(|w| w.trim_matches('"').to_lowercase())
        .collect();
    if words.first().map(String::as_str) == Some("delete") {
        return vec![];
    }
    let table = words
        .windows(2)
        .find(|pair| matches!(pair[0].as_str(), "from" | "into" | "update"))
        .map(|pair| pair[1].as_str());
    match table {
        Some("bookings") => booking_schema(),
        Some("resources") => resource_schema(),
        Some("availability") => availability_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for ReservoHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let principal = self.resolve_principal(client)?;
        Ok(vec![self.run(&principal, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct ReservoQueryParser;

#[async_trait]
impl QueryParser for ReservoQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for ReservoHandler {
    type Statement = String;
    type QueryParser = ReservoQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let principal = self.resolve_principal(client)?;
        let sql = substitute_params(portal);
        self.run(&principal, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Every `$N` placeholder outside single-quoted literals, in order.
fn placeholders(sql: &str) -> Vec<(usize, usize, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[start + 1..i].parse::<usize>() {
                    found.push((start, i, n));
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// Highest `$N` placeholder in `sql`.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, _, n)| n).max().unwrap_or(0)
}

/// Replace each `$N` with the N-th bound value as a quoted literal, in one
/// pass. Bound text is never rescanned.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    for (start, end, n) in placeholders(sql) {
        let Some(param) = n.checked_sub(1).and_then(|i| params.get(i)) else {
            continue;
        };
        out.push_str(&sql[copied..start]);
        match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            None => out.push_str("NULL"),
        }
        copied = end;
    }
    out.push_str(&sql[copied..]);
    out
}

fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

// ── Factory ──────────────────────────────────────────────────────

pub struct ReservoFactory {
    handler: Arc<ReservoHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<DirectoryAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl ReservoFactory {
    pub fn new(engine: Arc<Engine>, directory: Arc<PrincipalDirectory>) -> Self {
        let auth_source = DirectoryAuthSource::new(directory.clone());
        Self {
            handler: Arc::new(ReservoHandler::new(engine, directory)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for ReservoFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    directory: Arc<PrincipalDirectory>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = ReservoFactory::new(engine, directory);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// Stable SQLSTATE for each engine error kind.
pub fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Forbidden { .. } => "42501",
        EngineError::NotFound(_) => "P0002",
        EngineError::SlotConflict(_) => "23P01",
        EngineError::InvalidTransition { .. } => "55000",
        EngineError::ResourceUnavailable { .. } => "55006",
        EngineError::InvalidInput { .. } => "22023",
        EngineError::ResourceInUse { .. } => "2BP01",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match &e {
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn(_) => "42703",
        SqlError::BadValue { .. } => "22023",
        _ => "42601",
    };
    user_error(code, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(schema: &[FieldInfo]) -> Vec<String> {
        schema.iter().map(|f| f.name().to_string()).collect()
    }

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM bookings"), 0);
        assert_eq!(count_params("UPDATE bookings SET status = $2 WHERE id = $1"), 2);
        assert_eq!(count_params("SELECT $10, $3"), 10);
        assert_eq!(count_params("SELECT * FROM bookings WHERE search = '$9' AND id = $1"), 1);
    }

    #[test]
    fn bind_params_is_single_pass() {
        let sql = "INSERT INTO bookings (title, description) VALUES ($1, $2)";
        let bound = bind_params(sql, &[Some("Fee $2 per seat"), Some("it's $1")]);
        assert_eq!(
            bound,
            "INSERT INTO bookings (title, description) VALUES ('Fee $2 per seat', 'it''s $1')"
        );

        let bound = bind_params("SELECT $1, $10, '$1'", &[
            Some("a"), None, None, None, None, None, None, None, None, Some("j"),
        ]);
        assert_eq!(bound, "SELECT 'a', 'j', '$1'");

        let nulls: [Option<&str>; 1] = [None];
        assert_eq!(bind_params("SELECT $1, $2", &nulls), "SELECT NULL, $2");
    }

    #[test]
    fn result_schema_by_target_table() {
        assert_eq!(names(&result_schema("SELECT * FROM bookings WHERE id = $1"))[0], "id");
        assert_eq!(result_schema("select * from \"bookings\"").len(), 12);
        assert_eq!(result_schema("INSERT INTO resources(name, type) VALUES ($1, $2)").len(), 7);
        assert_eq!(result_schema("UPDATE resources SET status = $1 WHERE id = $2").len(), 7);
        assert_eq!(
            names(&result_schema("SELECT * FROM availability WHERE resource_id = $1")),
            ["resource_id", "date", "start", "end"]
        );
        assert!(result_schema("DELETE FROM bookings WHERE id = $1").is_empty());
    }

    #[test]
    fn every_error_kind_has_a_distinct_sqlstate() {
        use crate::policy::Action;
        use ulid::Ulid;

        let id = Ulid::new();
        let errors = [
            EngineError::Forbidden { role: Role::Student, action: Action::CreateResource },
            EngineError::NotFound(id),
            EngineError::SlotConflict(id),
            EngineError::InvalidTransition {
                id,
                from: BookingStatus::Approved,
                to: BookingStatus::Rejected,
            },
            EngineError::ResourceUnavailable { id, status: ResourceStatus::Maintenance },
            EngineError::invalid("title", "empty"),
            EngineError::ResourceInUse { id, booking: id },
            EngineError::LimitExceeded("x"),
            EngineError::WalError("disk".into()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(sqlstate).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(sqlstate(&EngineError::SlotConflict(id)), "23P01");
    }
}

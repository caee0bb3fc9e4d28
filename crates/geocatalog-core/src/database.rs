//! Database gateway for PostGIS catalog tables.
//!
//! [`DatabaseGateway`] is the only place that opens database connections.
//! Every operation is a self-contained unit: connect, act, commit or roll
//! back, close. Reads are best-effort (a server-reported error is logged and
//! yields an empty result); writes return their failure as a value so the
//! caller decides whether it is fatal.

use std::fmt;

use log::{debug, error, warn};
use postgres::types::ToSql;
use postgres::{Client, IsolationLevel, NoTls, Row, Transaction};

use crate::error::{DatabaseError, Result};
use crate::sql;
use crate::types::FieldDescriptor;

/// Connection parameters for the catalog database.
///
/// Both connection strings are derived on demand. Absent credentials are left
/// out entirely rather than written as empty quoted values.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    host: String,
    database: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
}

impl ConnectionDescriptor {
    /// Port used when none is configured.
    pub const DEFAULT_PORT: u16 = 5432;

    /// Creates a descriptor for `database` on `host` with the default port and
    /// no credentials.
    #[must_use]
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            port: Self::DEFAULT_PORT,
            user: None,
            password: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the user name.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Database host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Database port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// User name, if configured.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Key/value connection string for the `postgres` driver.
    ///
    /// # Examples
    ///
    /// ```
    /// use geocatalog_core::database::ConnectionDescriptor;
    ///
    /// let descriptor = ConnectionDescriptor::new("localhost", "gis");
    /// assert_eq!(
    ///     descriptor.connection_string(),
    ///     "dbname='gis' host='localhost' port=5432"
    /// );
    /// ```
    #[must_use]
    pub fn connection_string(&self) -> String {
        let mut cfg = format!(
            "dbname={} host={} port={}",
            quote_param(&self.database),
            quote_param(&self.host),
            self.port
        );
        self.push_credentials(&mut cfg);
        cfg
    }

    /// `PG:` connection string understood by GDAL/OGR raster and vector I/O.
    ///
    /// # Examples
    ///
    /// ```
    /// use geocatalog_core::database::ConnectionDescriptor;
    ///
    /// let descriptor = ConnectionDescriptor::new("db", "gis").with_user("loader");
    /// assert_eq!(
    ///     descriptor.gdal_connection_string(),
    ///     "PG:host='db' port=5432 dbname='gis' user='loader'"
    /// );
    /// ```
    #[must_use]
    pub fn gdal_connection_string(&self) -> String {
        let mut cfg = format!(
            "PG:host={} port={} dbname={}",
            quote_param(&self.host),
            self.port,
            quote_param(&self.database)
        );
        self.push_credentials(&mut cfg);
        cfg
    }

    fn push_credentials(&self, cfg: &mut String) {
        if let Some(user) = &self.user {
            cfg.push_str(&format!(" user={}", quote_param(user)));
        }
        if let Some(password) = &self.password {
            cfg.push_str(&format!(" password={}", quote_param(password)));
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Quotes a libpq key/value parameter value.
fn quote_param(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// How [`DatabaseGateway::execute_command`] runs a statement.
#[derive(Debug, Clone, Copy, Default)]
pub enum CommandMode {
    /// Inside a transaction with the server's default isolation level.
    #[default]
    Transactional,
    /// Inside a transaction with an explicit isolation level.
    Isolated(IsolationLevel),
    /// Outside any transaction block. Required for `VACUUM`.
    Autocommit,
}

/// Single point of contact with the catalog database.
///
/// No connection is kept between calls.
#[derive(Debug, Clone)]
pub struct DatabaseGateway {
    descriptor: ConnectionDescriptor,
}

impl DatabaseGateway {
    /// Creates a gateway for the given connection parameters.
    #[must_use]
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self { descriptor }
    }

    /// The connection parameters in use.
    #[must_use]
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] on network or authentication
    /// failure.
    pub fn connect(&self) -> std::result::Result<Client, DatabaseError> {
        debug!(
            "Connecting to {}:{}/{}",
            self.descriptor.host, self.descriptor.port, self.descriptor.database
        );
        Client::connect(&self.descriptor.connection_string(), NoTls).map_err(|source| {
            DatabaseError::Connection {
                host: self.descriptor.host.clone(),
                database: self.descriptor.database.clone(),
                source,
            }
        })
    }

    /// Runs a read query and returns all rows.
    ///
    /// A server-reported error is logged and yields an empty result. The
    /// connection is closed before returning in every case.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened.
    pub fn execute_query(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> std::result::Result<Vec<Row>, DatabaseError> {
        let mut client = self.connect()?;
        let rows = match client.query(query, params) {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Query failed: {}", DatabaseError::command(&err));
                Vec::new()
            },
        };
        Ok(rows)
    }

    /// Executes a command and commits it.
    ///
    /// On failure the transaction is rolled back and the server's message is
    /// returned as [`DatabaseError::Command`].
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened,
    /// or [`DatabaseError::Command`] if the statement fails.
    pub fn execute_command(
        &self,
        command: &str,
        mode: CommandMode,
    ) -> std::result::Result<(), DatabaseError> {
        let mut client = self.connect()?;
        debug!("Executing command ({mode:?}): {}", abbreviate(command));

        let outcome = match mode {
            CommandMode::Autocommit => client.batch_execute(command),
            CommandMode::Transactional => commit_batch(client.transaction(), command),
            CommandMode::Isolated(level) => commit_batch(
                client.build_transaction().isolation_level(level).start(),
                command,
            ),
        };

        outcome.map_err(|err| {
            let err = DatabaseError::command(&err);
            warn!("{err}");
            err
        })
    }

    /// Returns `true` if `schema.table` exists.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened.
    pub fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let rows = self.execute_query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2)",
            &[&schema, &table],
        )?;
        Ok(first_bool(&rows))
    }

    /// Returns `true` if the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened.
    pub fn schema_exists(&self, schema: &str) -> Result<bool> {
        let rows = self.execute_query(
            "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)",
            &[&schema],
        )?;
        Ok(first_bool(&rows))
    }

    /// Returns `true` if `schema.table` has a column named `column`, compared
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened.
    pub fn column_exists(&self, schema: &str, table: &str, column: &str) -> Result<bool> {
        let rows = self.execute_query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 AND UPPER(column_name) = UPPER($3))",
            &[&schema, &table, &column],
        )?;
        Ok(first_bool(&rows))
    }

    /// Column names of `schema.table` in ordinal order.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened.
    pub fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let rows = self.execute_query(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &[&schema, &table],
        )?;
        Ok(strings(&rows))
    }

    /// Number of rows in `schema.table`, or `None` if it cannot be counted.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names, or
    /// [`DatabaseError::Connection`] if no connection can be opened.
    pub fn record_count(&self, schema: &str, table: &str) -> Result<Option<i64>> {
        let rows = self.execute_query(&sql::count_rows(schema, table)?, &[])?;
        Ok(rows.first().and_then(|row| row.try_get::<_, i64>(0).ok()))
    }

    /// Creates `schema.table` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names, or a [`DatabaseError`].
    pub fn create_table(&self, schema: &str, table: &str, fields: &FieldDescriptor) -> Result<()> {
        let command = sql::create_table(schema, table, fields)?;
        self.execute_command(&command, CommandMode::default())?;
        Ok(())
    }

    /// Drops `schema.table` if it exists.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names, or a [`DatabaseError`].
    pub fn drop_table(&self, schema: &str, table: &str) -> Result<()> {
        self.execute_command(&sql::drop_table(schema, table)?, CommandMode::default())?;
        Ok(())
    }

    /// Drops and recreates `schema.table`. Existing rows are discarded.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names, or a [`DatabaseError`].
    pub fn create_or_replace_table(
        &self,
        schema: &str,
        table: &str,
        fields: &FieldDescriptor,
    ) -> Result<()> {
        self.drop_table(schema, table)?;
        self.create_table(schema, table, fields)
    }

    /// Creates the schema if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names, or a [`DatabaseError`].
    pub fn create_schema(&self, schema: &str) -> Result<()> {
        self.execute_command(&sql::create_schema(schema)?, CommandMode::default())?;
        Ok(())
    }

    /// Drops the schema and everything in it.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names, or a [`DatabaseError`].
    pub fn drop_schema(&self, schema: &str) -> Result<()> {
        self.execute_command(&sql::drop_schema(schema)?, CommandMode::default())?;
        Ok(())
    }

    /// Distinct schema names that own tables, optionally filtered by a
    /// PostgreSQL regular expression.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened.
    pub fn list_schemas(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let rows = match pattern {
            Some(pattern) => self.execute_query(
                "SELECT DISTINCT table_schema::text FROM information_schema.tables \
                 WHERE table_schema ~ $1 ORDER BY 1",
                &[&pattern],
            )?,
            None => self.execute_query(
                "SELECT DISTINCT table_schema::text FROM information_schema.tables ORDER BY 1",
                &[],
            )?,
        };
        Ok(strings(&rows))
    }

    /// Distinct table names in `schema`, optionally filtered by a PostgreSQL
    /// regular expression.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] if no connection can be opened.
    pub fn list_tables(&self, schema: &str, pattern: Option<&str>) -> Result<Vec<String>> {
        let rows = match pattern {
            Some(pattern) => self.execute_query(
                "SELECT DISTINCT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name ~ $2 ORDER BY 1",
                &[&schema, &pattern],
            )?,
            None => self.execute_query(
                "SELECT DISTINCT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 ORDER BY 1",
                &[&schema],
            )?,
        };
        Ok(strings(&rows))
    }

    /// Runs `VACUUM ANALYZE` on one table outside a transaction block.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid names, or a [`DatabaseError`].
    pub fn vacuum_table(&self, schema: &str, table: &str) -> Result<()> {
        self.execute_command(&sql::vacuum_table(schema, table)?, CommandMode::Autocommit)?;
        Ok(())
    }

    /// Vacuums every table in `schema` whose name contains `pattern`.
    ///
    /// Stops at the first table that fails and returns that failure; tables
    /// after it are not vacuumed. Returns the number of tables vacuumed.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn vacuum_all_tables(&self, schema: &str, pattern: Option<&str>) -> Result<usize> {
        let mut vacuumed = 0;
        for table in self.list_tables(schema, None)? {
            if pattern.is_some_and(|p| !table.contains(p)) {
                continue;
            }
            if let Err(err) = self.vacuum_table(schema, &table) {
                error!("VACUUM ERROR: {schema}.{table}");
                return Err(err);
            }
            vacuumed += 1;
        }
        Ok(vacuumed)
    }
}

fn commit_batch(
    transaction: std::result::Result<Transaction<'_>, postgres::Error>,
    command: &str,
) -> std::result::Result<(), postgres::Error> {
    let mut transaction = transaction?;
    transaction.batch_execute(command)?;
    transaction.commit()
}

fn first_bool(rows: &[Row]) -> bool {
    rows.first()
        .and_then(|row| row.try_get::<_, bool>(0).ok())
        .unwrap_or(false)
}

fn strings(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.try_get::<_, String>(0).ok())
        .collect()
}

/// Shortens long statements (batched INSERTs) for log output.
fn abbreviate(command: &str) -> String {
    const MAX: usize = 200;
    let command = command.trim();
    match command.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}... ({} bytes)", &command[..idx], command.len()),
        None => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_without_credentials() {
        let descriptor = ConnectionDescriptor::new("localhost", "gis");
        let cfg = descriptor.connection_string();
        assert_eq!(cfg, "dbname='gis' host='localhost' port=5432");
        assert!(!cfg.contains("user="));
        assert!(!cfg.contains("password="));
    }

    #[test]
    fn test_connection_string_with_credentials() {
        let descriptor = ConnectionDescriptor::new("db.internal", "gis")
            .with_port(6543)
            .with_user("loader")
            .with_password("it's secret");
        assert_eq!(
            descriptor.connection_string(),
            "dbname='gis' host='db.internal' port=6543 user='loader' password='it\\'s secret'"
        );
        assert_eq!(
            descriptor.gdal_connection_string(),
            "PG:host='db.internal' port=6543 dbname='gis' user='loader' password='it\\'s secret'"
        );
    }

    #[test]
    fn test_gdal_connection_string_quotes_host() {
        let descriptor = ConnectionDescriptor::new("db host's", "gis");
        assert_eq!(
            descriptor.gdal_connection_string(),
            "PG:host='db host\\'s' port=5432 dbname='gis'"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let descriptor = ConnectionDescriptor::new("localhost", "gis").with_password("hunter2");
        let debug = format!("{descriptor:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_default_port() {
        assert_eq!(ConnectionDescriptor::new("h", "d").port(), 5432);
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("  SELECT 1 "), "SELECT 1");
        let long = "x".repeat(500);
        assert!(abbreviate(&long).ends_with("... (500 bytes)"));
    }

    #[test]
    fn test_lifecycle_rejects_invalid_names_without_connecting() {
        // Unroutable descriptor: reaching the network would fail with a
        // connection error instead of a validation error.
        let gateway = DatabaseGateway::new(ConnectionDescriptor::new("invalid.host.test", "gis"));
        let err = gateway.drop_table("imagery", "scenes; DROP").unwrap_err();
        assert!(matches!(err, crate::error::CatalogError::Validation(_)));
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let gateway =
            DatabaseGateway::new(ConnectionDescriptor::new("127.0.0.1", "gis").with_port(1));
        let err = gateway.execute_command("SELECT 1", CommandMode::default()).unwrap_err();
        assert!(matches!(err, DatabaseError::Connection { .. }));
        assert_eq!(err.command_message(), None);
    }
}

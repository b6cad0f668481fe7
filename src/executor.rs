use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::Batch;
use tracing::debug;

use crate::command::{Command, Kind};
use crate::response::{Response, Row};
use crate::store::Store;

/// Runs commands verbatim against the store and turns every outcome, including store failures,
/// into a [`Response`].
///
/// Each call opens its own connection, so it always observes the latest committed state, and any
/// write is committed before the call returns. Calls block on SQLite and must be run off the async
/// runtime's worker threads.
#[derive(Debug, Clone)]
pub struct Executor {
    store: Store,
}

impl Executor {
    pub fn new(store: Store) -> Executor {
        Executor { store }
    }

    pub fn execute(&self, command: &Command) -> Response {
        if command.is_blank() {
            return Response::Success;
        }

        match self.try_execute(command) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Command failed");
                Response::Failure(failure_message(e))
            }
        }
    }

    fn try_execute(&self, command: &Command) -> rusqlite::Result<Response> {
        let conn = self.store.connect()?;
        let kind = command.kind();

        {
            let mut batch = Batch::new(&conn, command.text());
            let mut stmt = match batch.next()? {
                Some(stmt) => stmt,
                // Nothing but comments.
                None => return Ok(Response::Success),
            };
            if batch.next()?.is_some() {
                return Err(rusqlite::Error::MultipleStatement);
            }

            if kind == Kind::Read {
                let columns = stmt.column_count();
                let rows = stmt
                    .query_map([], |row| Row::from_sql(row, columns))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                return Ok(Response::SuccessWithRows(rows));
            }

            // Step through to completion. Some statements that don't start with SELECT still
            // yield rows (PRAGMA, INSERT ... RETURNING).
            let mut rows = stmt.query([])?;
            while rows.next()?.is_some() {}
        }

        // A statement such as a bare BEGIN leaves a transaction open. Commit it rather than letting
        // it roll back when the connection is dropped.
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }

        Ok(Response::Success)
    }
}

// The store's own text only. rusqlite appends the statement and error offset to syntax errors,
// which clients don't expect.
fn failure_message(e: rusqlite::Error) -> String {
    match e {
        rusqlite::Error::SqlInputError { msg, .. } => msg,
        e => e.to_string(),
    }
}

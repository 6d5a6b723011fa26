//! Target database lifecycle on the administrative database.
//!
//! CREATE DATABASE and DROP DATABASE cannot run on a connection bound to the
//! database they act on, so every call here opens its own single connection
//! to the administrative database and closes it before returning.

use std::time::{Duration, Instant};

use sqlx::{Connection, PgConnection};
use tracing::{debug, error, info, warn};

use pgbranch_core::{defaults, EngineConfig, Error, Result, ServerConfig};

use crate::identifiers::quote_ident;
use crate::pool::connect_admin;

async fn close_quietly(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(
            subsystem = "clone",
            component = "cleanup",
            error = %e,
            "Admin connection did not close cleanly"
        );
    }
}

/// Create an empty database named `name`.
///
/// Any failure, including an existing database of that name, is reported as
/// [`Error::CreateDatabase`].
pub async fn create_database(
    server: &ServerConfig,
    config: &EngineConfig,
    name: &str,
) -> Result<()> {
    let start = Instant::now();
    let to_create_error = |message: String| Error::CreateDatabase {
        database: name.to_string(),
        message,
    };

    let mut conn = connect_admin(server, config)
        .await
        .map_err(|e| to_create_error(e.to_string()))?;

    let sql = format!("CREATE DATABASE {}", quote_ident(name));
    let created = sqlx::query(&sql).persistent(false).execute(&mut conn).await;
    close_quietly(conn).await;
    created.map_err(|e| to_create_error(e.to_string()))?;

    info!(
        subsystem = "clone",
        component = "cleanup",
        op = "create_database",
        db_name = name,
        duration_ms = start.elapsed().as_millis() as u64,
        "Created target database"
    );
    Ok(())
}

/// SQLSTATE for "database is being accessed by other users".
const OBJECT_IN_USE: &str = "55006";

fn is_object_in_use(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(OBJECT_IN_USE),
        _ => false,
    }
}

/// Run `DROP DATABASE IF EXISTS`, retrying while backends are still exiting.
///
/// A closed pool's server processes finish disconnecting asynchronously, so
/// a drop issued right after `PgPool::close` can still see them.
async fn drop_with_retry(
    conn: &mut PgConnection,
    name: &str,
) -> std::result::Result<(), sqlx::Error> {
    let sql = format!("DROP DATABASE IF EXISTS {}", quote_ident(name));
    let mut attempt = 1;
    loop {
        match sqlx::query(&sql).persistent(false).execute(&mut *conn).await {
            Ok(_) => return Ok(()),
            Err(e) if is_object_in_use(&e) && attempt < defaults::DROP_DATABASE_ATTEMPTS => {
                warn!(
                    subsystem = "clone",
                    component = "cleanup",
                    op = "drop_database",
                    db_name = name,
                    attempt,
                    "Database still in use, retrying drop"
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(defaults::DROP_DATABASE_RETRY_MS)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drop `name` if it exists.
///
/// Waits out connections that are still closing; a database held open by a
/// live client fails with [`Error::Cleanup`] once the retries run out.
pub async fn drop_database(
    server: &ServerConfig,
    config: &EngineConfig,
    name: &str,
) -> Result<()> {
    let to_cleanup_error = |message: String| Error::Cleanup {
        database: name.to_string(),
        message,
    };

    let mut conn = connect_admin(server, config)
        .await
        .map_err(|e| to_cleanup_error(e.to_string()))?;

    let dropped = drop_with_retry(&mut conn, name).await;
    close_quietly(conn).await;

    match dropped {
        Ok(_) => {
            info!(
                subsystem = "clone",
                component = "cleanup",
                op = "drop_database",
                db_name = name,
                "Dropped target database"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                subsystem = "clone",
                component = "cleanup",
                op = "drop_database",
                db_name = name,
                error = %e,
                "Failed to drop target database"
            );
            Err(to_cleanup_error(e.to_string()))
        }
    }
}

/// Whether a database named `name` exists, checked on an open admin connection.
pub async fn database_exists(conn: &mut PgConnection, name: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(conn)
            .await
            .map_err(Error::Database)?;
    Ok(exists)
}

/// Open an admin connection just to run [`database_exists`].
pub async fn target_exists(
    server: &ServerConfig,
    config: &EngineConfig,
    name: &str,
) -> Result<bool> {
    let mut conn = connect_admin(server, config).await?;
    let exists = database_exists(&mut conn, name).await;
    close_quietly(conn).await;
    exists
}

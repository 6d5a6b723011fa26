//! Identifier validation and SQL quoting.
//!
//! Database names supplied by callers are validated before any connection is
//! opened. Names read back from the source catalog are arbitrary and always
//! go through [`quote_ident`] when spliced into DDL.

use pgbranch_core::defaults::MAX_IDENTIFIER_LEN;
use pgbranch_core::{CloneRequest, Error, Result};

/// Validate a database name supplied by a caller.
///
/// Database names must:
/// - Not be empty
/// - Not exceed 63 bytes (PostgreSQL identifier limit)
/// - Start with an ASCII letter or underscore
/// - Contain only ASCII letters, digits, underscores and hyphens
///
/// # Examples
///
/// ```
/// use pgbranch_db::validate_database_name;
///
/// assert!(validate_database_name("app_dev").is_ok());
/// assert!(validate_database_name("feature-123").is_ok());
/// assert!(validate_database_name("1app").is_err());
/// assert!(validate_database_name("").is_err());
/// ```
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Database name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "Database name exceeds {} character limit: {} characters",
            MAX_IDENTIFIER_LEN,
            name.len()
        )));
    }

    if let Some(first) = name.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "Database name must start with a letter or underscore, found: '{}'",
                first
            )));
        }
    }

    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '-' {
            return Err(Error::InvalidInput(format!(
                "Database name contains invalid character: '{}'. Only letters, digits, underscore and hyphen allowed",
                ch
            )));
        }
    }

    Ok(())
}

/// Validate a whole clone request before any connection is opened.
pub fn validate_request(request: &CloneRequest) -> Result<()> {
    validate_database_name(&request.source_database)?;
    validate_database_name(&request.target_database)?;

    if request.source_database == request.target_database {
        return Err(Error::InvalidInput(
            "Source and target database must differ".to_string(),
        ));
    }

    for option in &request.table_options {
        if option.schema.is_empty() || option.table.is_empty() {
            return Err(Error::InvalidInput(
                "Table option requires both schema and table".to_string(),
            ));
        }
        if let Some(limit) = option.row_limit {
            if limit <= 0 {
                return Err(Error::InvalidInput(format!(
                    "Row limit for {}.{} must be positive, got {}",
                    option.schema, option.table, limit
                )));
            }
        }
    }

    Ok(())
}

/// Quote an identifier: `users` becomes `"users"`, embedded quotes doubled.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal: `it's` becomes `'it''s'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `"schema"."name"`
pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

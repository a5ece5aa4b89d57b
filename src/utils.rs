// ABOUTME: Utility functions for identifier validation, name inflection and retries
// ABOUTME: Shared by the backends, the column selector and the CLI

use anyhow::{bail, Result};
use std::time::Duration;

/// Validate a table name typed on the command line
///
/// Identifiers must:
/// - Be 1-63 characters long
/// - Start with a letter (a-z, A-Z) or underscore (_)
/// - Contain only letters, digits (0-9), or underscores
///
/// # Arguments
///
/// * `identifier` - The table or column name to validate
///
/// # Returns
///
/// Returns `Ok(())` if the identifier is valid.
///
/// # Security
///
/// Only user-supplied names are held to this rule. Names read back from the
/// live schema can contain anything the engine allows and are quoted with
/// [`quote_identifier`] instead.
///
/// # Examples
///
/// ```
/// # use tsvio::utils::validate_identifier;
/// assert!(validate_identifier("users").is_ok());
/// assert!(validate_identifier("_private").is_ok());
/// assert!(validate_identifier("123abc").is_err());
/// assert!(validate_identifier("users\"; DROP TABLE users; --").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    if identifier.len() > 63 {
        bail!(
            "Identifier '{}' exceeds maximum length of 63 characters (got {})",
            sanitize_identifier(identifier),
            identifier.len()
        );
    }

    let mut chars = identifier.chars();
    if let Some(first_char) = chars.next() {
        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            bail!(
                "Identifier '{}' must start with a letter or underscore, not '{}'",
                sanitize_identifier(identifier),
                first_char
            );
        }
    }

    for (i, c) in identifier.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            bail!(
                "Identifier '{}' contains invalid character '{}' at position {}. \
                 Only letters, digits, and underscores are allowed",
                sanitize_identifier(identifier),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Quote a table or column name for SQL, doubling any embedded quote character
///
/// # Examples
///
/// ```
/// # use tsvio::utils::quote_identifier;
/// assert_eq!(quote_identifier("first-name", '"').unwrap(), "\"first-name\"");
/// assert_eq!(quote_identifier("a\"b", '"').unwrap(), "\"a\"\"b\"");
/// assert_eq!(quote_identifier("odd`name", '`').unwrap(), "`odd``name`");
/// assert!(quote_identifier("", '"').is_err());
/// ```
pub fn quote_identifier(name: &str, quote: char) -> Result<String> {
    if name.is_empty() {
        bail!("Identifier cannot be empty");
    }
    if name.contains('\0') {
        bail!(
            "Identifier '{}' contains a NUL character",
            sanitize_identifier(name)
        );
    }

    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push(quote);
    for c in name.chars() {
        if c == quote {
            quoted.push(quote);
        }
        quoted.push(c);
    }
    quoted.push(quote);
    Ok(quoted)
}

/// `ORDER BY` list sorting ascending on every column in turn
pub fn order_by_list(columns: &[String], quote: char) -> Result<String> {
    if columns.is_empty() {
        bail!("At least one ordering column is required");
    }
    Ok(columns
        .iter()
        .map(|c| quote_identifier(c, quote).map(|q| format!("{} ASC", q)))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to 100 characters so that
/// error messages and log lines stay readable.
///
/// # Examples
///
/// ```
/// # use tsvio::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Split a comma-separated option value into names
///
/// Entries are trimmed and empty entries dropped, so `" a, ,b "` yields
/// `["a", "b"]`.
///
/// # Examples
///
/// ```
/// # use tsvio::utils::split_name_list;
/// assert_eq!(split_name_list(" name, ,email "), vec!["name", "email"]);
/// assert!(split_name_list("").is_empty());
/// ```
pub fn split_name_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert a model-style name into a table name
///
/// `BlogPosts` and `blogPosts` become `blog_posts`; names that are already
/// lower snake case are returned unchanged. Dashes and spaces become
/// underscores.
///
/// # Examples
///
/// ```
/// # use tsvio::utils::underscore;
/// assert_eq!(underscore("BlogPosts"), "blog_posts");
/// assert_eq!(underscore("users"), "users");
/// ```
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    let chars: Vec<char> = name.trim().chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            prev = Some('_');
            continue;
        }
        if c.is_ascii_uppercase() {
            let next_is_lower = chars
                .get(i + 1)
                .map(|n| n.is_ascii_lowercase())
                .unwrap_or(false);
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                // "HTMLPage" -> "html_page"
                Some(p) if p.is_ascii_uppercase() => next_is_lower,
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }

    out
}

/// Retry a function with exponential backoff
///
/// Executes an async operation with automatic retry on failure. Each retry
/// doubles the delay.
///
/// # Arguments
///
/// * `operation` - Async function to retry
/// * `max_retries` - Maximum number of retry attempts (0 = just the initial attempt)
/// * `initial_delay` - Delay before first retry
///
/// # Returns
///
/// Returns the successful result or the last error after all retries exhausted.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        "Operation failed (attempt {}/{}), retrying in {:?}...",
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Operation failed after retries")))
}

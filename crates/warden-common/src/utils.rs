use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Generate a holder token unique to one acquisition attempt
///
/// Format: `<pid>-<unix millis>-<uuid>`. The random salt keeps two attempts from
/// the same process within the same millisecond distinct.
pub fn new_holder_token() -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        current_timestamp(),
        uuid::Uuid::new_v4().simple()
    )
}

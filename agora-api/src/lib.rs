use chrono::Utc;

mod auth;
mod comment;
mod db;
mod error;
mod post;
mod topic;
mod user;
mod vote;

pub use auth::*;
pub use comment::*;
pub use db::*;
pub use error::*;
pub use post::*;
pub use topic::*;
pub use user::*;
pub use vote::*;

pub use async_trait::async_trait;
pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Rejects strings postgres cannot store.
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Checks that a required field is present and storable.
///
/// Whitespace-only values count as missing.
pub fn validate_required(field: &'static str, s: &str) -> Result<(), Error> {
    if s.trim().is_empty() {
        return Err(Error::MissingField(String::from(field)));
    }
    validate_string(s)
}

pub fn validate_optional(s: &Option<String>) -> Result<(), Error> {
    match s {
        Some(s) => validate_string(s),
        None => Ok(()),
    }
}

fn is_blank(s: &Option<String>) -> bool {
    s.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_reject_blanks() {
        assert_eq!(
            validate_required("title", "  "),
            Err(Error::MissingField(String::from("title")))
        );
        assert_eq!(validate_required("title", "Hello"), Ok(()));
        assert_eq!(
            validate_required("title", "a\0b"),
            Err(Error::NullByteInString(String::from("a\0b")))
        );
    }

    #[test]
    fn optional_fields_only_check_null_bytes() {
        assert_eq!(validate_optional(&None), Ok(()));
        assert_eq!(validate_optional(&Some(String::new())), Ok(()));
        assert!(validate_optional(&Some(String::from("\0"))).is_err());
    }
}

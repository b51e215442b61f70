use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Missing required field {0}")]
    MissingField(String),

    #[error("Post must have either text or a link")]
    MissingContent,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("User with this email or username already exists")]
    UserAlreadyExists,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

impl Error {
    pub fn not_found(what: &str) -> Error {
        Error::NotFound(String::from(what))
    }

    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::MissingField(_) => StatusCode::BAD_REQUEST,
            Error::MissingContent => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials => StatusCode::BAD_REQUEST,
            // uniqueness violations are reported as plain bad requests
            Error::NameAlreadyUsed(_) => StatusCode::BAD_REQUEST,
            Error::UserAlreadyExists => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Configuration(msg) => json!({
                "message": format!("server configuration error: {msg}"),
                "type": "configuration",
                "setting": msg,
            }),
            Error::Unauthenticated => json!({
                "message": "authentication required",
                "type": "unauthenticated",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound(what) => json!({
                "message": format!("{what} not found"),
                "type": "not-found",
                "resource": what,
            }),
            Error::MissingField(field) => json!({
                "message": format!("missing required field {field}"),
                "type": "missing-field",
                "field": field,
            }),
            Error::MissingContent => json!({
                "message": "post must have a title, a topic, and either text or a link",
                "type": "missing-content",
            }),
            Error::InvalidCredentials => json!({
                "message": "invalid credentials",
                "type": "invalid-credentials",
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::UserAlreadyExists => json!({
                "message": "user with this email or username already exists",
                "type": "conflict-user",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| -> anyhow::Result<String> {
            Ok(String::from(
                data.get(name)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| anyhow!("error contents lack the {name:?} field"))?,
            ))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "configuration" => Error::Configuration(field("setting")?),
                "unauthenticated" => Error::Unauthenticated,
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound(field("resource")?),
                "missing-field" => Error::MissingField(field("field")?),
                "missing-content" => Error::MissingContent,
                "invalid-credentials" => Error::InvalidCredentials,
                "conflict-name" => Error::NameAlreadyUsed(field("name")?),
                "conflict-user" => Error::UserAlreadyExists,
                "null-byte" => Error::NullByteInString(field("string")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        use http::StatusCode;
        assert_eq!(
            Error::MissingField(String::from("name")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::NameAlreadyUsed(String::from("golang")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::not_found("post").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::PermissionDenied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::Configuration(String::from("ADMIN_TOKEN")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn parse_recovers_payload() {
        let err = Error::NotFound(String::from("parent comment"));
        assert_eq!(Error::parse(&err.contents()).unwrap(), err);
        let err = Error::Configuration(String::from("ADMIN_TOKEN"));
        assert_eq!(Error::parse(&err.contents()).unwrap(), err);
        assert!(Error::parse(br#"{"type":"nope"}"#).is_err());
    }
}

use agora_api::Error as ApiError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn unauthenticated() -> Error {
        Error::Api(ApiError::Unauthenticated)
    }

    pub fn permission_denied() -> Error {
        Error::Api(ApiError::PermissionDenied)
    }

    pub fn not_found(what: &str) -> Error {
        Error::Api(ApiError::not_found(what))
    }

    pub fn name_already_used(name: String) -> Error {
        Error::Api(ApiError::NameAlreadyUsed(name))
    }

    pub fn user_already_exists() -> Error {
        Error::Api(ApiError::UserAlreadyExists)
    }

    pub fn invalid_credentials() -> Error {
        Error::Api(ApiError::InvalidCredentials)
    }

    pub fn configuration(setting: &str) -> Error {
        Error::Api(ApiError::Configuration(String::from(setting)))
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let err = match self {
            Error::Anyhow(err) => {
                tracing::error!(?err, "internal server error");
                #[cfg(not(test))]
                let err =
                    ApiError::Unknown(String::from("Internal server error, see logs for details"));
                #[cfg(test)]
                let err = ApiError::Unknown(format!("Internal server error: {err:?}"));
                err
            }
            Error::Api(err @ ApiError::Configuration(_)) => {
                tracing::error!("refusing request: {err}");
                err
            }
            Error::Api(err) => {
                tracing::info!("returning error to client: {err}");
                err
            }
        };
        (
            err.status_code(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            err.contents(),
        )
            .into_response()
    }
}

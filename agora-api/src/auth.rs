use uuid::Uuid;

use crate::{validate_required, Error, UserSummary, STUB_UUID};

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NewSession {
    pub email: String,
    pub password: String,
}

impl NewSession {
    pub fn new(email: String, password: String) -> NewSession {
        NewSession { email, password }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_required("email", &self.email)?;
        validate_required("password", &self.password)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }

    pub fn generate() -> AuthToken {
        AuthToken(Uuid::new_v4())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoginResponse {
    pub token: AuthToken,
    pub user: UserSummary,
}

use crate::{validate_required, Comment, Error, PostView, Time, STUB_UUID};

use uuid::Uuid;

/// Shown in place of an author whose account no longer exists.
pub const DELETED_USER_PLACEHOLDER: &str = "[deleted]";

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub date: Time,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn new(username: String, email: String, password: String) -> NewUser {
        NewUser {
            username,
            email,
            password,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_required("username", &self.username)?;
        validate_required("email", &self.email)?;
        validate_required("password", &self.password)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Registered {
    pub message: String,
    pub user: UserSummary,
}

/// Everything a user published, as shown on their profile page
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Profile {
    pub user: User,
    /// Newest first
    pub posts: Vec<PostView>,
    /// Only the comments that were not replies to another comment, newest first
    pub comments: Vec<ProfileComment>,
}

/// A profile comment along with the title of the post it was left on
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProfileComment {
    #[serde(flatten)]
    pub comment: Comment,
    /// `None` if the post no longer exists
    pub post_title: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CleanupReport {
    pub comments: u64,
    pub posts: u64,
    pub topics: u64,
    pub sessions: u64,
    pub users: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_requires_every_field() {
        let mut u = NewUser::new(
            String::from("u1"),
            String::from("u1@example.org"),
            String::from("hunter2"),
        );
        assert_eq!(u.validate(), Ok(()));
        u.email = String::new();
        assert_eq!(
            u.validate(),
            Err(Error::MissingField(String::from("email")))
        );
    }

    #[test]
    fn missing_json_fields_deserialize_as_empty() {
        let u: NewUser = serde_json::from_str(r#"{"username":"u1"}"#).unwrap();
        assert_eq!(
            u.validate(),
            Err(Error::MissingField(String::from("email")))
        );
    }
}

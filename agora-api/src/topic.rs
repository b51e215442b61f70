use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::{validate_optional, validate_required, Error, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct TopicId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Topic {
    pub id: TopicId,
    /// Unique among all topics, compared exactly as stored
    pub name: String,
    pub description: Option<String>,
    pub creator: UserId,
    pub members: HashSet<UserId>,
    pub date: Time,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NewTopic {
    pub name: String,
    pub description: Option<String>,
}

impl NewTopic {
    pub fn new(name: String, description: Option<String>) -> NewTopic {
        NewTopic { name, description }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_required("name", &self.name)?;
        validate_optional(&self.description)?;
        Ok(())
    }

    /// The creator is always the first member, and the name is trimmed.
    pub fn into_topic(self, creator: UserId) -> Topic {
        Topic {
            id: TopicId(Uuid::new_v4()),
            name: self.name.trim().to_string(),
            description: self.description,
            creator,
            members: HashSet::from([creator]),
            date: Utc::now(),
        }
    }
}

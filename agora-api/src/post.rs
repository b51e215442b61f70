use chrono::Utc;
use uuid::Uuid;

use crate::{
    is_blank, validate_optional, validate_required, CommentId, Error, ThreadEntry, Time, TopicId,
    UserId, VoteSets,
};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub text: Option<String>,
    pub link: Option<String>,
    pub author: UserId,
    pub topic: TopicId,

    #[serde(flatten)]
    pub votes: VoteSets,

    /// Top-level comments, in reply order
    pub comments: Vec<CommentId>,

    pub date: Time,
}

impl Post {
    pub fn is_author(&self, user: UserId) -> bool {
        self.author == user
    }

    /// Only the author may edit or delete a post.
    pub fn check_author(&self, user: UserId) -> Result<(), Error> {
        if !self.is_author(user) {
            return Err(Error::PermissionDenied);
        }
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: PostPatch) {
        if let Some(text) = patch.text {
            self.text = text;
        }
        if let Some(link) = patch.link {
            self.link = link;
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NewPost {
    pub title: String,
    pub text: Option<String>,
    pub link: Option<String>,
    pub topic_name: String,
}

impl NewPost {
    pub fn new(
        title: String,
        text: Option<String>,
        link: Option<String>,
        topic_name: String,
    ) -> NewPost {
        NewPost {
            title,
            text,
            link,
            topic_name,
        }
    }

    /// Setting both `text` and `link` is allowed, and neither is checked for
    /// format.
    pub fn validate(&self) -> Result<(), Error> {
        validate_required("title", &self.title)?;
        validate_required("topic_name", &self.topic_name)?;
        if is_blank(&self.text) && is_blank(&self.link) {
            return Err(Error::MissingContent);
        }
        validate_optional(&self.text)?;
        validate_optional(&self.link)?;
        Ok(())
    }

    pub fn into_post(self, author: UserId, topic: TopicId) -> Post {
        Post {
            id: PostId(Uuid::new_v4()),
            title: self.title.trim().to_string(),
            text: self.text,
            link: self.link,
            author,
            topic,
            votes: VoteSets::default(),
            comments: Vec::new(),
            date: Utc::now(),
        }
    }
}

/// Absent fields are kept as they are, while fields explicitly set to `null`
/// are cleared.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PostPatch {
    #[serde(
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<Option<String>>,
    #[serde(
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub link: Option<Option<String>>,
}

/// Only called for keys present in the body, so `null` becomes `Some(None)`
fn present<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<String> as serde::Deserialize>::deserialize(d).map(Some)
}

impl PostPatch {
    pub fn validate(&self) -> Result<(), Error> {
        validate_optional(&self.text.clone().flatten())?;
        validate_optional(&self.link.clone().flatten())?;
        Ok(())
    }
}

/// A post along with the names of its author and topic, as listed
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
    pub topic_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub view: PostView,
    /// The whole comment forest, depth-first
    pub thread: Vec<ThreadEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostEdited {
    pub message: String,
    pub post: Post,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostDeleted {
    pub message: String,
    pub deleted_comments: u64,
}

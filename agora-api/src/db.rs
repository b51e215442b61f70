use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    AuthToken, CleanupReport, Comment, CommentId, Post, PostId, PostPatch, Time, Topic, TopicId,
    User, UserId, VoteSets, VoteUpdate,
};

/// Storage collaborator of the forum.
///
/// Every method touches at most one document, and updates are expressed so a
/// backend can apply each as a single atomic write. Operations spanning
/// several documents (creating a comment then linking it, deleting a post and
/// its comments) are sequenced by the caller on a best-effort basis.
///
/// Methods returning `bool` report whether the targeted document existed
/// (or, for creations, whether it was actually inserted).
#[async_trait]
pub trait Db: Send + Sync {
    async fn create_user(&self, user: User, password_hash: String) -> anyhow::Result<bool>;
    async fn find_user_by_id(&self, id: UserId) -> anyhow::Result<Option<User>>;
    async fn find_user_by_name_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>>;
    /// Returns the user along with their password hash
    async fn find_credentials(&self, email: &str) -> anyhow::Result<Option<(User, String)>>;
    async fn find_users(&self, ids: &[UserId]) -> anyhow::Result<HashMap<UserId, User>>;

    /// Also purges the sessions that have expired at `now`
    async fn create_session(
        &self,
        token: AuthToken,
        user: UserId,
        now: Time,
        expires_at: Time,
    ) -> anyhow::Result<()>;
    /// Only returns sessions that have not expired at `now`
    async fn recover_session(&self, token: AuthToken, now: Time)
        -> anyhow::Result<Option<UserId>>;
    async fn delete_session(&self, token: AuthToken) -> anyhow::Result<bool>;

    async fn find_topic_by_name(&self, name: &str) -> anyhow::Result<Option<Topic>>;
    async fn find_topics(&self, ids: &[TopicId]) -> anyhow::Result<HashMap<TopicId, Topic>>;
    /// Returns `false` without inserting if the name is already taken
    async fn create_topic(&self, topic: Topic) -> anyhow::Result<bool>;
    /// Sorted by name
    async fn list_topics(&self) -> anyhow::Result<Vec<Topic>>;

    async fn find_post_by_id(&self, id: PostId) -> anyhow::Result<Option<Post>>;
    async fn find_posts(&self, ids: &[PostId]) -> anyhow::Result<HashMap<PostId, Post>>;
    async fn create_post(&self, post: Post) -> anyhow::Result<()>;
    /// Applies the vote atomically and returns the resulting sets
    async fn update_post_vote_sets(
        &self,
        id: PostId,
        vote: VoteUpdate,
    ) -> anyhow::Result<Option<VoteSets>>;
    async fn update_post_fields(&self, id: PostId, patch: PostPatch)
        -> anyhow::Result<Option<Post>>;
    async fn delete_post(&self, id: PostId) -> anyhow::Result<bool>;
    /// Newest first
    async fn list_posts(&self) -> anyhow::Result<Vec<Post>>;
    /// Newest first
    async fn find_posts_by_topic(&self, topic: TopicId) -> anyhow::Result<Vec<Post>>;
    /// Newest first
    async fn find_posts_by_author(&self, author: UserId) -> anyhow::Result<Vec<Post>>;

    async fn find_comment_by_id(&self, id: CommentId) -> anyhow::Result<Option<Comment>>;
    async fn create_comment(&self, comment: Comment) -> anyhow::Result<()>;
    async fn append_child_to_comment(
        &self,
        parent: CommentId,
        child: CommentId,
    ) -> anyhow::Result<bool>;
    async fn append_top_level_comment_to_post(
        &self,
        post: PostId,
        comment: CommentId,
    ) -> anyhow::Result<bool>;
    /// Returns the number of deleted comments
    async fn delete_comments_by_post(&self, post: PostId) -> anyhow::Result<u64>;
    async fn find_comments_by_post(&self, post: PostId) -> anyhow::Result<Vec<Comment>>;
    /// Newest first
    async fn find_top_level_comments_by_author(
        &self,
        author: UserId,
    ) -> anyhow::Result<Vec<Comment>>;

    /// Deletes every document of every collection
    async fn cleanup(&self) -> anyhow::Result<CleanupReport>;
}

use std::collections::{BTreeMap, HashMap};

use agora_api::{
    async_trait, AuthToken, CleanupReport, Comment, CommentId, Db, Post, PostId, PostPatch, Time,
    Topic, TopicId, User, UserId, VoteSets, VoteUpdate,
};
use tokio::sync::Mutex;

/// In-memory store, holding every collection behind a single lock so each
/// operation is atomic.
#[derive(Debug, Default)]
pub struct MockDb(Mutex<Collections>);

#[derive(Debug, Default)]
struct Collections {
    users: BTreeMap<UserId, DbUser>,
    sessions: HashMap<AuthToken, Session>,
    topics: BTreeMap<TopicId, Topic>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
}

#[derive(Debug)]
struct DbUser {
    user: User,
    pass_hash: String,
}

#[derive(Debug)]
struct Session {
    user: UserId,
    expires_at: Time,
}

fn newest_first<T>(mut items: Vec<T>, date: impl Fn(&T) -> Time) -> Vec<T> {
    items.sort_by(|a, b| date(b).cmp(&date(a)));
    items
}

impl MockDb {
    pub fn new() -> MockDb {
        MockDb::default()
    }

    /// Return the current number of stored comments
    pub async fn test_num_comments(&self) -> usize {
        self.0.lock().await.comments.len()
    }

    /// Return the current number of sessions, expired ones included
    pub async fn test_num_sessions(&self) -> usize {
        self.0.lock().await.sessions.len()
    }

    /// Forget a user without touching what they published
    pub async fn test_remove_user(&self, id: UserId) -> bool {
        self.0.lock().await.users.remove(&id).is_some()
    }
}

#[async_trait]
impl Db for MockDb {
    async fn create_user(&self, user: User, password_hash: String) -> anyhow::Result<bool> {
        let mut c = self.0.lock().await;
        if c.users.values().any(|u| {
            u.user.id == user.id || u.user.username == user.username || u.user.email == user.email
        }) {
            return Ok(false);
        }
        c.users.insert(
            user.id,
            DbUser {
                user,
                pass_hash: password_hash,
            },
        );
        Ok(true)
    }

    async fn find_user_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.0.lock().await.users.get(&id).map(|u| u.user.clone()))
    }

    async fn find_user_by_name_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .0
            .lock()
            .await
            .users
            .values()
            .find(|u| u.user.username == username || u.user.email == email)
            .map(|u| u.user.clone()))
    }

    async fn find_credentials(&self, email: &str) -> anyhow::Result<Option<(User, String)>> {
        Ok(self
            .0
            .lock()
            .await
            .users
            .values()
            .find(|u| u.user.email == email)
            .map(|u| (u.user.clone(), u.pass_hash.clone())))
    }

    async fn find_users(&self, ids: &[UserId]) -> anyhow::Result<HashMap<UserId, User>> {
        let c = self.0.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| c.users.get(id))
            .map(|u| (u.user.id, u.user.clone()))
            .collect())
    }

    async fn create_session(
        &self,
        token: AuthToken,
        user: UserId,
        now: Time,
        expires_at: Time,
    ) -> anyhow::Result<()> {
        let mut c = self.0.lock().await;
        c.sessions.retain(|_, s| s.expires_at > now);
        c.sessions.insert(token, Session { user, expires_at });
        Ok(())
    }

    async fn recover_session(
        &self,
        token: AuthToken,
        now: Time,
    ) -> anyhow::Result<Option<UserId>> {
        Ok(self
            .0
            .lock()
            .await
            .sessions
            .get(&token)
            .filter(|s| s.expires_at > now)
            .map(|s| s.user))
    }

    async fn delete_session(&self, token: AuthToken) -> anyhow::Result<bool> {
        Ok(self.0.lock().await.sessions.remove(&token).is_some())
    }

    async fn find_topic_by_name(&self, name: &str) -> anyhow::Result<Option<Topic>> {
        Ok(self
            .0
            .lock()
            .await
            .topics
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn find_topics(&self, ids: &[TopicId]) -> anyhow::Result<HashMap<TopicId, Topic>> {
        let c = self.0.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| c.topics.get(id))
            .map(|t| (t.id, t.clone()))
            .collect())
    }

    async fn create_topic(&self, topic: Topic) -> anyhow::Result<bool> {
        let mut c = self.0.lock().await;
        if c.topics.values().any(|t| t.name == topic.name) {
            return Ok(false);
        }
        c.topics.insert(topic.id, topic);
        Ok(true)
    }

    async fn list_topics(&self) -> anyhow::Result<Vec<Topic>> {
        let mut topics = self
            .0
            .lock()
            .await
            .topics
            .values()
            .cloned()
            .collect::<Vec<_>>();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    async fn find_post_by_id(&self, id: PostId) -> anyhow::Result<Option<Post>> {
        Ok(self.0.lock().await.posts.get(&id).cloned())
    }

    async fn find_posts(&self, ids: &[PostId]) -> anyhow::Result<HashMap<PostId, Post>> {
        let c = self.0.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| c.posts.get(id))
            .map(|p| (p.id, p.clone()))
            .collect())
    }

    async fn create_post(&self, post: Post) -> anyhow::Result<()> {
        let mut c = self.0.lock().await;
        anyhow::ensure!(
            !c.posts.contains_key(&post.id),
            "post {:?} already exists",
            post.id
        );
        c.posts.insert(post.id, post);
        Ok(())
    }

    async fn update_post_vote_sets(
        &self,
        id: PostId,
        vote: VoteUpdate,
    ) -> anyhow::Result<Option<VoteSets>> {
        Ok(self.0.lock().await.posts.get_mut(&id).map(|p| {
            p.votes.apply(vote);
            p.votes.clone()
        }))
    }

    async fn update_post_fields(
        &self,
        id: PostId,
        patch: PostPatch,
    ) -> anyhow::Result<Option<Post>> {
        Ok(self.0.lock().await.posts.get_mut(&id).map(|p| {
            p.apply_patch(patch);
            p.clone()
        }))
    }

    async fn delete_post(&self, id: PostId) -> anyhow::Result<bool> {
        Ok(self.0.lock().await.posts.remove(&id).is_some())
    }

    async fn list_posts(&self) -> anyhow::Result<Vec<Post>> {
        let posts = self.0.lock().await.posts.values().cloned().collect();
        Ok(newest_first(posts, |p: &Post| p.date))
    }

    async fn find_posts_by_topic(&self, topic: TopicId) -> anyhow::Result<Vec<Post>> {
        let posts = self
            .0
            .lock()
            .await
            .posts
            .values()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect();
        Ok(newest_first(posts, |p: &Post| p.date))
    }

    async fn find_posts_by_author(&self, author: UserId) -> anyhow::Result<Vec<Post>> {
        let posts = self
            .0
            .lock()
            .await
            .posts
            .values()
            .filter(|p| p.author == author)
            .cloned()
            .collect();
        Ok(newest_first(posts, |p: &Post| p.date))
    }

    async fn find_comment_by_id(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.0.lock().await.comments.get(&id).cloned())
    }

    async fn create_comment(&self, comment: Comment) -> anyhow::Result<()> {
        let mut c = self.0.lock().await;
        anyhow::ensure!(
            !c.comments.contains_key(&comment.id),
            "comment {:?} already exists",
            comment.id
        );
        c.comments.insert(comment.id, comment);
        Ok(())
    }

    async fn append_child_to_comment(
        &self,
        parent: CommentId,
        child: CommentId,
    ) -> anyhow::Result<bool> {
        Ok(match self.0.lock().await.comments.get_mut(&parent) {
            Some(p) => {
                p.children.push(child);
                true
            }
            None => false,
        })
    }

    async fn append_top_level_comment_to_post(
        &self,
        post: PostId,
        comment: CommentId,
    ) -> anyhow::Result<bool> {
        Ok(match self.0.lock().await.posts.get_mut(&post) {
            Some(p) => {
                p.comments.push(comment);
                true
            }
            None => false,
        })
    }

    async fn delete_comments_by_post(&self, post: PostId) -> anyhow::Result<u64> {
        let mut c = self.0.lock().await;
        let before = c.comments.len();
        c.comments.retain(|_, comm| comm.post != post);
        Ok((before - c.comments.len()) as u64)
    }

    async fn find_comments_by_post(&self, post: PostId) -> anyhow::Result<Vec<Comment>> {
        Ok(self
            .0
            .lock()
            .await
            .comments
            .values()
            .filter(|c| c.post == post)
            .cloned()
            .collect())
    }

    async fn find_top_level_comments_by_author(
        &self,
        author: UserId,
    ) -> anyhow::Result<Vec<Comment>> {
        let comments = self
            .0
            .lock()
            .await
            .comments
            .values()
            .filter(|c| c.author == author && c.parent.is_none())
            .cloned()
            .collect();
        Ok(newest_first(comments, |c: &Comment| c.date))
    }

    async fn cleanup(&self) -> anyhow::Result<CleanupReport> {
        let mut c = self.0.lock().await;
        let report = CleanupReport {
            comments: c.comments.len() as u64,
            posts: c.posts.len() as u64,
            topics: c.topics.len() as u64,
            sessions: c.sessions.len() as u64,
            users: c.users.len() as u64,
        };
        *c = Collections::default();
        Ok(report)
    }
}

use std::collections::HashMap;

use agora_api::{
    async_trait, AuthToken, CleanupReport, Comment, CommentId, Db, Post, PostId, PostPatch, Time,
    Topic, TopicId, User, UserId, Uuid, VoteSet, VoteSets, VoteUpdate,
};
use anyhow::Context;
use futures::TryStreamExt;
use sqlx::{postgres::PgRow, Row};

/// `Db` backed by postgres, one row per document with id lists stored as
/// `UUID[]` columns
#[derive(Clone, Debug)]
pub struct PostgresDb {
    pool: sqlx::PgPool,
}

impl PostgresDb {
    pub fn new(pool: sqlx::PgPool) -> PostgresDb {
        PostgresDb { pool }
    }
}

fn vote_column(set: VoteSet) -> &'static str {
    match set {
        VoteSet::Likes => "likes",
        VoteSet::Dislikes => "dislikes",
    }
}

fn ids<T>(row: &PgRow, field: &str, wrap: impl Fn(Uuid) -> T) -> anyhow::Result<Vec<T>> {
    Ok(row
        .try_get::<Vec<Uuid>, _>(field)
        .with_context(|| format!("retrieving the {field} field"))?
        .into_iter()
        .map(wrap)
        .collect())
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: UserId(row.try_get("id").context("retrieving the id field")?),
        username: row
            .try_get("username")
            .context("retrieving the username field")?,
        email: row.try_get("email").context("retrieving the email field")?,
        date: row.try_get("date").context("retrieving the date field")?,
    })
}

fn topic_from_row(row: &PgRow) -> anyhow::Result<Topic> {
    Ok(Topic {
        id: TopicId(row.try_get("id").context("retrieving the id field")?),
        name: row.try_get("name").context("retrieving the name field")?,
        description: row
            .try_get("description")
            .context("retrieving the description field")?,
        creator: UserId(
            row.try_get("creator_id")
                .context("retrieving the creator_id field")?,
        ),
        members: ids(row, "members", UserId)?.into_iter().collect(),
        date: row.try_get("date").context("retrieving the date field")?,
    })
}

fn vote_sets_from_row(row: &PgRow) -> anyhow::Result<VoteSets> {
    Ok(VoteSets {
        likes: ids(row, "likes", UserId)?.into_iter().collect(),
        dislikes: ids(row, "dislikes", UserId)?.into_iter().collect(),
    })
}

fn post_from_row(row: &PgRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: PostId(row.try_get("id").context("retrieving the id field")?),
        title: row.try_get("title").context("retrieving the title field")?,
        text: row.try_get("text").context("retrieving the text field")?,
        link: row.try_get("link").context("retrieving the link field")?,
        author: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        topic: TopicId(
            row.try_get("topic_id")
                .context("retrieving the topic_id field")?,
        ),
        votes: vote_sets_from_row(row)?,
        comments: ids(row, "comments", CommentId)?,
        date: row.try_get("date").context("retrieving the date field")?,
    })
}

fn comment_from_row(row: &PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        text: row.try_get("text").context("retrieving the text field")?,
        author: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        post: PostId(
            row.try_get("post_id")
                .context("retrieving the post_id field")?,
        ),
        parent: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
        children: ids(row, "children", CommentId)?,
        date: row.try_get("date").context("retrieving the date field")?,
    })
}

const USER_FIELDS: &str = "id, username, email, date";
const TOPIC_FIELDS: &str = "id, name, description, creator_id, members, date";
const POST_FIELDS: &str =
    "id, title, text, link, author_id, topic_id, likes, dislikes, comments, date";
const COMMENT_FIELDS: &str = "id, text, author_id, post_id, parent_id, children, date";

impl PostgresDb {
    async fn fetch_posts(&self, filter: &str, bind: Option<Uuid>) -> anyhow::Result<Vec<Post>> {
        let query = format!("SELECT {POST_FIELDS} FROM posts {filter} ORDER BY date DESC, id");
        let mut query = sqlx::query(&query);
        if let Some(bind) = bind {
            query = query.bind(bind);
        }
        let mut rows = query.fetch(&self.pool);
        let mut posts = Vec::new();
        while let Some(row) = rows.try_next().await.context("querying posts table")? {
            posts.push(post_from_row(&row)?);
        }
        Ok(posts)
    }

    async fn fetch_comments(&self, filter: &str, bind: Uuid) -> anyhow::Result<Vec<Comment>> {
        let query = format!("SELECT {COMMENT_FIELDS} FROM comments {filter}");
        let mut rows = sqlx::query(&query).bind(bind).fetch(&self.pool);
        let mut comments = Vec::new();
        while let Some(row) = rows.try_next().await.context("querying comments table")? {
            comments.push(comment_from_row(&row)?);
        }
        Ok(comments)
    }
}

#[async_trait]
impl Db for PostgresDb {
    async fn create_user(&self, user: User, password_hash: String) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "
                INSERT INTO users (id, username, email, password_hash, date)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT DO NOTHING
            ",
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.email)
        .bind(password_hash)
        .bind(user.date)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting user {:?}", user.id))?;
        Ok(res.rows_affected() == 1)
    }

    async fn find_user_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        sqlx::query(&format!("SELECT {USER_FIELDS} FROM users WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("querying user {id:?}"))?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn find_user_by_name_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        sqlx::query(&format!(
            "SELECT {USER_FIELDS} FROM users WHERE username = $1 OR email = $2 LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("querying users by name or email")?
        .map(|row| user_from_row(&row))
        .transpose()
    }

    async fn find_credentials(&self, email: &str) -> anyhow::Result<Option<(User, String)>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_FIELDS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("querying user credentials")?;
        match row {
            None => Ok(None),
            Some(row) => Ok(Some((
                user_from_row(&row)?,
                row.try_get("password_hash")
                    .context("retrieving the password_hash field")?,
            ))),
        }
    }

    async fn find_users(&self, ids: &[UserId]) -> anyhow::Result<HashMap<UserId, User>> {
        let ids = ids.iter().map(|id| id.0).collect::<Vec<_>>();
        let query = format!("SELECT {USER_FIELDS} FROM users WHERE id = ANY($1)");
        let mut rows = sqlx::query(&query)
        .bind(ids)
        .fetch(&self.pool);
        let mut users = HashMap::new();
        while let Some(row) = rows.try_next().await.context("querying users table")? {
            let user = user_from_row(&row)?;
            users.insert(user.id, user);
        }
        Ok(users)
    }

    async fn create_session(
        &self,
        token: AuthToken,
        user: UserId,
        now: Time,
        expires_at: Time,
    ) -> anyhow::Result<()> {
        let purged = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("purging expired sessions")?;
        if purged.rows_affected() > 0 {
            tracing::debug!(purged = purged.rows_affected(), "purged expired sessions");
        }
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token.0)
            .bind(user.0)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("inserting session for user {user:?}"))?;
        Ok(())
    }

    async fn recover_session(
        &self,
        token: AuthToken,
        now: Time,
    ) -> anyhow::Result<Option<UserId>> {
        sqlx::query("SELECT user_id FROM sessions WHERE id = $1 AND expires_at > $2")
            .bind(token.0)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .context("querying sessions table")?
            .map(|row| -> anyhow::Result<UserId> {
                Ok(UserId(
                    row.try_get("user_id")
                        .context("retrieving the user_id field")?,
                ))
            })
            .transpose()
    }

    async fn delete_session(&self, token: AuthToken) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(token.0)
            .execute(&self.pool)
            .await
            .context("deleting session")?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_topic_by_name(&self, name: &str) -> anyhow::Result<Option<Topic>> {
        sqlx::query(&format!("SELECT {TOPIC_FIELDS} FROM topics WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("querying topic {name:?}"))?
            .map(|row| topic_from_row(&row))
            .transpose()
    }

    async fn find_topics(&self, ids: &[TopicId]) -> anyhow::Result<HashMap<TopicId, Topic>> {
        let ids = ids.iter().map(|id| id.0).collect::<Vec<_>>();
        let query = format!("SELECT {TOPIC_FIELDS} FROM topics WHERE id = ANY($1)");
        let mut rows = sqlx::query(&query)
        .bind(ids)
        .fetch(&self.pool);
        let mut topics = HashMap::new();
        while let Some(row) = rows.try_next().await.context("querying topics table")? {
            let topic = topic_from_row(&row)?;
            topics.insert(topic.id, topic);
        }
        Ok(topics)
    }

    async fn create_topic(&self, topic: Topic) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "
                INSERT INTO topics (id, name, description, creator_id, members, date)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT DO NOTHING
            ",
        )
        .bind(topic.id.0)
        .bind(&topic.name)
        .bind(&topic.description)
        .bind(topic.creator.0)
        .bind(topic.members.iter().map(|u| u.0).collect::<Vec<_>>())
        .bind(topic.date)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting topic {:?}", topic.id))?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_topics(&self) -> anyhow::Result<Vec<Topic>> {
        let query = format!("SELECT {TOPIC_FIELDS} FROM topics ORDER BY name");
        let mut rows = sqlx::query(&query).fetch(&self.pool);
        let mut topics = Vec::new();
        while let Some(row) = rows.try_next().await.context("querying topics table")? {
            topics.push(topic_from_row(&row)?);
        }
        Ok(topics)
    }

    async fn find_post_by_id(&self, id: PostId) -> anyhow::Result<Option<Post>> {
        sqlx::query(&format!("SELECT {POST_FIELDS} FROM posts WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("querying post {id:?}"))?
            .map(|row| post_from_row(&row))
            .transpose()
    }

    async fn find_posts(&self, ids: &[PostId]) -> anyhow::Result<HashMap<PostId, Post>> {
        let ids = ids.iter().map(|id| id.0).collect::<Vec<_>>();
        let query = format!("SELECT {POST_FIELDS} FROM posts WHERE id = ANY($1)");
        let mut rows = sqlx::query(&query)
        .bind(ids)
        .fetch(&self.pool);
        let mut posts = HashMap::new();
        while let Some(row) = rows.try_next().await.context("querying posts table")? {
            let post = post_from_row(&row)?;
            posts.insert(post.id, post);
        }
        Ok(posts)
    }

    async fn create_post(&self, post: Post) -> anyhow::Result<()> {
        sqlx::query(
            "
                INSERT INTO posts
                    (id, title, text, link, author_id, topic_id, likes, dislikes, comments, date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(post.id.0)
        .bind(&post.title)
        .bind(&post.text)
        .bind(&post.link)
        .bind(post.author.0)
        .bind(post.topic.0)
        .bind(post.votes.likes.iter().map(|u| u.0).collect::<Vec<_>>())
        .bind(post.votes.dislikes.iter().map(|u| u.0).collect::<Vec<_>>())
        .bind(post.comments.iter().map(|c| c.0).collect::<Vec<_>>())
        .bind(post.date)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting post {:?}", post.id))?;
        Ok(())
    }

    async fn update_post_vote_sets(
        &self,
        id: PostId,
        vote: VoteUpdate,
    ) -> anyhow::Result<Option<VoteSets>> {
        // every SET expression sees the row as it was before the update
        let pull = vote_column(vote.pull_from);
        let toggle = vote_column(vote.toggle_in);
        let query = format!(
            "
                UPDATE posts SET
                    {pull} = array_remove({pull}, $2),
                    {toggle} = CASE
                        WHEN $2 = ANY({toggle}) THEN array_remove({toggle}, $2)
                        ELSE array_append({toggle}, $2)
                    END
                WHERE id = $1
                RETURNING likes, dislikes
            "
        );
        sqlx::query(&query)
            .bind(id.0)
            .bind(vote.user.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("updating vote sets of post {id:?}"))?
            .map(|row| vote_sets_from_row(&row))
            .transpose()
    }

    async fn update_post_fields(
        &self,
        id: PostId,
        patch: PostPatch,
    ) -> anyhow::Result<Option<Post>> {
        sqlx::query(&format!(
            "
                UPDATE posts SET
                    text = CASE WHEN $2 THEN $3 ELSE text END,
                    link = CASE WHEN $4 THEN $5 ELSE link END
                WHERE id = $1
                RETURNING {POST_FIELDS}
            "
        ))
        .bind(id.0)
        .bind(patch.text.is_some())
        .bind(patch.text.flatten())
        .bind(patch.link.is_some())
        .bind(patch.link.flatten())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("updating post {id:?}"))?
        .map(|row| post_from_row(&row))
        .transpose()
    }

    async fn delete_post(&self, id: PostId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting post {id:?}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_posts(&self) -> anyhow::Result<Vec<Post>> {
        self.fetch_posts("", None).await
    }

    async fn find_posts_by_topic(&self, topic: TopicId) -> anyhow::Result<Vec<Post>> {
        self.fetch_posts("WHERE topic_id = $1", Some(topic.0))
            .await
            .with_context(|| format!("fetching posts of topic {topic:?}"))
    }

    async fn find_posts_by_author(&self, author: UserId) -> anyhow::Result<Vec<Post>> {
        self.fetch_posts("WHERE author_id = $1", Some(author.0))
            .await
            .with_context(|| format!("fetching posts of user {author:?}"))
    }

    async fn find_comment_by_id(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query(&format!(
            "SELECT {COMMENT_FIELDS} FROM comments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("querying comment {id:?}"))?
        .map(|row| comment_from_row(&row))
        .transpose()
    }

    async fn create_comment(&self, comment: Comment) -> anyhow::Result<()> {
        sqlx::query(
            "
                INSERT INTO comments (id, text, author_id, post_id, parent_id, children, date)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(comment.id.0)
        .bind(&comment.text)
        .bind(comment.author.0)
        .bind(comment.post.0)
        .bind(comment.parent.map(|p| p.0))
        .bind(comment.children.iter().map(|c| c.0).collect::<Vec<_>>())
        .bind(comment.date)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting comment {:?}", comment.id))?;
        Ok(())
    }

    async fn append_child_to_comment(
        &self,
        parent: CommentId,
        child: CommentId,
    ) -> anyhow::Result<bool> {
        let res =
            sqlx::query("UPDATE comments SET children = array_append(children, $2) WHERE id = $1")
                .bind(parent.0)
                .bind(child.0)
                .execute(&self.pool)
                .await
                .with_context(|| format!("appending {child:?} to the replies of {parent:?}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn append_top_level_comment_to_post(
        &self,
        post: PostId,
        comment: CommentId,
    ) -> anyhow::Result<bool> {
        let res =
            sqlx::query("UPDATE posts SET comments = array_append(comments, $2) WHERE id = $1")
                .bind(post.0)
                .bind(comment.0)
                .execute(&self.pool)
                .await
                .with_context(|| format!("appending {comment:?} to the comments of {post:?}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_comments_by_post(&self, post: PostId) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(post.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting comments of post {post:?}"))?;
        Ok(res.rows_affected())
    }

    async fn find_comments_by_post(&self, post: PostId) -> anyhow::Result<Vec<Comment>> {
        self.fetch_comments("WHERE post_id = $1", post.0)
            .await
            .with_context(|| format!("fetching comments of post {post:?}"))
    }

    async fn find_top_level_comments_by_author(
        &self,
        author: UserId,
    ) -> anyhow::Result<Vec<Comment>> {
        self.fetch_comments(
            "WHERE author_id = $1 AND parent_id IS NULL ORDER BY date DESC, id",
            author.0,
        )
        .await
        .with_context(|| format!("fetching comments of user {author:?}"))
    }

    async fn cleanup(&self) -> anyhow::Result<CleanupReport> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;
        let mut report = CleanupReport::default();
        for (table, count) in [
            ("comments", &mut report.comments),
            ("posts", &mut report.posts),
            ("topics", &mut report.topics),
            ("sessions", &mut report.sessions),
            ("users", &mut report.users),
        ] {
            *count = sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("emptying the {table} table"))?
                .rows_affected();
        }
        tx.commit().await.context("committing cleanup")?;
        Ok(report)
    }
}

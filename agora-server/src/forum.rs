//! Forum operations, sequencing the store calls behind each route.

use std::collections::{HashMap, HashSet};

use agora_api::{
    flatten_thread, AuthToken, CleanupReport, Comment, Db, LoginResponse, NewComment, NewPost,
    NewSession, NewTopic, NewUser, Post, PostDetail, PostId, PostPatch, PostView, Profile,
    ProfileComment, ReplyTarget, Topic, User, UserId, UserSummary, Uuid, VoteAction, VoteTally,
    VoteUpdate,
};
use anyhow::Context;
use chrono::Utc;

use crate::{Error, SessionLength};

#[cfg(not(test))]
pub const BCRYPT_COST: u32 = 10;
// bcrypt's minimum, tests would crawl otherwise
#[cfg(test)]
pub const BCRYPT_COST: u32 = 4;

pub async fn register(db: &dyn Db, data: NewUser) -> Result<UserSummary, Error> {
    data.validate()?;
    if db
        .find_user_by_name_or_email(&data.username, &data.email)
        .await
        .context("checking for an existing user")?
        .is_some()
    {
        return Err(Error::user_already_exists());
    }
    let password = data.password.clone();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .context("joining password hashing task")?
        .context("hashing password")?;
    let user = User {
        id: UserId(Uuid::new_v4()),
        username: data.username,
        email: data.email,
        date: Utc::now(),
    };
    let summary = user.summary();
    if !db
        .create_user(user, hash)
        .await
        .with_context(|| format!("creating user {:?}", summary.id))?
    {
        // lost a race against a concurrent registration
        return Err(Error::user_already_exists());
    }
    tracing::info!(user = ?summary.id, "registered new user");
    Ok(summary)
}

pub async fn login(
    db: &dyn Db,
    SessionLength(length): SessionLength,
    data: NewSession,
) -> Result<LoginResponse, Error> {
    data.validate()?;
    let (user, hash) = db
        .find_credentials(&data.email)
        .await
        .context("fetching credentials")?
        .ok_or(Error::invalid_credentials())?;
    let password = data.password;
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("joining password verification task")?
        .context("verifying password")?;
    if !matches {
        return Err(Error::invalid_credentials());
    }
    let token = AuthToken::generate();
    let now = Utc::now();
    db.create_session(token, user.id, now, now + length)
        .await
        .with_context(|| format!("creating session for {:?}", user.id))?;
    tracing::debug!(user = ?user.id, "user logged in");
    Ok(LoginResponse {
        token,
        user: user.summary(),
    })
}

pub async fn logout(db: &dyn Db, token: AuthToken) -> Result<(), Error> {
    if !db.delete_session(token).await.context("deleting session")? {
        return Err(Error::unauthenticated());
    }
    Ok(())
}

pub async fn create_topic(db: &dyn Db, user: UserId, data: NewTopic) -> Result<Topic, Error> {
    data.validate()?;
    let topic = data.into_topic(user);
    if db
        .find_topic_by_name(&topic.name)
        .await
        .context("checking for an existing topic")?
        .is_some()
    {
        return Err(Error::name_already_used(topic.name));
    }
    if !db
        .create_topic(topic.clone())
        .await
        .with_context(|| format!("creating topic {:?}", topic.name))?
    {
        return Err(Error::name_already_used(topic.name));
    }
    tracing::debug!(topic = ?topic.id, name = ?topic.name, "created topic");
    Ok(topic)
}

pub async fn list_topics(db: &dyn Db) -> Result<Vec<Topic>, Error> {
    Ok(db.list_topics().await.context("listing topics")?)
}

pub async fn get_topic(db: &dyn Db, name: &str) -> Result<Topic, Error> {
    Ok(db
        .find_topic_by_name(name)
        .await
        .with_context(|| format!("fetching topic {name:?}"))?
        .ok_or(Error::not_found("topic"))?)
}

pub async fn topic_posts(db: &dyn Db, name: &str) -> Result<Vec<PostView>, Error> {
    let topic = get_topic(db, name).await?;
    let posts = db
        .find_posts_by_topic(topic.id)
        .await
        .with_context(|| format!("fetching posts of topic {:?}", topic.id))?;
    post_views(db, posts).await
}

/// Attaches author and topic names to posts
async fn post_views(db: &dyn Db, posts: Vec<Post>) -> Result<Vec<PostView>, Error> {
    let authors = posts
        .iter()
        .map(|p| p.author)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let topics = posts
        .iter()
        .map(|p| p.topic)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let users = db.find_users(&authors).await.context("fetching authors")?;
    let topics = db.find_topics(&topics).await.context("fetching topics")?;
    Ok(posts
        .into_iter()
        .map(|post| PostView {
            author_name: agora_api::display_name(&users, post.author),
            topic_name: topics.get(&post.topic).map(|t| t.name.clone()),
            post,
        })
        .collect())
}

pub async fn create_post(db: &dyn Db, user: UserId, data: NewPost) -> Result<Post, Error> {
    data.validate()?;
    let topic = db
        .find_topic_by_name(&data.topic_name)
        .await
        .with_context(|| format!("fetching topic {:?}", data.topic_name))?
        .ok_or(Error::not_found("topic"))?;
    let post = data.into_post(user, topic.id);
    db.create_post(post.clone())
        .await
        .with_context(|| format!("creating post {:?}", post.id))?;
    tracing::debug!(post = ?post.id, topic = ?topic.id, "created post");
    Ok(post)
}

pub async fn list_posts(db: &dyn Db) -> Result<Vec<PostView>, Error> {
    let posts = db.list_posts().await.context("listing posts")?;
    post_views(db, posts).await
}

async fn find_post(db: &dyn Db, id: PostId) -> Result<Post, Error> {
    Ok(db
        .find_post_by_id(id)
        .await
        .with_context(|| format!("fetching post {id:?}"))?
        .ok_or(Error::not_found("post"))?)
}

pub async fn get_post(db: &dyn Db, id: PostId) -> Result<PostDetail, Error> {
    let post = find_post(db, id).await?;
    let comments = db
        .find_comments_by_post(id)
        .await
        .with_context(|| format!("fetching comments of post {id:?}"))?
        .into_iter()
        .map(|c| (c.id, c))
        .collect::<HashMap<_, _>>();
    let mut authors = comments.values().map(|c| c.author).collect::<HashSet<_>>();
    authors.insert(post.author);
    let authors = authors.into_iter().collect::<Vec<_>>();
    let users = db.find_users(&authors).await.context("fetching authors")?;
    let thread = flatten_thread(&post.comments, &comments, &users);
    let view = post_views(db, vec![post])
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("post view for {id:?} disappeared"))?;
    Ok(PostDetail { view, thread })
}

pub async fn vote(
    db: &dyn Db,
    user: UserId,
    id: PostId,
    action: VoteAction,
) -> Result<VoteTally, Error> {
    let sets = db
        .update_post_vote_sets(id, VoteUpdate::new(user, action))
        .await
        .with_context(|| format!("voting {action:?} on post {id:?}"))?
        .ok_or(Error::not_found("post"))?;
    tracing::debug!(post = ?id, ?user, ?action, "recorded vote");
    Ok(sets.tally(user))
}

pub async fn edit_post(
    db: &dyn Db,
    user: UserId,
    id: PostId,
    patch: PostPatch,
) -> Result<Post, Error> {
    patch.validate()?;
    find_post(db, id).await?.check_author(user)?;
    Ok(db
        .update_post_fields(id, patch)
        .await
        .with_context(|| format!("updating post {id:?}"))?
        .ok_or(Error::not_found("post"))?)
}

/// Returns the number of comments deleted along with the post
pub async fn delete_post(db: &dyn Db, user: UserId, id: PostId) -> Result<u64, Error> {
    find_post(db, id).await?.check_author(user)?;
    let deleted_comments = db
        .delete_comments_by_post(id)
        .await
        .with_context(|| format!("deleting comments of post {id:?}"))?;
    if !db
        .delete_post(id)
        .await
        .with_context(|| format!("deleting post {id:?}"))?
    {
        return Err(Error::not_found("post"));
    }
    tracing::debug!(post = ?id, deleted_comments, "deleted post");
    Ok(deleted_comments)
}

pub async fn create_comment(
    db: &dyn Db,
    user: UserId,
    post: PostId,
    data: NewComment,
) -> Result<Comment, Error> {
    data.validate()?;
    find_post(db, post).await?;
    if let Some(parent) = data.parent {
        let parent = db
            .find_comment_by_id(parent)
            .await
            .with_context(|| format!("fetching parent comment {parent:?}"))?;
        if !matches!(parent, Some(p) if p.post == post) {
            return Err(Error::not_found("parent comment"));
        }
    }
    let comment = data.into_comment(user, post);
    db.create_comment(comment.clone())
        .await
        .with_context(|| format!("creating comment {:?}", comment.id))?;
    let attached = match comment.reply_target() {
        ReplyTarget::Post(post) => db.append_top_level_comment_to_post(post, comment.id).await,
        ReplyTarget::Comment(parent) => db.append_child_to_comment(parent, comment.id).await,
    }
    .with_context(|| format!("attaching comment {:?}", comment.id))?;
    if !attached {
        // the target vanished between the check and the append, leaving an orphan behind
        tracing::warn!(comment = ?comment.id, target = ?comment.reply_target(), "reply target disappeared");
        return Err(Error::not_found(match comment.reply_target() {
            ReplyTarget::Post(_) => "post",
            ReplyTarget::Comment(_) => "parent comment",
        }));
    }
    tracing::debug!(comment = ?comment.id, ?post, parent = ?comment.parent, "created comment");
    Ok(comment)
}

pub async fn profile(db: &dyn Db, id: UserId) -> Result<Profile, Error> {
    let user = db
        .find_user_by_id(id)
        .await
        .with_context(|| format!("fetching user {id:?}"))?
        .ok_or(Error::not_found("user"))?;
    let posts = db
        .find_posts_by_author(id)
        .await
        .with_context(|| format!("fetching posts of {id:?}"))?;
    let posts = post_views(db, posts).await?;
    let comments = db
        .find_top_level_comments_by_author(id)
        .await
        .with_context(|| format!("fetching comments of {id:?}"))?;
    let post_ids = comments
        .iter()
        .map(|c| c.post)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let titles = db
        .find_posts(&post_ids)
        .await
        .context("fetching commented posts")?;
    let comments = comments
        .into_iter()
        .map(|comment| ProfileComment {
            post_title: titles.get(&comment.post).map(|p| p.title.clone()),
            comment,
        })
        .collect();
    Ok(Profile {
        user,
        posts,
        comments,
    })
}

pub async fn cleanup(db: &dyn Db) -> Result<CleanupReport, Error> {
    let report = db.cleanup().await.context("cleaning up database")?;
    tracing::info!(?report, "cleaned up database");
    Ok(report)
}

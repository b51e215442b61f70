use agora_api::{
    CleanupReport, Comment, LoginResponse, NewComment, NewPost, NewSession, NewTopic,
    NewUser, Post, PostDeleted, PostDetail, PostEdited, PostId, PostPatch, PostView, Profile,
    Registered, Topic, UserId, Uuid, VoteAction, VoteTally,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{extractors::*, forum, Error};

pub async fn admin_cleanup(
    AdminAuth: AdminAuth,
    State(db): State<DbHandle>,
) -> Result<Json<CleanupReport>, Error> {
    Ok(Json(forum::cleanup(&*db).await?))
}

pub async fn register(
    State(db): State<DbHandle>,
    Json(data): Json<NewUser>,
) -> Result<(StatusCode, Json<Registered>), Error> {
    let user = forum::register(&*db, data).await?;
    Ok((
        StatusCode::CREATED,
        Json(Registered {
            message: String::from("User registered successfully"),
            user,
        }),
    ))
}

pub async fn login(
    State(db): State<DbHandle>,
    State(session_length): State<SessionLength>,
    Json(data): Json<NewSession>,
) -> Result<Json<LoginResponse>, Error> {
    Ok(Json(forum::login(&*db, session_length, data).await?))
}

pub async fn logout(PreAuth(token): PreAuth, State(db): State<DbHandle>) -> Result<(), Error> {
    forum::logout(&*db, token).await
}

pub async fn profile(
    Auth(_): Auth,
    State(db): State<DbHandle>,
    Path(id): Path<Uuid>,
) -> Result<Json<Profile>, Error> {
    Ok(Json(forum::profile(&*db, UserId(id)).await?))
}

pub async fn create_topic(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<NewTopic>,
) -> Result<(StatusCode, Json<Topic>), Error> {
    let topic = forum::create_topic(&*db, user, data).await?;
    Ok((StatusCode::CREATED, Json(topic)))
}

pub async fn list_topics(State(db): State<DbHandle>) -> Result<Json<Vec<Topic>>, Error> {
    Ok(Json(forum::list_topics(&*db).await?))
}

pub async fn get_topic(
    State(db): State<DbHandle>,
    Path(name): Path<String>,
) -> Result<Json<Topic>, Error> {
    Ok(Json(forum::get_topic(&*db, &name).await?))
}

pub async fn topic_posts(
    State(db): State<DbHandle>,
    Path(name): Path<String>,
) -> Result<Json<Vec<PostView>>, Error> {
    Ok(Json(forum::topic_posts(&*db, &name).await?))
}

pub async fn create_post(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>), Error> {
    let post = forum::create_post(&*db, user, data).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(State(db): State<DbHandle>) -> Result<Json<Vec<PostView>>, Error> {
    Ok(Json(forum::list_posts(&*db).await?))
}

pub async fn get_post(
    State(db): State<DbHandle>,
    Path(id): Path<Uuid>,
) -> Result<Json<PostDetail>, Error> {
    Ok(Json(forum::get_post(&*db, PostId(id)).await?))
}

pub async fn like_post(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteTally>, Error> {
    Ok(Json(
        forum::vote(&*db, user, PostId(id), VoteAction::Like).await?,
    ))
}

pub async fn dislike_post(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteTally>, Error> {
    Ok(Json(
        forum::vote(&*db, user, PostId(id), VoteAction::Dislike).await?,
    ))
}

pub async fn edit_post(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    Path(id): Path<Uuid>,
    Json(patch): Json<PostPatch>,
) -> Result<Json<PostEdited>, Error> {
    let post = forum::edit_post(&*db, user, PostId(id), patch).await?;
    Ok(Json(PostEdited {
        message: String::from("Post updated successfully"),
        post,
    }))
}

pub async fn delete_post(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    Path(id): Path<Uuid>,
) -> Result<Json<PostDeleted>, Error> {
    let deleted_comments = forum::delete_post(&*db, user, PostId(id)).await?;
    Ok(Json(PostDeleted {
        message: String::from("Post and related comments deleted successfully"),
        deleted_comments,
    }))
}

pub async fn create_comment(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    Path(id): Path<Uuid>,
    Json(data): Json<NewComment>,
) -> Result<(StatusCode, Json<Comment>), Error> {
    let comment = forum::create_comment(&*db, user, PostId(id), data).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

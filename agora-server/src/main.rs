use std::{net::SocketAddr, sync::Arc};

use agora_api::{AuthToken, Db, Uuid};
use agora_mock_server::MockDb;
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod forum;
mod handlers;

#[cfg(test)]
mod fuzz;

use db::PostgresDb;
use error::Error;
use extractors::*;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(Debug, StructOpt)]
#[structopt(name = "agora-server", about = "Backend of the agora discussion forum")]
struct Opt {
    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Keep everything in memory instead of connecting to PostgreSQL
    #[structopt(long)]
    in_memory: bool,

    #[structopt(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:5001")]
    listen: SocketAddr,

    /// Bearer token accepted on the /admin routes, which are disabled if unset
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<Uuid>,

    /// Lifetime of a login session
    #[structopt(long, env = "SESSION_HOURS", default_value = "1")]
    session_hours: u32,
}

pub async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(db_url)
        .await
        .with_context(|| format!("Error opening database {db_url:?}"))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/topics", get(handlers::list_topics).post(handlers::create_topic))
        .route("/topics/:name", get(handlers::get_topic))
        .route("/topics/:name/posts", get(handlers::topic_posts))
        .route("/posts", get(handlers::list_posts).post(handlers::create_post))
        .route(
            "/posts/:id",
            get(handlers::get_post)
                .patch(handlers::edit_post)
                .delete(handlers::delete_post),
        )
        .route("/posts/:id/like", post(handlers::like_post))
        .route("/posts/:id/dislike", post(handlers::dislike_post))
        .route("/posts/:id/comments", post(handlers::create_comment))
        .route("/users/register", post(handlers::register))
        .route("/users/login", post(handlers::login))
        .route("/users/logout", post(handlers::logout))
        .route("/users/:id/profile", get(handlers::profile))
        .route("/admin/cleanup", post(handlers::admin_cleanup))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed listening for shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();

    let mut pool = None;
    let db: Arc<dyn Db> = match (&opt.database_url, opt.in_memory) {
        (_, true) => {
            tracing::warn!("running with the in-memory store, nothing will be persisted");
            Arc::new(MockDb::new())
        }
        (Some(url), false) => {
            let p = create_sqlx_pool(url).await?;
            MIGRATOR.run(&p).await.context("running pending migrations")?;
            pool = Some(p.clone());
            Arc::new(PostgresDb::new(p))
        }
        (None, false) => {
            return Err(agora_api::Error::Configuration(String::from("DATABASE_URL")))
                .context("DATABASE_URL must be set unless running with --in-memory")
        }
    };

    if opt.admin_token.is_none() {
        tracing::info!("ADMIN_TOKEN is not set, admin routes will refuse requests");
    }
    let state = AppState {
        db: DbHandle::new(db),
        admin_token: opt.admin_token.map(AuthToken),
        session_length: SessionLength(chrono::Duration::hours(i64::from(opt.session_hours))),
    };

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum webserver")?;

    if let Some(pool) = pool {
        pool.close().await;
    }
    Ok(())
}

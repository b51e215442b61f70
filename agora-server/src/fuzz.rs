use std::{panic::AssertUnwindSafe, path::Path, sync::Arc};

use agora_api::{AuthToken, Error as ApiError, Uuid};
use agora_mock_server::MockDb;
use axum::{
    extract::FromRequestParts,
    http::{self, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::Executor;

use crate::{
    extractors::*,
    tests::{request, state_with},
    *,
};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token: String| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::Unauthenticated)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

#[tokio::test]
async fn preauth_accepts_bearer_tokens() {
    let token = Uuid::new_v4();
    for header in [format!("Bearer {token}"), format!("bearer {token}")] {
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, header)
            .body(())
            .expect("building request");
        let mut req = req.into_parts().0;
        let PreAuth(got) = PreAuth::from_request_parts(&mut req, &())
            .await
            .expect("parsing valid header");
        assert_eq!(got, AuthToken(token));
    }
    for header in [format!("Basic {token}"), format!("Bearer {token} extra"), String::from("Bearer")] {
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, header)
            .body(())
            .expect("building request");
        let mut req = req.into_parts().0;
        assert!(PreAuth::from_request_parts(&mut req, &()).await.is_err());
    }
}

fn build_pg_cluster(data: &Path) -> postgresfixture::cluster::Cluster {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    postgresfixture::cluster::Cluster::new(
        data,
        runtime.expect("postgresql seems to not be installed in path"),
    )
}

/// Spins up a throwaway postgres cluster, migrates it, and runs `$fn` once
/// for each generated value, resetting the database in between
macro_rules! do_sqlx_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        #[ignore = "needs postgresql installed"]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let cluster = build_pg_cluster(datadir_path);
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!(
                        "postgresql://?host={}&dbname=test_db",
                        datadir_path
                    ))
                    .await
                    .expect("creating sqlx pool");
                    MIGRATOR
                        .run(&pool)
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_type::<$typ>()
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        let res = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool, v).await;
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            pool.execute(include_str!("../reset-test-db.sql"))
                                .await
                                .expect("failed cleaning up database");
                        });
                        if let Err(e) = res {
                            std::panic::resume_unwind(e);
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

/// One step of a forum session. Indices pick among the users, sessions and
/// posts created so far, wrapping around.
#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    Register { name: u8 },
    Login { uid: u8, bad_password: bool },
    CreateTopic { sid: u8, name: u8 },
    CreatePost { sid: u8, topic: u8, link: bool },
    Vote { sid: u8, pid: u8, like: bool },
    Comment { sid: u8, pid: u8, reply_to: Option<u8> },
    EditPost { sid: u8, pid: u8, clear_link: bool },
    DeletePost { sid: u8, pid: u8 },
    FetchPost { pid: u8 },
    ListPosts,
}

fn pick<T: Copy>(items: &[T], i: u8) -> Option<T> {
    match items.len() {
        0 => None,
        len => Some(items[usize::from(i) % len]),
    }
}

/// The same forum run on two stores. Ids differ between the two, so every
/// entity is remembered as an (app, mock) pair.
struct ComparativeFuzzer {
    app: Router,
    mock: Router,
    users: Vec<u8>,
    sessions: Vec<(AuthToken, AuthToken)>,
    posts: Vec<(Uuid, Uuid)>,
    comments: Vec<(Uuid, Uuid)>,
}

/// Strips what legitimately differs between the two stores
fn normalize(body: Value) -> Value {
    match body {
        Value::Object(o) => Value::Object(
            o.into_iter()
                .filter(|(k, _)| !matches!(k.as_str(), "id" | "date" | "token" | "parent"))
                .map(|(k, v)| match k.as_str() {
                    "author" | "topic" | "creator" => (k, Value::Null),
                    "likes" | "dislikes" | "comments" | "children" | "members" => {
                        let len = v.as_array().map(|a| a.len()).unwrap_or(0);
                        (k, json!(len))
                    }
                    _ => (k, normalize(v)),
                })
                .collect(),
        ),
        Value::Array(a) => Value::Array(a.into_iter().map(normalize).collect()),
        v => v,
    }
}

impl ComparativeFuzzer {
    fn new(pool: sqlx::PgPool) -> ComparativeFuzzer {
        ComparativeFuzzer {
            app: app(state_with(Arc::new(PostgresDb::new(pool)), None)),
            mock: app(state_with(Arc::new(MockDb::new()), None)),
            users: Vec::new(),
            sessions: Vec::new(),
            posts: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Runs the request on both apps, checks they agree, and returns both
    /// raw responses
    async fn both(
        &self,
        name: &str,
        method: &str,
        uris: (String, String),
        tokens: Option<(AuthToken, AuthToken)>,
        bodies: (Option<Value>, Option<Value>),
    ) -> ((StatusCode, Value), (StatusCode, Value)) {
        let app = request(&self.app, method, &uris.0, tokens.map(|t| t.0), bodies.0).await;
        let mock = request(&self.mock, method, &uris.1, tokens.map(|t| t.1), bodies.1).await;
        assert_eq!(
            (app.0, normalize(app.1.clone())),
            (mock.0, normalize(mock.1.clone())),
            "app and mock did not return the same result for {name}"
        );
        (app, mock)
    }

    fn id_of(resp: &(StatusCode, Value)) -> Option<Uuid> {
        serde_json::from_value(resp.1.get("id")?.clone()).ok()
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::Register { name } => {
                let body = json!({
                    "username": format!("user{name}"),
                    "email": format!("user{name}@example.org"),
                    "password": "password",
                });
                let (app, _) = self
                    .both(
                        "Register",
                        "POST",
                        (String::from("/users/register"), String::from("/users/register")),
                        None,
                        (Some(body.clone()), Some(body)),
                    )
                    .await;
                if app.0 == StatusCode::CREATED {
                    self.users.push(name);
                }
            }
            FuzzOp::Login { uid, bad_password } => {
                let Some(name) = pick(&self.users, uid) else {
                    return;
                };
                let body = json!({
                    "email": format!("user{name}@example.org"),
                    "password": if bad_password { "wrong" } else { "password" },
                });
                let (app, mock) = self
                    .both(
                        "Login",
                        "POST",
                        (String::from("/users/login"), String::from("/users/login")),
                        None,
                        (Some(body.clone()), Some(body)),
                    )
                    .await;
                if app.0 == StatusCode::OK {
                    let token = |v: &Value| -> AuthToken {
                        serde_json::from_value(v["token"].clone()).expect("parsing token")
                    };
                    self.sessions.push((token(&app.1), token(&mock.1)));
                }
            }
            FuzzOp::CreateTopic { sid, name } => {
                let body = json!({ "name": format!("topic{}", name % 4) });
                self.both(
                    "CreateTopic",
                    "POST",
                    (String::from("/topics"), String::from("/topics")),
                    pick(&self.sessions, sid),
                    (Some(body.clone()), Some(body)),
                )
                .await;
            }
            FuzzOp::CreatePost { sid, topic, link } => {
                let mut body = json!({ "title": "Hello", "topic_name": format!("topic{}", topic % 4) });
                body[if link { "link" } else { "text" }] = json!("World");
                let (app, mock) = self
                    .both(
                        "CreatePost",
                        "POST",
                        (String::from("/posts"), String::from("/posts")),
                        pick(&self.sessions, sid),
                        (Some(body.clone()), Some(body)),
                    )
                    .await;
                if let (Some(a), Some(m)) = (Self::id_of(&app), Self::id_of(&mock)) {
                    self.posts.push((a, m));
                }
            }
            FuzzOp::Vote { sid, pid, like } => {
                let Some((a, m)) = pick(&self.posts, pid) else {
                    return;
                };
                let action = if like { "like" } else { "dislike" };
                self.both(
                    "Vote",
                    "POST",
                    (format!("/posts/{a}/{action}"), format!("/posts/{m}/{action}")),
                    pick(&self.sessions, sid),
                    (None, None),
                )
                .await;
            }
            FuzzOp::Comment { sid, pid, reply_to } => {
                let Some((a, m)) = pick(&self.posts, pid) else {
                    return;
                };
                let parent = reply_to.and_then(|c| pick(&self.comments, c));
                let (app, mock) = self
                    .both(
                        "Comment",
                        "POST",
                        (format!("/posts/{a}/comments"), format!("/posts/{m}/comments")),
                        pick(&self.sessions, sid),
                        (
                            Some(json!({ "text": "reply", "parent": parent.map(|p| p.0) })),
                            Some(json!({ "text": "reply", "parent": parent.map(|p| p.1) })),
                        ),
                    )
                    .await;
                if let (Some(a), Some(m)) = (Self::id_of(&app), Self::id_of(&mock)) {
                    self.comments.push((a, m));
                }
            }
            FuzzOp::EditPost {
                sid,
                pid,
                clear_link,
            } => {
                let Some((a, m)) = pick(&self.posts, pid) else {
                    return;
                };
                let body = match clear_link {
                    true => json!({ "text": "edited", "link": null }),
                    false => json!({ "text": "edited" }),
                };
                self.both(
                    "EditPost",
                    "PATCH",
                    (format!("/posts/{a}"), format!("/posts/{m}")),
                    pick(&self.sessions, sid),
                    (Some(body.clone()), Some(body)),
                )
                .await;
            }
            FuzzOp::DeletePost { sid, pid } => {
                let Some((a, m)) = pick(&self.posts, pid) else {
                    return;
                };
                self.both(
                    "DeletePost",
                    "DELETE",
                    (format!("/posts/{a}"), format!("/posts/{m}")),
                    pick(&self.sessions, sid),
                    (None, None),
                )
                .await;
            }
            FuzzOp::FetchPost { pid } => {
                let Some((a, m)) = pick(&self.posts, pid) else {
                    return;
                };
                self.both(
                    "FetchPost",
                    "GET",
                    (format!("/posts/{a}"), format!("/posts/{m}")),
                    None,
                    (None, None),
                )
                .await;
            }
            FuzzOp::ListPosts => {
                self.both(
                    "ListPosts",
                    "GET",
                    (String::from("/posts"), String::from("/posts")),
                    None,
                    (None, None),
                )
                .await;
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    Vec<FuzzOp>,
    |pool: sqlx::PgPool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);

use agora_api::{AuthToken, CleanupReport, Registered, Uuid};
use anyhow::Context;

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "http://127.0.0.1:5001")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Delete every user, session, topic, post and comment
    Cleanup,

    /// Register a user
    Register {
        username: String,
        email: String,
        password: String,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

/// Turns error responses into the api error they carry
async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response")?;
    Err(agora_api::Error::parse(&body)
        .with_context(|| format!("server answered {status} with an unparseable body"))?)
    .with_context(|| format!("server answered {status}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::Cleanup => {
            let resp = client
                .post(format!("{}/admin/cleanup", opt.host))
                .bearer_auth(admin_token()?.0)
                .send()
                .await
                .context("sending cleanup request")?;
            let report: CleanupReport = check(resp).await?.json().await?;
            println!(
                "deleted {} comments, {} posts, {} topics, {} sessions and {} users",
                report.comments, report.posts, report.topics, report.sessions, report.users
            );
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let resp = client
                .post(format!("{}/users/register", opt.host))
                .json(&agora_api::NewUser::new(username, email, password))
                .send()
                .await
                .context("sending registration request")?;
            let registered: Registered = check(resp).await?.json().await?;
            println!("{} has id {}", registered.user.username, registered.user.id.0);
        }
    }

    Ok(())
}

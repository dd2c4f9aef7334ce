use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use reqwest::header::{self, HeaderValue};
use reqwest::Method;

use mojo_session::auth::SessionEnded;
use mojo_session::config::{self, Command, Config};
use mojo_session::{Outcome, RequestDescriptor, SessionClient};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level; stdout is reserved for responses
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(
        base_url = %config.base_url,
        session_file = %config.session_file.display(),
        refresh = config.refresh_path.is_some(),
        "Configuration loaded"
    );

    let client = SessionClient::from_config(&config)?;
    let mut session_events = client.auth().subscribe();

    let result = run(command, &client).await;

    while let Ok(event) = session_events.try_recv() {
        print_session_ended(&event);
    }

    result
}

async fn run(command: Command, client: &SessionClient) -> Result<()> {
    match command {
        Command::Login { email } => login(client, email).await,
        Command::Logout => {
            if !client.auth().logout() {
                println!("No active session");
            }
            Ok(())
        }
        Command::Status => {
            match client.auth().current() {
                Some(credential) => {
                    println!("Logged in (token: {})", credential.redacted());
                    match credential.expires_at {
                        Some(exp) if credential.is_expired() => {
                            println!("  Token expiry hint passed at {}", exp.to_rfc3339())
                        }
                        Some(exp) => println!("  Token expires at {}", exp.to_rfc3339()),
                        None => println!("  No expiry reported"),
                    }
                }
                None => println!("Not logged in"),
            }
            Ok(())
        }
        Command::Whoami => {
            let user = client.current_user().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Command::Request {
            method,
            path,
            data,
            headers,
        } => request(client, &method, &path, data, &headers).await,
    }
}

async fn login(client: &SessionClient, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => Input::new()
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read email")?,
    };

    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    let credential = client.auth().login(&email, &password).await?;
    println!("✅ Logged in (token: {})", credential.redacted());
    Ok(())
}

async fn request(
    client: &SessionClient,
    method: &str,
    path: &str,
    data: Option<String>,
    headers: &[String],
) -> Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;

    let mut descriptor = RequestDescriptor::new(method, client.endpoint(path)?)
        .header(header::ACCEPT, HeaderValue::from_static("application/json"));

    for raw in headers {
        let (name, value) = config::parse_header(raw)?;
        descriptor = descriptor.header(name, value);
    }

    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(&data).context("--data must be valid JSON")?;
        descriptor = descriptor.json(&body)?;
    }

    match client.execute(&descriptor).await {
        Outcome::Success(response) => {
            eprintln!("{}", response.status());
            let body = response.text().await.context("Failed to read response body")?;
            println!("{}", pretty_json(&body));
            Ok(())
        }
        Outcome::ServerError { status, body } => {
            eprintln!("{}", status);
            println!("{}", pretty_json(&body));
            anyhow::bail!("Request failed with status {}", status.as_u16())
        }
        Outcome::AuthExpired => anyhow::bail!("Session expired - run `mojo-session login`"),
        Outcome::NetworkFailure(e) => Err(e).context("Request could not be sent"),
    }
}

/// Pretty-print JSON bodies, pass anything else through
fn pretty_json(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}

fn print_session_ended(event: &SessionEnded) {
    eprintln!(
        "Session ended ({:?}) at {}. Run `mojo-session login` to sign in again.",
        event.reason,
        event.at.to_rfc3339()
    );
}

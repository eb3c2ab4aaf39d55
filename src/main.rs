use pandit_session::application_port::*;
use pandit_session::client::ApiClient;
use pandit_session::domain_model::*;
use pandit_session::domain_port::SessionListener;
use pandit_session::logger::*;
use pandit_session::settings::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    debug!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let session_ended = Arc::new(AtomicBool::new(false));
    let ended = session_ended.clone();
    let listener: Arc<dyn SessionListener> = Arc::new(move |error: &RefreshError| {
        warn!(%error, "session ended");
        ended.store(true, Ordering::SeqCst);
    });

    let client = ApiClient::try_new(&project_settings, listener).await?;
    let outcome = run(&client, cli.command).await;

    if session_ended.load(Ordering::SeqCst) {
        eprintln!("Session expired. Run `pandit-session login` to sign in again.");
        std::process::exit(2);
    }
    outcome
}

async fn run(client: &ApiClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::RequestOtp { phone } => {
            let reply = client.auth_service.request_otp(&phone).await?;
            print_json(&reply)?;
        }
        Command::VerifyOtp { phone, otp } => {
            let result = client.auth_service.verify_otp(&phone, &otp).await?;
            print_login(&result);
        }
        Command::Login {
            identifier,
            password,
        } => {
            let result = client
                .auth_service
                .password_login(&identifier, &password)
                .await?;
            print_login(&result);
        }
        Command::Register {
            full_name,
            phone,
            email,
            password,
            role,
        } => {
            let reply = client
                .auth_service
                .register(RegisterInput {
                    full_name,
                    phone_number: phone,
                    email,
                    password,
                    role: Some(role),
                })
                .await?;
            print_json(&reply)?;
        }
        Command::Profile => {
            let profile = client.auth_service.fetch_profile().await?;
            print_json(&profile)?;
        }
        Command::Request { method, path, json } => {
            let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let mut request = ApiRequest::new(method, path);
            if let Some(json) = json {
                request = request.with_json(serde_json::from_str(&json)?);
            }
            let response = client.gateway.request(request).await?;
            match response.json::<serde_json::Value>() {
                Ok(body) => print_json(&body)?,
                Err(_) => println!("{}", response.text()),
            }
        }
        Command::Logout => {
            client.auth_service.logout().await?;
            println!("Logged out.");
        }
    }
    Ok(())
}

fn print_login(result: &LoginResult) {
    let name = result.user.full_name.as_deref().unwrap_or("user");
    match &result.role {
        Some(role) => println!("Logged in as {} ({}).", name, role),
        None => println!("Logged in as {}.", name),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use super::{Parser, Subcommand};
use crate::domain_model::Role;

#[derive(Parser, Debug)]
#[command(name = "pandit-session", about = "Signed-in client for the marketplace API")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask the backend to send a login OTP.
    RequestOtp {
        #[arg(long)]
        phone: String,
    },
    /// Log in with the OTP received by SMS or email.
    VerifyOtp {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        otp: String,
    },
    /// Log in with a phone number or email and a password.
    Login {
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    Profile,
    /// Send any request through the signed-in session.
    Request {
        method: String,
        path: String,
        #[arg(long)]
        json: Option<String>,
    },
    Logout,
}

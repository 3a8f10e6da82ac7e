use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use colored::Colorize;
use eventhub_client::{ApiClient, AuthFlow, AuthState, User, VerifyOutcome};

use crate::cli::LoginArgs;
use crate::output::{print_error, print_success};

pub async fn login(client: &ApiClient, args: &LoginArgs) -> Result<()> {
    let mut flow = AuthFlow::new(client.clone());
    if let AuthState::Authenticated(user) = flow.state() {
        anyhow::bail!(
            "Already logged in as {}. Run `eventhub logout` first.",
            user.email
        );
    }

    flow.request_otp(&args.email).await?;
    print_success(&format!("Login code sent to {}", args.email.cyan()));

    let otp = match &args.otp {
        Some(otp) => otp.clone(),
        None => prompt("Code: ")?,
    };

    match flow.verify_otp(&otp).await? {
        VerifyOutcome::LoggedIn(user) => report_login(client, &user),
        VerifyOutcome::Conflict { message } => {
            print_error(&message);
            if args.force || confirm("Log out your other devices and continue?")? {
                let user = flow.logout_other_devices().await?;
                report_login(client, &user);
            } else {
                flow.abort()?;
                println!("Login aborted; your other session is untouched.");
            }
        }
    }
    Ok(())
}

fn report_login(client: &ApiClient, user: &User) {
    print_success(&format!(
        "Logged in to {} as {} ({})",
        client.base_url().cyan(),
        user.display_name().cyan(),
        user.role
    ));
}

pub async fn logout(client: &ApiClient) -> Result<()> {
    if !client.session().is_authenticated() {
        println!("Not logged in");
        return Ok(());
    }
    let mut flow = AuthFlow::new(client.clone());
    if let Err(e) = flow.logout().await {
        print_error(&format!("Server-side logout failed: {e}"));
    }
    print_success("Logged out (session removed)");
    Ok(())
}

pub fn whoami(client: &ApiClient, profile: &str) -> Result<()> {
    let Some(session) = client.session().session() else {
        print_error(&format!("Not logged in (profile: \"{profile}\")"));
        return Ok(());
    };

    println!("{}: {}", "Profile".cyan(), profile);
    println!("{}: {}", "Server".cyan(), client.base_url());
    match &session.user {
        Some(user) => {
            println!("{}: {} <{}>", "User".cyan(), user.display_name(), user.email);
            println!("{}: {}", "Role".cyan(), user.role);
            let sections: Vec<&str> = user.role.sections().iter().map(|s| s.as_str()).collect();
            println!(
                "{}: {}",
                "Sections".cyan(),
                if sections.is_empty() {
                    "(none)".to_string()
                } else {
                    sections.join(", ")
                }
            );
        }
        None => println!("{}: (unknown)", "User".cyan()),
    }
    println!("{}: {}", "Device".cyan(), session.device_id);
    println!("{}: {}", "Token".cyan(), token_preview(&session.access_token));
    Ok(())
}

fn token_preview(token: &str) -> String {
    let count = token.chars().count();
    if count > 20 {
        let head: String = token.chars().take(8).collect();
        let tail: String = token.chars().skip(count - 8).collect();
        format!("{head}...{tail}")
    } else {
        token.to_string()
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} [y/N] "))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

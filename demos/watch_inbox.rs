//! Example: Watch an inbox and react to changes in real time.
//!
//! Demonstrates the `IDLE`-based watcher: every mailbox event is printed,
//! and the filter set runs whenever new mail arrives. The watcher survives
//! connection drops by reconnecting on its own.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! RUST_LOG=info cargo run --example watch_inbox
//! ```
//!
//! Press Ctrl+C to stop.

use imap_filters::watch::{filters_on_new_mail, print_events, Watcher};
use imap_filters::{
    criteria, shared, Account, AccountConfig, Action, CriterionFilter, Filter,
};
use std::env;

#[tokio::main]
async fn main() -> imap_filters::Result<()> {
    // Structured logs; control verbosity with RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    let config = AccountConfig::builder()
        .name("watched")
        .email(&email)
        .password(password)
        .build()?;
    let account = shared(Account::new(config));

    // On new mail, file anything from the newsletter sender right away.
    let filters: Vec<Box<dyn Filter>> = vec![Box::new(CriterionFilter::new(
        account.clone(),
        criteria::from_contains("newsletter"),
        Action::MarkRead.then(Action::move_to("Archive")),
    ))];
    let reaction = print_events().chain(filters_on_new_mail(filters));

    println!("Watching {email} (Ctrl+C to stop)...");
    let watcher = Watcher::start(account, reaction).await?;

    tokio::signal::ctrl_c().await.ok();
    println!("Stopping...");
    watcher.stop().await;

    Ok(())
}

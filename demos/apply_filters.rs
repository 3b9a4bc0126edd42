//! Example: Run a small filter set over an inbox.
//!
//! Demonstrates building criteria, chaining actions and applying filters.
//! Run with `--dry-run` first to see what would happen without touching
//! anything.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example apply_filters -- --dry-run
//! ```
//!
//! For Gmail, you'll need to use an [App Password](https://support.google.com/accounts/answer/185833).

use imap_filters::{
    apply_filters, criteria, move_if_from, shared, Account, AccountConfig, Action,
    CriterionFilter, Filter,
};
use std::env;

#[tokio::main]
async fn main() -> imap_filters::Result<()> {
    let dry_run = env::args().any(|a| a == "--dry-run");

    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    // IMAP host is auto-discovered from the email domain
    let config = AccountConfig::builder()
        .name("personal")
        .email(&email)
        .password(password)
        .build()?;
    let account = shared(Account::new(config));

    // Read newsletters go to the archive; a specific sender gets filed.
    let stale_newsletter = criteria::is_read().and(criteria::from_contains("newsletter"));
    let filters: Vec<Box<dyn Filter>> = vec![
        Box::new(CriterionFilter::new(
            account.clone(),
            stale_newsletter,
            Action::move_to("Archive"),
        )),
        Box::new(move_if_from(
            account,
            "billing@example.com",
            "Receipts",
            true,
        )),
    ];

    if dry_run {
        println!("Dry run: showing what the filters would do...");
    }
    apply_filters(&filters, dry_run).await?;
    println!("Done.");

    Ok(())
}

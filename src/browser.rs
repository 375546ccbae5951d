//! Final hand-off: show the results URL and, if the operator agrees, open it.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const PROFILE_URL: &str = "https://profile.codersrank.io/repo?multiToken=";

pub fn results_url(token: &str) -> String {
    format!("{PROFILE_URL}{token}")
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub async fn offer(url: &str, open_browser: bool) -> Result<()> {
    println!("Your results are ready: {url}");
    if !open_browser {
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("You are being navigated to '{url}'. Do you wish to proceed? [y/N] ").as_bytes())
        .await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
    if !is_affirmative(&answer) {
        return Ok(());
    }
    if let Err(e) = open::that(url) {
        tracing::warn!(error = %e, "Couldn't open a browser, open the URL above manually");
    }
    Ok(())
}

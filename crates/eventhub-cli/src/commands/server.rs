use anyhow::Result;
use colored::Colorize;
use eventhub_client::ApiClient;

pub async fn status(client: &ApiClient) -> Result<()> {
    let server = client.base_url();
    let (code, body) = client.health().await?;
    if (200..300).contains(&code) {
        println!("{} {} is {}", "✓".green(), server.cyan(), "healthy".green());
        if !body.is_empty() {
            println!("  {body}");
        }
    } else {
        println!(
            "{} {} returned {} {}",
            "✗".red(),
            server.cyan(),
            code.to_string().red(),
            body
        );
    }
    Ok(())
}

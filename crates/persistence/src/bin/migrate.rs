#![deny(warnings)]

use persistence::default_sqlite_url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    let pool = persistence::init_db(&url).await?;
    let id = persistence::create_save(&pool, "default", Some("initialized")).await?;
    println!("DB migrated at {} (default save id {})", url, id);
    Ok(())
}

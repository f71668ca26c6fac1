use std::env;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use portal::{auth::password, db};

const USAGE: &str = "Usage: portal-admin seed-admin | hash-password <password>";
const DEFAULT_ADMIN_EMAIL: &str = "admin@ciorbe-si-placinte.ro";
const DEFAULT_ADMIN_NAME: &str = "Administrator";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("seed-admin") => seed_admin()?,
        Some("hash-password") => {
            let Some(plain) = args.next() else {
                eprintln!("{USAGE}");
                std::process::exit(1);
            };
            println!("{}", password::hash_password(&plain)?);
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Creates the first administrator. Running it again leaves an existing
/// account with the same e-mail untouched.
fn seed_admin() -> Result<()> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let email = env::var("SEED_ADMIN_EMAIL")
        .unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string())
        .trim()
        .to_lowercase();
    let name = env::var("SEED_ADMIN_NAME").unwrap_or_else(|_| DEFAULT_ADMIN_NAME.to_string());
    let plain = env::var("SEED_ADMIN_PASSWORD").context("SEED_ADMIN_PASSWORD must be set")?;

    let pool = db::init_pool_with_size(&database_url, 1)?;
    let applied = db::run_migrations(&pool)?;
    tracing::info!(component = "portal-admin", applied, "database migrations up to date");

    let mut conn = pool.get().context("failed to get database connection")?;
    let inserted = db::seed_admin(&mut conn, &name, &email, &password::hash_password(&plain)?)?;

    if inserted == 0 {
        println!("Administrator {email} already exists; left unchanged.");
    } else {
        println!("Administrator {email} created.");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

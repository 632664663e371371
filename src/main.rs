use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use studytracker::{commands::Arguments, config::load_config, tracker, web};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Arguments::parse();

    stderrlog::new()
        .quiet(args.quiet)
        .verbosity(args.verbose as usize + 2)
        .init()?;

    let config = load_config(args.overrides())?;
    let conn = match tracker::establish_connection(&config.database_path) {
        Ok(conn) => conn,
        Err(err) => {
            log::error!("Could not open {:?}: {err}", config.database_path);
            return Err(err.into());
        }
    };

    web::serve(conn, config.listen_address).await
}

use std::path::Path;

use annuaire::{Error, Record, Session, logging, persist, site};
use anyhow::{Context, Result};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(Some(Path::new(site::LOG_FILE))).context("logger setup failed")?;

    let mut session = Session::new(site::session_config()).context("invalid site configuration")?;
    let output = Path::new(site::OUTPUT_FILE);

    let mut all_data: Vec<Record> = Vec::new();
    for region in site::REGIONS {
        for category in site::CATEGORIES {
            match site::scrape_region_category(&mut session, category, region, output).await {
                Ok(records) => all_data.extend(records),
                // fetch failures only end the current pair
                Err(Error::Fetch(e)) => {
                    log::error!("Aborted scrape for {category}/{region}: {e}");
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("scrape of {category}/{region} failed"));
                }
            }
        }
    }

    let stats = session.stats();
    log::info!(
        "Scraping completed - {} records. Statistics: {stats}",
        all_data.len()
    );
    persist::append_json(&stats, Path::new(site::STATS_FILE), 2)
        .context("cannot write statistics")?;

    Ok(())
}

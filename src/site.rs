//! qualit-enr.org installer directory.

use std::path::Path;
use std::slice;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::config::{DEFAULT_TIMEOUT, DelayWindow, RetryPolicy, SessionConfig};
use crate::error::{Error, ParseError};
use crate::html::joined_text;
use crate::paginate::Paginator;
use crate::persist;
use crate::record::Record;
use crate::session::Session;
use crate::text::clean_text;

pub const SITE_NAME: &str = "qualit-enr";
pub const BASE_URL: &str = "https://www.qualit-enr.org";
pub const OUTPUT_FILE: &str = "data/qualit-enr_output.csv";
pub const STATS_FILE: &str = "data/qualit-enr_stats.json";
pub const LOG_FILE: &str = "qualit_enr_scraper.log";

pub const CATEGORIES: [&str; 2] = [
    "installateurs-photovoltaique",
    "installateurs-pompe-a-chaleur",
];
pub const REGIONS: [&str; 2] = ["72", "75"];

const RESULTS_PER_PAGE: u32 = 20;
const SKILLS_HEADING: &str = "Nos compétences";

// Replayed from a browser session.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Referer", "https://www.qualit-enr.org/annuaire/"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "same-origin"),
    ("Sec-Fetch-User", "?1"),
    ("Upgrade-Insecure-Requests", "1"),
];

const DEFAULT_COOKIES: &[(&str, &str)] = &[
    (
        "axeptio_authorized_vendors",
        "%2Cgoogle_analytics%2CGoogleRecaptcha%2Caddthis%2Chotjar%2CYoutube%2Cgoogle_recaptcha%2Cyoutube%2C",
    ),
    (
        "axeptio_all_vendors",
        "%2Cgoogle_analytics%2CGoogleRecaptcha%2Caddthis%2Chotjar%2CYoutube%2Cgoogle_recaptcha%2Cyoutube%2C",
    ),
    (
        "axeptio_cookies",
        "{%22$$token%22:%22lsvu0voywrb8zj1i8yw83r%22%2C%22$$date%22:%222025-03-26T17:55:51.726Z%22%2C%22$$cookiesVersion%22:{%22name%22:%22qenr%22%2C%22identifier%22:%225df8f53f730c99249ab59382%22}%2C%22google_analytics%22:true%2C%22GoogleRecaptcha%22:true%2C%22addthis%22:true%2C%22hotjar%22:true%2C%22Youtube%22:true%2C%22google_recaptcha%22:true%2C%22youtube%22:true%2C%22$$completed%22:true}",
    ),
    ("_ga", "GA1.2.628301976.1743011727"),
    ("_gid", "GA1.2.1514183877.1743011752"),
    (
        "_hjSession_2459276",
        "eyJpZCI6IjM4M2IwNWJmLTIwOWQtNDZmMC1hMzE1LTI3ZTIzZGQwMDdlMSIsImMiOjE3NDMwMTE3NTQ1MzEsInMiOjAsInIiOjAsInNiIjowLCJzciI6MCwic2UiOjAsImZzIjoxLCJzcCI6MH0=",
    ),
    (
        "_hjSessionUser_2459276",
        "eyJpZCI6ImM2MmFjN2Y1LWE0NWItNTViOS05NDM0LWNlYmJkODBiMmFmNCIsImNyZWF0ZWQiOjE3NDMwMTE3NTQ1MzAsImV4aXN0aW5nIjp0cnVlfQ==",
    ),
    ("_ga_7F6CMXQNPE", "GS1.1.1743011726.1.1.1743011843.0.0.0"),
];

// -------------------------
// Selectors
// -------------------------

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("bad selector {css:?}: {e:?}"))
}

static RESULT_COUNT: LazyLock<Selector> = LazyLock::new(|| selector("#company-search-results"));
static RESULT_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("a.results-item"));
static NAME: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static ADDRESS: LazyLock<Selector> = LazyLock::new(|| selector("div.fs-lg.lh-md"));
static H2: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static PHONE: LazyLock<Selector> = LazyLock::new(|| selector("div.phone-container.d-none a"));

// -------------------------
// Configuration
// -------------------------

pub fn session_config() -> SessionConfig {
    session_config_for(BASE_URL)
}

/// Site defaults pointed at another host (mirrors, local fixtures).
pub fn session_config_for(base_url: &str) -> SessionConfig {
    let owned = |pairs: &[(&str, &str)]| {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
    };
    SessionConfig {
        site_name: SITE_NAME.to_string(),
        base_url: Some(base_url.to_string()),
        default_headers: owned(DEFAULT_HEADERS),
        default_cookies: owned(DEFAULT_COOKIES),
        delay: DelayWindow::default(),
        retry: RetryPolicy::default(),
        timeout: DEFAULT_TIMEOUT,
    }
}

// -------------------------
// Search pages
// -------------------------

pub fn search_url(base: &str, category: &str, region: &str, page: u32) -> String {
    format!(
        "{}/annuaire/page/{page}/?type={category}&ville={region}&city&lat&lng&loc",
        base.trim_end_matches('/')
    )
}

/// Total hit count from the `"1 - 20 / 45 résultat(s)"` banner.
pub fn parse_result_count(doc: &Html) -> Option<u32> {
    let banner = doc.select(&RESULT_COUNT).next()?;
    let text = joined_text(&banner, "");
    let after_slash = text.split('/').nth(1)?;
    let digits: String = after_slash
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || c.is_whitespace())
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Twenty hits per page. An exact multiple of twenty still yields one
/// extra (empty) page.
pub fn page_count(total_results: u32) -> u32 {
    total_results / RESULTS_PER_PAGE + 1
}

pub fn listing_links(doc: &Html) -> Vec<String> {
    doc.select(&RESULT_ITEM)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}

// -------------------------
// Listing pages
// -------------------------

/// `"street||zip city"` into `(street, zip, city)`. The street is the first
/// segment, zip and city come from the last one.
pub fn split_address(address: &str) -> (String, String, String) {
    let segments: Vec<&str> = address.split("||").collect();
    let street = segments.first().copied().unwrap_or_default();
    let zip_city = segments.last().copied().unwrap_or_default();

    let mut parts = zip_city.split(' ');
    let zip_code = parts.next().unwrap_or_default();
    let city = parts.collect::<Vec<_>>().join(" ");

    (street.to_string(), zip_code.to_string(), city)
}

pub fn parse_listing(doc: &Html, link: &str, category: &str) -> Result<Record, ParseError> {
    let name = doc
        .select(&NAME)
        .next()
        .map(|h1| clean_text(&h1.text().collect::<String>(), false))
        .ok_or(ParseError::MissingName)?;

    let address = doc
        .select(&ADDRESS)
        .next()
        .map(|div| joined_text(&div, "||"))
        .ok_or(ParseError::MissingAddress)?;
    let (street, zip_code, city) = split_address(&address);

    let skills_name = match doc
        .select(&H2)
        .find(|h2| joined_text(h2, " ") == SKILLS_HEADING)
    {
        Some(heading) => {
            let block = next_sibling_with_class(&heading, "div", "cms")
                .ok_or(ParseError::MissingSkillsBlock)?;
            joined_text(&block, "\n ")
        }
        None => String::new(),
    };

    let phone = doc
        .select(&PHONE)
        .next()
        .map(|a| joined_text(&a, ""))
        .unwrap_or_default();

    Ok(Record {
        link: link.to_string(),
        category: category.to_string(),
        name,
        zip_code,
        city,
        street,
        phone,
        skills_name,
    })
}

fn next_sibling_with_class<'a>(
    el: &ElementRef<'a>,
    tag: &str,
    class: &str,
) -> Option<ElementRef<'a>> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sib| sib.value().name() == tag && sib.value().classes().any(|c| c == class))
}

// -------------------------
// Pagination
// -------------------------

/// Walks every result page for one (category, region) pair. Each parsed
/// listing is appended to `output` before the next one is fetched.
///
/// A fetch failure aborts the pair, unless the page count is known and
/// already reached, in which case the records collected so far are returned.
pub async fn scrape_region_category(
    session: &mut Session,
    category: &str,
    region: &str,
    output: &Path,
) -> Result<Vec<Record>, Error> {
    log::info!("Starting scrape for category: {category}, region: {region}");

    let base = session
        .base_url()
        .map(|u| u.as_str().to_string())
        .unwrap_or_default();
    let mut all_results: Vec<Record> = Vec::new();
    let mut pages = Paginator::new(1, None);

    'pages: while let Some(page) = pages.next_page() {
        let url = search_url(&base, category, region, page);
        log::info!("Scraping page {page} for {category} in region {region}");

        let (links, count) = match session.get(&url).await {
            Ok(rsp) => {
                let doc = rsp.document();
                let count = (page == 1).then(|| parse_result_count(&doc)).flatten();
                (listing_links(&doc), count)
            }
            Err(e) => {
                pages.fail(e)?;
                break;
            }
        };

        if page == 1 {
            match count {
                Some(total) => {
                    let estimate = page_count(total);
                    log::info!("Found {total} results, estimated {estimate} pages");
                    pages.set_max_pages(estimate);
                }
                None => {
                    log::warn!(
                        "Could not determine total pages for {category}/{region}; assuming one"
                    );
                    pages.set_max_pages(1);
                }
            }
        }
        let total_pages = pages.max_pages().unwrap_or(1);

        let mut found = 0usize;
        for href in links {
            let link = match session.absolute_url(&href) {
                Ok(link) => link,
                Err(e) => {
                    log::warn!("Skipping listing: {e}");
                    continue;
                }
            };
            log::info!("Scraping company details from: {link}");

            let listing = match session.get(link.as_str()).await {
                Ok(rsp) => rsp,
                Err(e) => {
                    pages.fail(e)?;
                    break 'pages;
                }
            };

            match parse_listing(&listing.document(), link.as_str(), category) {
                Ok(record) => {
                    persist::append_records(slice::from_ref(&record), output, &Record::FIELDS)?;
                    all_results.push(record);
                    found += 1;
                }
                Err(e) => log::error!("Error parsing company details from {link}: {e}"),
            }
        }

        log::info!("Page {page}/{total_pages} completed - {found} companies found");
    }

    log::info!(
        "Completed scrape for {category}/{region} - {} total companies",
        all_results.len()
    );
    Ok(all_results)
}

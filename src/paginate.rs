//! Page walking shared by every paginated scrape.

use std::fmt::Display;

use crate::error::FetchError;
use crate::session::{FetchRequest, Page, Session};

/// Tracks the current page against an optional ceiling. The ceiling may be
/// unknown when the walk starts and set once the first page reveals it.
#[derive(Debug, Clone)]
pub struct Paginator {
    next: u32,
    current: u32,
    max_pages: Option<u32>,
    done: bool,
}

impl Paginator {
    pub fn new(start_page: u32, max_pages: Option<u32>) -> Self {
        Self {
            next: start_page,
            current: start_page,
            max_pages,
            done: false,
        }
    }

    /// Number of the page to fetch next, `None` once the ceiling is passed or
    /// the walk was stopped.
    pub fn next_page(&mut self) -> Option<u32> {
        if self.done || self.max_pages.is_some_and(|max| self.next > max) {
            return None;
        }
        self.current = self.next;
        self.next += 1;
        Some(self.current)
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }

    pub fn set_max_pages(&mut self, max_pages: u32) {
        self.max_pages = Some(max_pages);
    }

    pub fn stop(&mut self) {
        self.done = true;
    }

    /// A failure on the last known page ends the walk quietly; any other
    /// failure is handed back to the caller.
    pub fn fail<E: Display>(&mut self, e: E) -> Result<(), E> {
        let page = self.current;
        match self.max_pages {
            Some(max) if page >= max => {
                log::warn!("Error processing page {page}: {e}; page ceiling reached, stopping");
                self.done = true;
                Ok(())
            }
            _ => {
                log::error!("Error processing page {page}: {e}");
                Err(e)
            }
        }
    }
}

/// Fetches `start_page..=max_pages`, handing each page to `process` and
/// collecting what it returns. A `{page}` placeholder in `url` is replaced by
/// the page number, and the number is also sent as the `page_param` query
/// parameter when one is given. The walk ends early when `stop` returns true
/// for a page and its items.
pub async fn paginate<T, P, S>(
    session: &mut Session,
    url: &str,
    page_param: Option<&str>,
    start_page: u32,
    max_pages: u32,
    mut process: P,
    mut stop: S,
) -> Result<Vec<T>, FetchError>
where
    P: FnMut(&Page) -> Vec<T>,
    S: FnMut(&Page, &[T]) -> bool,
{
    log::info!("Starting pagination from page {start_page} to max {max_pages}");

    let mut results = Vec::new();
    let mut pages = Paginator::new(start_page, Some(max_pages));
    while let Some(page) = pages.next_page() {
        log::debug!("Processing page {page}");

        let mut request = FetchRequest::get(url.replace("{page}", &page.to_string()));
        if let Some(param) = page_param {
            request = request.param(param, page.to_string());
        }
        let rsp = match session.send(request).await {
            Ok(rsp) => rsp,
            Err(e) => {
                pages.fail(e)?;
                break;
            }
        };

        let items = process(&rsp);
        log::info!("Page {page} processed - {} items found", items.len());
        let done = stop(&rsp, &items);
        results.extend(items);
        if done {
            log::info!("Stop condition met at page {page}");
            pages.stop();
        }
    }

    log::info!("Pagination completed - {} total items collected", results.len());
    Ok(results)
}

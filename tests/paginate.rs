mod common;

use annuaire::{Error, FetchError, Page, Session, SessionConfig, paginate};
use common::{Stub, quick};
use scraper::Selector;

fn items(page: &Page) -> Vec<String> {
    let li = Selector::parse("li").unwrap();
    page.document()
        .select(&li)
        .map(|el| el.text().collect::<String>())
        .collect()
}

fn list(entries: &[&str]) -> String {
    let lis: String = entries.iter().map(|e| format!("<li>{e}</li>")).collect();
    format!("<html><body><ul>{lis}</ul></body></html>")
}

fn session_for(stub: &Stub) -> Session {
    Session::new(quick(SessionConfig {
        base_url: Some(stub.base.clone()),
        ..SessionConfig::default()
    }))
    .unwrap()
}

#[tokio::test]
async fn stops_on_the_first_empty_page() {
    let stub = Stub::spawn(|target, _| match target {
        "/list?page=1" => (200, list(&["a", "b"])),
        "/list?page=2" => (200, list(&["c"])),
        _ => (200, list(&[])),
    })
    .await;
    let mut session = session_for(&stub);

    let found = paginate(
        &mut session,
        "/list",
        Some("page"),
        1,
        10,
        items,
        |_, page_items| page_items.is_empty(),
    )
    .await
    .unwrap();

    assert_eq!(found, vec!["a", "b", "c"]);
    assert_eq!(stub.targets(), vec!["/list?page=1", "/list?page=2", "/list?page=3"]);
}

#[tokio::test]
async fn fills_the_page_placeholder_up_to_the_ceiling() {
    let stub = Stub::spawn(|target, _| (200, list(&[target]))).await;
    let mut session = session_for(&stub);

    let found = paginate(&mut session, "/p/{page}/", None, 2, 4, items, |_, _| false)
        .await
        .unwrap();

    assert_eq!(found, vec!["/p/2/", "/p/3/", "/p/4/"]);
}

#[tokio::test]
async fn failure_at_the_ceiling_keeps_what_was_collected() {
    let stub = Stub::spawn(|target, _| match target {
        "/p/1/" => (200, list(&["a"])),
        _ => (500, String::new()),
    })
    .await;
    let mut session = session_for(&stub);

    let found = paginate(&mut session, "/p/{page}/", None, 1, 2, items, |_, _| false)
        .await
        .unwrap();
    assert_eq!(found, vec!["a"]);

    let err = paginate(&mut session, "/p/{page}/", None, 1, 3, items, |_, _| false)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Exhausted { .. }));
    assert!(matches!(Error::from(err), Error::Fetch(_)));
}

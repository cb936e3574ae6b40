//! Fallback-chain scenarios against a local canned-response server.

mod common;

use common::{TestServer, unreachable_url};

use roblox_avail::budget::RateBudget;
use roblox_avail::check::{Client, ResolveError, Status, bulk_resolve, resolve};

fn search_page_with_bob() -> String {
    r#"{
        "previousPageCursor": null,
        "nextPageCursor": null,
        "data": [
            {"hasVerifiedBadge": false, "id": 156, "name": "Bob", "displayName": "Bobby"},
            {"hasVerifiedBadge": false, "id": 157, "name": "bobcat"}
        ]
    }"#
    .to_string()
}

#[test]
fn taken_via_search_when_bulk_lookup_is_down() {
    let server = TestServer::start(|request| {
        if request.method == "POST" {
            (500, "{}".to_string())
        } else {
            (200, search_page_with_bob())
        }
    });
    let client = Client::with_endpoints(server.url(), unreachable_url());
    let budget = RateBudget::new();

    let result = resolve(&client, &budget, "bob").expect("resolve");

    assert_eq!(result.status, Status::Taken);
    assert_eq!(result.available, Some(false));
    assert_eq!(result.username, "bob");
    assert_eq!(result.user_id, Some(156));
    assert_eq!(result.display_name.as_deref(), Some("Bobby"));
    assert_eq!(result.error, None);
    assert_eq!(budget.remaining(), budget.max() - 1);

    let hits = server.hits();
    assert!(hits[0].starts_with("POST /v1/usernames/users"), "{hits:?}");
    assert!(hits[1].starts_with("GET /v1/users/search"), "{hits:?}");
}

#[test]
fn no_matching_entry_means_available() {
    let server = TestServer::start(|_| (200, r#"{"data": []}"#.to_string()));
    let client = Client::with_endpoints(server.url(), unreachable_url());
    let budget = RateBudget::new();

    let result = resolve(&client, &budget, "xz7qq1").expect("resolve");

    assert_eq!(result.status, Status::Available);
    assert_eq!(result.available, Some(true));
    assert_eq!(result.username, "xz7qq1");
    assert_eq!(result.error, None);
    // First strategy answered; nothing fell through to the search.
    assert_eq!(server.hits().len(), 1);
}

#[test]
fn substring_matches_never_count() {
    let server = TestServer::start(|request| {
        if request.method == "POST" {
            (500, "{}".to_string())
        } else {
            (200, search_page_with_bob())
        }
    });
    let client = Client::with_endpoints(server.url(), unreachable_url());
    let budget = RateBudget::new();

    // "bobc" is a prefix of "bobcat" but matches no entry in full.
    let result = resolve(&client, &budget, "bobc").expect("resolve");
    assert_eq!(result.status, Status::Available);
}

#[test]
fn relay_rescues_a_dead_search() {
    let server = TestServer::start(|request| {
        if request.target.starts_with("/raw") {
            (200, search_page_with_bob())
        } else {
            (500, "{}".to_string())
        }
    });
    let client = Client::with_endpoints(server.url(), format!("{}/raw", server.url()));
    let budget = RateBudget::new();

    let result = resolve(&client, &budget, "bob").expect("resolve");

    assert_eq!(result.status, Status::Taken);
    let hits = server.hits();
    assert_eq!(hits.len(), 3);
    assert!(
        hits[2].starts_with("GET /raw?url=") && hits[2].contains("keyword"),
        "{hits:?}"
    );
}

#[test]
fn every_strategy_down_degrades_to_error() {
    let dead = unreachable_url();
    let client = Client::with_endpoints(dead.clone(), format!("{dead}/raw"));
    let budget = RateBudget::new();

    let result = resolve(&client, &budget, "bob").expect("resolve");

    assert_eq!(result.status, Status::Error);
    assert_eq!(result.available, None);
    assert!(result.error.as_deref().is_some_and(|e| !e.is_empty()));
    // The whole chain costs one unit, not one per attempt.
    assert_eq!(budget.remaining(), budget.max() - 1);
}

#[test]
fn sanitized_input_is_what_gets_checked() {
    let server = TestServer::start(|_| (200, r#"{"data": []}"#.to_string()));
    let client = Client::with_endpoints(server.url(), unreachable_url());
    let budget = RateBudget::new();

    let result = resolve(&client, &budget, "  xz7qq1  ").expect("resolve");
    assert_eq!(result.username, "xz7qq1");
}

#[test]
fn invalid_candidate_fails_before_any_charge_or_traffic() {
    let server = TestServer::start(|_| (200, r#"{"data": []}"#.to_string()));
    let client = Client::with_endpoints(server.url(), unreachable_url());
    let budget = RateBudget::new();

    match resolve(&client, &budget, "ab") {
        Err(ResolveError::InvalidName(_)) => {}
        other => panic!("expected InvalidName, got {other:?}"),
    }
    assert_eq!(budget.remaining(), budget.max());
    assert!(server.hits().is_empty());
}

#[test]
fn exhausted_budget_fails_before_any_traffic() {
    let server = TestServer::start(|_| (200, r#"{"data": []}"#.to_string()));
    let client = Client::with_endpoints(server.url(), unreachable_url());
    let budget = RateBudget::with_limits(1, std::time::Duration::from_secs(60));

    resolve(&client, &budget, "alpha").expect("first call fits the budget");
    match resolve(&client, &budget, "gamma") {
        Err(ResolveError::RateLimited(_)) => {}
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(server.hits().len(), 1);
}

#[test]
fn bulk_preserves_input_order_and_reports_progress() {
    let server = TestServer::start(|_| (200, r#"{"data": []}"#.to_string()));
    let client = Client::with_endpoints(server.url(), unreachable_url());
    let budget = RateBudget::new();

    let names = vec!["alpha".to_string(), "b+".to_string(), "gamma".to_string()];
    let mut progress = Vec::new();
    let results = bulk_resolve(&client, &budget, &names, |position, total, result| {
        progress.push((position, total, result.status));
    });

    let usernames: Vec<&str> = results.iter().map(|r| r.username.as_str()).collect();
    assert_eq!(usernames, ["alpha", "b+", "gamma"]);
    assert_eq!(results[0].status, Status::Available);
    assert_eq!(results[1].status, Status::Error);
    assert!(
        results[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("invalid")),
        "{:?}",
        results[1].error
    );
    assert_eq!(results[2].status, Status::Available);

    // Progress fires for error entries too, in order.
    assert_eq!(
        progress,
        vec![
            (1, 3, Status::Available),
            (2, 3, Status::Error),
            (3, 3, Status::Available),
        ]
    );
}

mod common;

use axum::http::StatusCode;
use boxcloud_http::{
    BoxApiError, ListQuery, PageState, Pageable, PagingParameters, SortParameters,
    DEFAULT_COLLABORATION_LIMIT, DEFAULT_LIMIT,
};
use common::{spawn_server, MockResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: String,
}

struct TrashItems;

impl Pageable for TrashItems {
    type Item = Item;

    fn list_path(&self) -> String {
        "folders/trash/items".to_owned()
    }

    fn default_paging(&self) -> PagingParameters {
        PagingParameters::marker(DEFAULT_LIMIT)
    }
}

struct Collaborations;

impl Pageable for Collaborations {
    type Item = Item;

    fn list_path(&self) -> String {
        "files/5/collaborations".to_owned()
    }

    fn default_paging(&self) -> PagingParameters {
        PagingParameters::offset(DEFAULT_COLLABORATION_LIMIT)
    }
}

#[test]
fn offset_paging_fetches_lazily_page_by_page() {
    let server = spawn_server(vec![
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "1"}], "offset": 0, "limit": 1, "total_count": 2}),
        ),
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "2"}], "offset": 1, "limit": 1, "total_count": 2}),
        ),
    ]);
    let client = server.client();
    let query = ListQuery::new().with_paging(PagingParameters::offset(100));
    let mut items = client
        .list::<Item>("groups", query)
        .expect("query must be valid")
        .into_iter();

    assert_eq!(server.hits(), 0);
    assert_eq!(items.state(), PageState::Init);

    let first = items.next().expect("first item").expect("first item ok");
    assert_eq!(first.id, "1");
    assert_eq!(server.hits(), 1);

    let second = items.next().expect("second item").expect("second item ok");
    assert_eq!(second.id, "2");
    assert_eq!(server.hits(), 2);

    assert!(items.next().is_none());
    assert!(items.next().is_none());
    assert_eq!(items.state(), PageState::Exhausted);
    assert_eq!(server.hits(), 2);

    let requests = server.requests();
    assert_eq!(requests[0].path, "/2.0/groups");
    assert_eq!(requests[0].query_param("limit"), Some("100"));
    assert_eq!(requests[0].query_param("offset"), Some("0"));
    assert_eq!(requests[1].query_param("limit"), Some("100"));
    assert_eq!(requests[1].query_param("offset"), Some("1"));
}

#[test]
fn marker_paging_follows_next_marker() {
    let server = spawn_server(vec![
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "a"}, {"id": "b"}], "limit": 2, "next_marker": "m2"}),
        ),
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "c"}], "limit": 2, "next_marker": null}),
        ),
    ]);
    let client = server.client();

    let ids: Vec<String> = client
        .iterate(&TrashItems, ListQuery::new())
        .expect("query must be valid")
        .into_iter()
        .map(|item| item.expect("item must decode").id)
        .collect();

    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(server.hits(), 2);

    let requests = server.requests();
    assert_eq!(requests[0].path, "/2.0/folders/trash/items");
    assert_eq!(requests[0].query_param("usemarker"), Some("true"));
    assert_eq!(requests[0].query_param("limit"), Some("1000"));
    assert_eq!(requests[0].query_param("marker"), None);
    assert_eq!(requests[1].query_param("usemarker"), Some("true"));
    assert_eq!(requests[1].query_param("marker"), Some("m2"));
}

#[test]
fn marker_paging_with_sort_fails_before_any_request() {
    let server = spawn_server(Vec::new());
    let client = server.client();
    let query = ListQuery::new()
        .with_paging(PagingParameters::marker(100))
        .with_sort(SortParameters::ascending("name"));

    let err = client
        .list::<Item>("folders/0/items", query)
        .expect_err("marker paging with sort must fail");

    assert!(matches!(err, BoxApiError::Configuration(_)));
    assert_eq!(server.hits(), 0);
}

#[test]
fn sort_fields_and_filters_are_sent_with_every_page() {
    let server = spawn_server(vec![
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "1"}], "offset": 0, "limit": 1, "total_count": 2}),
        ),
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "2"}], "offset": 1, "limit": 1, "total_count": 2}),
        ),
    ]);
    let client = server.client();
    let query = ListQuery::new()
        .with_sort(SortParameters::descending("name"))
        .with_fields(["name", "description"])
        .with_param("filter_term", "team");

    let count = client
        .iterate(&Collaborations, query)
        .expect("query must be valid")
        .into_iter()
        .filter(Result::is_ok)
        .count();

    assert_eq!(count, 2);
    for request in server.requests() {
        assert_eq!(request.query_param("sort"), Some("name"));
        assert_eq!(request.query_param("direction"), Some("DESC"));
        assert_eq!(request.query_param("fields"), Some("name,description"));
        assert_eq!(request.query_param("filter_term"), Some("team"));
        assert_eq!(request.query_param("limit"), Some("100"));
        assert_eq!(request.query_param("usemarker"), None);
    }
}

#[test]
fn error_is_yielded_once_and_ends_iteration() {
    let server = spawn_server(vec![
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "1"}], "offset": 0, "limit": 1, "total_count": 3}),
        ),
        MockResponse::json(
            StatusCode::FORBIDDEN,
            json!({"type": "error", "code": "access_denied_insufficient_permissions"}),
        ),
        MockResponse::json(
            StatusCode::OK,
            json!({"entries": [{"id": "3"}], "offset": 2, "limit": 1, "total_count": 3}),
        ),
    ]);
    let client = server.client();
    let mut items = client
        .list::<Item>("groups", ListQuery::new())
        .expect("query must be valid")
        .into_iter();

    assert!(matches!(items.next(), Some(Ok(_))));
    match items.next() {
        Some(Err(BoxApiError::Api { status, code, .. })) => {
            assert_eq!(status, 403);
            assert_eq!(
                code.as_deref(),
                Some("access_denied_insufficient_permissions")
            );
        }
        other => panic!("expected api error, got {other:?}"),
    }
    assert!(items.next().is_none());
    assert!(items.next().is_none());
    assert_eq!(items.state(), PageState::Failed);
    assert_eq!(server.hits(), 2);
}

#[test]
fn empty_page_ends_iteration() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"entries": [], "offset": 0, "limit": 2, "total_count": 10}),
    )]);
    let client = server.client();

    let mut items = client
        .list::<Item>("groups", ListQuery::new())
        .expect("query must be valid")
        .into_iter();

    assert!(items.next().is_none());
    assert_eq!(server.hits(), 1);
}

#[test]
fn entry_decode_failure_stops_iteration() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"entries": [{"id": 5}, {"id": "6"}], "offset": 0, "limit": 100, "total_count": 2}),
    )]);
    let client = server.client();

    let mut items = client
        .list::<Item>("groups", ListQuery::new())
        .expect("query must be valid")
        .into_iter();

    assert!(matches!(
        items.next(),
        Some(Err(BoxApiError::Deserialization(_)))
    ));
    assert!(items.next().is_none());
}

#[test]
fn missing_entries_is_a_decode_error() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"total_count": 0}),
    )]);
    let client = server.client();

    let mut items = client
        .list::<Item>("groups", ListQuery::new())
        .expect("query must be valid")
        .into_iter();

    assert!(matches!(
        items.next(),
        Some(Err(BoxApiError::Deserialization(_)))
    ));
    assert!(items.next().is_none());
}

#[test]
fn iterable_restarts_from_first_page() {
    let page = json!({"entries": [{"id": "1"}], "offset": 0, "limit": 100, "total_count": 1});
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::OK, page.clone()),
        MockResponse::json(StatusCode::OK, page),
    ]);
    let client = server.client();
    let iterable = client
        .list::<Item>("groups", ListQuery::new())
        .expect("query must be valid");

    let first: Vec<Item> = (&iterable)
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("first pass");
    let second: Vec<Item> = iterable.iter().collect::<Result<_, _>>().expect("second pass");

    assert_eq!(first, second);
    assert_eq!(server.hits(), 2);
    for request in server.requests() {
        assert_eq!(request.query_param("offset"), Some("0"));
        assert_eq!(request.query_param("limit"), Some("1000"));
    }
}

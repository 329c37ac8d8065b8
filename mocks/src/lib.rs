use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;
use url::Url;

/// Act as the user approving the app: take the authorization URL the picker
/// opened and hit its redirect URI with `code` and the matching state.
///
/// Must be called from within a tokio runtime.
pub fn follow_authorization(authorize_url: &str, code: &str) {
    let url = Url::parse(authorize_url).expect("authorization url");
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    };
    let target = format!("{}?code={}&state={}", param("redirect_uri"), code, param("state"));
    tokio::spawn(async move {
        let _ = reqwest::get(target).await;
    });
}

/// Build a Graph API media object as returned by `/me/media`.
pub fn media_json(id: &str, media_type: &str) -> serde_json::Value {
    let mut item = json!({
        "id": id,
        "caption": format!("caption {}", id),
        "media_type": media_type,
        "media_url": format!("https://cdn.example.com/{}.jpg", id),
        "permalink": format!("https://www.instagram.com/p/{}/", id),
        "timestamp": "2023-01-01T10:00:00+0000",
        "username": "tester"
    });
    if media_type == "VIDEO" {
        item["media_url"] = json!(format!("https://cdn.example.com/{}.mp4", id));
        item["thumbnail_url"] = json!(format!("https://cdn.example.com/{}_thumb.jpg", id));
    }
    item
}

/// Create a mock server for the OAuth endpoints.
///
/// POST `/oauth/access_token` answers with `short_token`, and the long-lived
/// exchange on GET `/access_token` answers with `long_token`. Each endpoint
/// expects exactly one call.
pub fn token_server(short_token: &str, long_token: &str) -> Server {
    let server = Server::run();
    expect_code_exchange(&server, short_token, long_token);
    server
}

/// Expect one authorization code exchange followed by one long-lived token
/// upgrade on the provided server.
pub fn expect_code_exchange(server: &Server, short_token: &str, long_token: &str) {
    expect_authorization_code(server, short_token_json(short_token));
    expect_upgrade(server, json_encoded(long_lived_json(long_token)));
}

/// Like [`expect_code_exchange`], but the code exchange answers in the
/// `{"data": [...]}` envelope some Instagram app types use.
pub fn expect_wrapped_code_exchange(server: &Server, short_token: &str, long_token: &str) {
    expect_authorization_code(server, json!({ "data": [short_token_json(short_token)] }));
    expect_upgrade(server, json_encoded(long_lived_json(long_token)));
}

/// Expect one authorization code exchange whose long-lived upgrade is rejected.
pub fn expect_failed_upgrade(server: &Server, short_token: &str) {
    expect_authorization_code(server, short_token_json(short_token));
    expect_upgrade(server, status_code(400).body(graph_error("Unsupported request - method type: get", 100).to_string()));
}

/// Expect one refresh of a long-lived token on the provided server.
pub fn expect_refresh(server: &Server, new_token: &str) {
    expect_refresh_response(server, json_encoded(long_lived_json(new_token)));
}

/// Expect one refresh attempt that Instagram rejects.
pub fn expect_failed_refresh(server: &Server) {
    expect_refresh_response(server, status_code(400).body(graph_error("Invalid OAuth access token.", 190).to_string()));
}

fn short_token_json(short_token: &str) -> serde_json::Value {
    json!({
        "access_token": short_token,
        "user_id": 17841400000000000u64
    })
}

fn long_lived_json(token: &str) -> serde_json::Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": 5_184_000
    })
}

fn graph_error(message: &str, code: u32) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": "OAuthException",
            "code": code,
            "fbtrace_id": "AbCdEf"
        }
    })
}

fn expect_authorization_code(server: &Server, body: serde_json::Value) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/oauth/access_token"),
            request::body(url_decoded(contains(("grant_type", "authorization_code")))),
        ])
        .respond_with(json_encoded(body)),
    );
}

fn expect_upgrade(server: &Server, response: impl Responder + 'static) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/access_token"),
            request::query(url_decoded(contains(("grant_type", "ig_exchange_token")))),
        ])
        .respond_with(response),
    );
}

fn expect_refresh_response(server: &Server, response: impl Responder + 'static) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/refresh_access_token"),
            request::query(url_decoded(contains(("grant_type", "ig_refresh_token")))),
        ])
        .respond_with(response),
    );
}

/// Create an empty mock server for Graph API endpoints.
pub fn graph_server() -> Server {
    Server::run()
}

/// Expect GET `/me/media` with `token` once per page. Page `n` (zero based) is
/// served for cursor `c{n}`, the first page for a request without cursor.
/// Every page but the last carries a `paging.next` link.
pub fn expect_media_pages(server: &Server, token: &str, pages: Vec<Vec<serde_json::Value>>) {
    let count = pages.len();
    for (n, items) in pages.into_iter().enumerate() {
        let mut body = json!({ "data": items });
        if n + 1 < count {
            let after = format!("c{}", n + 1);
            body["paging"] = json!({
                "cursors": { "before": "b", "after": after },
                "next": format!("https://graph.instagram.com/me/media?after={}", after)
            });
        } else {
            body["paging"] = json!({ "cursors": { "before": "b", "after": "end" } });
        }

        let matcher = if n == 0 {
            Expectation::matching(all_of![
                request::method_path("GET", "/me/media"),
                request::query(url_decoded(contains(("access_token", eq(token.to_string()))))),
                request::query(url_decoded(not(contains(key("after"))))),
            ])
        } else {
            let after = format!("c{}", n);
            Expectation::matching(all_of![
                request::method_path("GET", "/me/media"),
                request::query(url_decoded(contains(("access_token", eq(token.to_string()))))),
                request::query(url_decoded(contains(("after", eq(after))))),
            ])
        };
        server.expect(matcher.respond_with(json_encoded(body)));
    }
}

/// Expect `times` GET `/me/media` requests with `token`, each rejected with an
/// expired token error.
pub fn expect_unauthorized(server: &Server, token: &str, times: usize) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/me/media"),
            request::query(url_decoded(contains(("access_token", eq(token.to_string()))))),
        ])
            .times(times)
            .respond_with(status_code(400).body(
                graph_error("Error validating access token: Session has expired.", 190).to_string(),
            )),
    );
}

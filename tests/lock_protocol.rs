//
// End to end tests of the locking protocol, driving the handler with
// plain http requests the way a webdav client would.
//
use futures_util::StreamExt;
use http::{Request, Response, StatusCode};

use lockdav::body::Body;
use lockdav::fs::memfs::MemFs;
use lockdav::ls::memls::MemLs;
use lockdav::DavHandler;

const LOCKINFO_EXCLUSIVE: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
    <D:lockinfo xmlns:D="DAV:">
      <D:lockscope><D:exclusive/></D:lockscope>
      <D:locktype><D:write/></D:locktype>
      <D:owner><D:href>http://example.com/~user</D:href></D:owner>
    </D:lockinfo>"#;

const LOCKINFO_SHARED: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
    <D:lockinfo xmlns:D="DAV:">
      <D:lockscope><D:shared/></D:lockscope>
      <D:locktype><D:write/></D:locktype>
    </D:lockinfo>"#;

fn handler() -> DavHandler {
    let _ = env_logger::builder().is_test(true).try_init();
    DavHandler::builder(MemFs::new())
        .locksystem(MemLs::new())
        .principal("alice")
        .build()
}

fn req(method: &str, uri: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(body.into()).unwrap()
}

async fn body_string(res: Response<Body>) -> String {
    let mut body = res.into_body();
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    String::from_utf8(out).unwrap()
}

// Lock-Token response header, without the angle brackets.
fn lock_token(res: &Response<Body>) -> String {
    let v = res
        .headers()
        .get("lock-token")
        .expect("Lock-Token header")
        .to_str()
        .unwrap();
    v.trim_start_matches('<').trim_end_matches('>').to_string()
}

#[tokio::test]
async fn lock_unlock_cycle() {
    let dav = handler();
    let res = dav
        .handle(req("PUT", "/file.txt", &[], "hello"))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    // take an exclusive lock.
    let res = dav
        .handle(req("LOCK", "/file.txt", &[], LOCKINFO_EXCLUSIVE))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = lock_token(&res);
    assert!(token.starts_with("opaquelocktoken:"));
    let body = body_string(res).await;
    assert!(body.contains("D:lockdiscovery"));
    assert!(body.contains(&token));
    assert!(body.contains("http://example.com/~user"));

    // a second exclusive lock is refused.
    let res = dav
        .handle(req("LOCK", "/file.txt", &[], LOCKINFO_EXCLUSIVE))
        .await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    let body = body_string(res).await;
    assert!(body.contains("lock-token-submitted"));

    // UNLOCK without a Lock-Token header is a client error.
    let res = dav.handle(req("UNLOCK", "/file.txt", &[], Body::empty())).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // UNLOCK with the token releases the lock.
    let hdr = format!("<{token}>");
    let res = dav
        .handle(req("UNLOCK", "/file.txt", &[("Lock-Token", &hdr)], Body::empty()))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // and DELETE now succeeds without any token.
    let res = dav.handle(req("DELETE", "/file.txt", &[], Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn deep_lock_covers_children() {
    let dav = handler();
    assert_eq!(
        dav.handle(req("MKCOL", "/dir", &[], Body::empty())).await.status(),
        StatusCode::CREATED
    );
    assert_eq!(
        dav.handle(req("PUT", "/dir/file.txt", &[], "x")).await.status(),
        StatusCode::CREATED
    );

    // depth: infinity lock on the collection.
    let res = dav
        .handle(req(
            "LOCK",
            "/dir",
            &[("Depth", "infinity")],
            LOCKINFO_EXCLUSIVE,
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = lock_token(&res);

    // the child is covered: DELETE without the token is refused.
    let res = dav
        .handle(req("DELETE", "/dir/file.txt", &[], Body::empty()))
        .await;
    assert_eq!(res.status(), StatusCode::LOCKED);

    // submitting the token via a tagged If list lets it through.
    let ifh = format!("</dir> (<{token}>)");
    let res = dav
        .handle(req("DELETE", "/dir/file.txt", &[("If", &ifh)], Body::empty()))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn delete_collection_cascades_descendant_locks() {
    let dav = handler();
    assert_eq!(
        dav.handle(req("MKCOL", "/dir", &[], Body::empty())).await.status(),
        StatusCode::CREATED
    );
    assert_eq!(
        dav.handle(req("PUT", "/dir/file.txt", &[], "x")).await.status(),
        StatusCode::CREATED
    );

    // a deep shared lock on the collection, and a shared lock on a
    // descendant; both can coexist.
    let res = dav
        .handle(req(
            "LOCK",
            "/dir",
            &[("Depth", "infinity")],
            LOCKINFO_SHARED,
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let t1 = lock_token(&res);
    let res = dav
        .handle(req("LOCK", "/dir/file.txt", &[], LOCKINFO_SHARED))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let t2 = lock_token(&res);

    // deleting the collection needs both tokens.
    let res = dav.handle(req("DELETE", "/dir", &[], Body::empty())).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    let ifh = format!("(<{t1}>) (<{t2}>)");
    let res = dav
        .handle(req("DELETE", "/dir", &[("If", &ifh)], Body::empty()))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // both locks went with the tree: recreating and exclusively locking
    // the same paths is not blocked by stale records.
    assert_eq!(
        dav.handle(req("MKCOL", "/dir", &[], Body::empty())).await.status(),
        StatusCode::CREATED
    );
    let res = dav.handle(req("LOCK", "/dir", &[], LOCKINFO_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn lock_malformed_body_is_bad_request() {
    let dav = handler();
    dav.handle(req("PUT", "/mf.txt", &[], "x")).await;

    // well-formed XML, but not a lockinfo document.
    let res = dav.handle(req("LOCK", "/mf.txt", &[], "<foo/>")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // not XML at all.
    let res = dav.handle(req("LOCK", "/mf.txt", &[], "garbage")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // lockinfo with a non-write locktype.
    let read_lock = r#"<D:lockinfo xmlns:D="DAV:">
          <D:lockscope><D:exclusive/></D:lockscope>
          <D:locktype><D:read/></D:locktype>
        </D:lockinfo>"#;
    let res = dav.handle(req("LOCK", "/mf.txt", &[], read_lock)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // nothing got locked along the way.
    let res = dav.handle(req("PUT", "/mf.txt", &[], "y")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn put_requires_correct_token() {
    let dav = handler();
    dav.handle(req("PUT", "/c.txt", &[], "v1")).await;
    let res = dav.handle(req("LOCK", "/c.txt", &[], LOCKINFO_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = lock_token(&res);

    // no token at all.
    let res = dav.handle(req("PUT", "/c.txt", &[], "v2")).await;
    assert_eq!(res.status(), StatusCode::LOCKED);

    // a syntactically fine but wrong token.
    let res = dav
        .handle(req(
            "PUT",
            "/c.txt",
            &[("If", "(<opaquelocktoken:00000000-0000-0000-0000-000000000000>)")],
            "v2",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::LOCKED);

    // the right token.
    let ifh = format!("(<{token}>)");
    let res = dav
        .handle(req("PUT", "/c.txt", &[("If", &ifh)], "v2"))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn lock_refresh_keeps_token() {
    let dav = handler();
    dav.handle(req("PUT", "/r.txt", &[], "x")).await;
    let res = dav
        .handle(req(
            "LOCK",
            "/r.txt",
            &[("Timeout", "Second-600")],
            LOCKINFO_EXCLUSIVE,
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = lock_token(&res);

    // refresh: LOCK without a body, token in the If header.
    let ifh = format!("(<{token}>)");
    let res = dav
        .handle(req(
            "LOCK",
            "/r.txt",
            &[("If", &ifh), ("Timeout", "Second-3600")],
            Body::empty(),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(lock_token(&res), token);
    let body = body_string(res).await;
    assert!(body.contains("Second-3600"));

    // a refresh without any matching token is a client error.
    let res = dav
        .handle(req(
            "LOCK",
            "/r.txt",
            &[("If", "(<opaquelocktoken:11111111-1111-1111-1111-111111111111>)")],
            Body::empty(),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn lock_unmapped_url_creates_resource() {
    let dav = handler();
    let res = dav.handle(req("LOCK", "/new.txt", &[], LOCKINFO_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let token = lock_token(&res);

    // the empty resource exists now.
    let res = dav.handle(req("HEAD", "/new.txt", &[], Body::empty())).await;
    assert_eq!(res.status(), StatusCode::OK);

    // and it is locked.
    let res = dav.handle(req("PUT", "/new.txt", &[], "data")).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    let ifh = format!("(<{token}>)");
    let res = dav.handle(req("PUT", "/new.txt", &[("If", &ifh)], "data")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn shared_locks_coexist() {
    let dav = handler();
    dav.handle(req("PUT", "/s.txt", &[], "x")).await;

    let res = dav.handle(req("LOCK", "/s.txt", &[], LOCKINFO_SHARED)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = dav.handle(req("LOCK", "/s.txt", &[], LOCKINFO_SHARED)).await;
    assert_eq!(res.status(), StatusCode::OK);

    // but an exclusive lock is refused while shared locks exist.
    let res = dav.handle(req("LOCK", "/s.txt", &[], LOCKINFO_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn unlock_wrong_token_is_conflict() {
    let dav = handler();
    dav.handle(req("PUT", "/u.txt", &[], "x")).await;
    let res = dav.handle(req("LOCK", "/u.txt", &[], LOCKINFO_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = dav
        .handle(req(
            "UNLOCK",
            "/u.txt",
            &[("Lock-Token", "<opaquelocktoken:22222222-2222-2222-2222-222222222222>")],
            Body::empty(),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_string(res).await;
    assert!(body.contains("lock-token-matches-request-uri"));
}

#[tokio::test]
async fn propfind_reports_lockdiscovery() {
    let dav = handler();
    dav.handle(req("PUT", "/p.txt", &[], "x")).await;
    let res = dav.handle(req("LOCK", "/p.txt", &[], LOCKINFO_EXCLUSIVE)).await;
    let token = lock_token(&res);

    let propfind = r#"<?xml version="1.0"?>
        <D:propfind xmlns:D="DAV:">
          <D:prop><D:lockdiscovery/><D:supportedlock/></D:prop>
        </D:propfind>"#;
    let res = dav
        .handle(req("PROPFIND", "/p.txt", &[("Depth", "0")], propfind))
        .await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    assert!(body.contains("D:activelock"));
    assert!(body.contains(&token));
    assert!(body.contains("D:lockentry"));

    // after unlock, lockdiscovery is empty again.
    let hdr = format!("<{token}>");
    dav.handle(req("UNLOCK", "/p.txt", &[("Lock-Token", &hdr)], Body::empty()))
        .await;
    let res = dav
        .handle(req("PROPFIND", "/p.txt", &[("Depth", "0")], propfind))
        .await;
    let body = body_string(res).await;
    assert!(!body.contains("D:activelock"));
}

#[tokio::test]
async fn move_drops_source_locks() {
    let dav = handler();
    dav.handle(req("PUT", "/m.txt", &[], "x")).await;
    let res = dav.handle(req("LOCK", "/m.txt", &[], LOCKINFO_EXCLUSIVE)).await;
    let token = lock_token(&res);

    let ifh = format!("(<{token}>)");
    let res = dav
        .handle(req(
            "MOVE",
            "/m.txt",
            &[("Destination", "/m2.txt"), ("If", &ifh)],
            Body::empty(),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    // the destination is not locked.
    let res = dav.handle(req("PUT", "/m2.txt", &[], "y")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn options_advertises_class_2() {
    let dav = handler();
    let res = dav.handle(req("OPTIONS", "/", &[], Body::empty())).await;
    assert_eq!(res.status(), StatusCode::OK);
    let dav_header = res.headers().get("DAV").unwrap().to_str().unwrap();
    assert!(dav_header.contains('2'));
    let allow = res.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("LOCK"));
    assert!(allow.contains("UNLOCK"));
}

#[tokio::test]
async fn prefix_is_stripped() {
    let dav = DavHandler::builder(MemFs::new())
        .locksystem(MemLs::new())
        .strip_prefix("/dav")
        .build();
    let res = dav.handle(req("PUT", "/dav/f.txt", &[], "x")).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = dav.handle(req("LOCK", "/dav/f.txt", &[], LOCKINFO_EXCLUSIVE)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_string(res).await;
    // the lockroot includes the prefix.
    assert!(body.contains("/dav/f.txt"));

    // so does the href in the lock-token-submitted error body.
    let res = dav.handle(req("PUT", "/dav/f.txt", &[], "y")).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    let body = body_string(res).await;
    assert!(body.contains("<D:href>/dav/f.txt</D:href>"));

    // outside the prefix is rejected.
    let res = dav.handle(req("PUT", "/other/f.txt", &[], "x")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

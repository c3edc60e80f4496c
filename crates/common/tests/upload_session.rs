//! Integration tests for the upload session state machine

mod common;

use std::time::{Duration, UNIX_EPOCH};

use ::common::auth::RequestLedger;
use ::common::reason::ErrorCode;
use ::common::upload::{Inbound, Reply, ReplyKind, SessionState};
use common::{close, frame, open_upload, option, text, token, U1_TOKEN};
use serde_json::json;

fn reason(reply: Option<Reply>) -> Option<ErrorCode> {
    reply.expect("expected a reply").reason
}

#[tokio::test]
async fn test_token_binding() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();
    assert_eq!(session.state(), SessionState::Idle);

    // Missing or non-string credential
    let reply = session.handle(text(json!({ "type": "token" }))).await;
    assert_eq!(reason(reply), Some(ErrorCode::UnavailableData));
    let reply = session.handle(text(json!({ "type": "token", "data": 7 }))).await;
    assert_eq!(reason(reply), Some(ErrorCode::UnavailableData));

    // Unknown credential leaves the session unbound
    let reply = session.handle(token("nope")).await;
    assert_eq!(reason(reply), Some(ErrorCode::UnavailableToken));
    assert_eq!(session.state(), SessionState::Idle);

    let reply = session.handle(token(U1_TOKEN)).await.unwrap();
    assert_eq!(reply, Reply::ok(ReplyKind::Token));
    assert_eq!(session.state(), SessionState::AwaitingOption);
    assert_eq!(env.requests.requests(&env.u1()), 1);
}

#[tokio::test]
async fn test_token_refused_when_request_limit_reached() {
    let env = common::setup_test_env(1000);
    for _ in 0..500 {
        env.ctx.requests.admit(&env.u1(), 1).await;
    }

    let mut session = env.session();
    let reply = session.handle(token(U1_TOKEN)).await;
    assert_eq!(reason(reply), Some(ErrorCode::TooManyRequests));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_ignores_unknown_messages() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();

    assert!(session.handle(Inbound::Text("garbage".into())).await.is_none());
    assert!(session
        .handle(text(json!({ "type": "dance" })))
        .await
        .is_none());
    assert!(session.handle(close()).await.is_none());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_requires_token_and_stream() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();

    let reply = session.handle(option("a.txt", 3)).await.unwrap();
    assert_eq!(reply, Reply::reject(ReplyKind::Option, ErrorCode::UnavailableToken));
    let reply = session.handle(frame(b"abc")).await.unwrap();
    assert_eq!(reply, Reply::reject(ReplyKind::Raw, ErrorCode::UnavailableToken));

    session.handle(token(U1_TOKEN)).await.unwrap();
    let reply = session.handle(frame(b"abc")).await.unwrap();
    assert_eq!(reply, Reply::reject(ReplyKind::Raw, ErrorCode::StreamNotOpened));
}

#[tokio::test]
async fn test_option_validation() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();
    session.handle(token(U1_TOKEN)).await.unwrap();

    let base = json!({
        "name": "a.txt",
        "dir": "/",
        "mtimeMs": 1,
        "birthtimeMs": 1,
        "size": 3,
    });
    let cases = [
        ("program", json!("no-dashes"), ErrorCode::UnavailableProgram),
        ("program", json!(5), ErrorCode::UnavailableProgram),
        ("dir", json!("/missing"), ErrorCode::UnavailableDirectory),
        ("dir", json!("../../u2/cloud"), ErrorCode::UnavailableDirectory),
        ("dir", json!(null), ErrorCode::UnavailableDirectory),
        ("name", json!("a/b"), ErrorCode::UnavailableName),
        ("name", json!(".."), ErrorCode::UnavailableName),
        ("name", json!("COM1"), ErrorCode::UnavailableName),
        ("mtimeMs", json!("yesterday"), ErrorCode::UnavailableMtimems),
        ("birthtimeMs", json!(null), ErrorCode::UnavailableBirthtimems),
        ("size", json!(-1), ErrorCode::UnavailableSize),
        ("size", json!(1.5), ErrorCode::UnavailableSize),
    ];
    for (field, value, expected) in cases {
        let mut data = base.clone();
        data[field] = value;
        let reply = session
            .handle(text(json!({ "type": "option", "data": data })))
            .await;
        assert_eq!(reason(reply), Some(expected), "{field}");
        assert_eq!(session.state(), SessionState::AwaitingOption);
    }

    let reply = session
        .handle(text(json!({ "type": "option", "data": "a.txt" })))
        .await;
    assert_eq!(reason(reply), Some(ErrorCode::UnavailableData));

    // nothing was created along the way
    assert!(!env.u1_cloud().join("a.txt").exists());
}

#[tokio::test]
async fn test_complete_upload() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();

    let reply = open_upload(&mut session, "hello.txt", 10).await;
    assert_eq!(reply, Reply::ok(ReplyKind::Option));
    assert_eq!(session.state(), SessionState::Streaming);

    let reply = session.handle(frame(b"hell")).await.unwrap();
    assert_eq!(reply, Reply::uploaded(4));
    let reply = session.handle(frame(b"o worl")).await.unwrap();
    assert_eq!(reply, Reply::uploaded(10));

    assert!(session.handle(close()).await.is_none());
    assert_eq!(session.state(), SessionState::AwaitingOption);

    let path = env.u1_cloud().join("hello.txt");
    assert_eq!(std::fs::read(&path).unwrap(), b"hello worl");
    assert_eq!(env.quota().capacity(&env.u1()).await, 10);

    // client timestamps were put back on the file
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
    assert_eq!(
        modified,
        UNIX_EPOCH + Duration::from_millis(1_600_000_000_000)
    );
}

#[tokio::test]
async fn test_upload_into_subdirectory_of_other_program() {
    let env = common::setup_test_env(1000);
    let photos = env.sandbox.program_root(&env.u1(), "photos");
    std::fs::create_dir_all(photos.join("2024")).unwrap();

    let mut session = env.session();
    session.handle(token(U1_TOKEN)).await.unwrap();
    let reply = session
        .handle(text(json!({
            "type": "option",
            "data": {
                "name": "beach.jpg",
                "dir": "2024",
                "program": "photos",
                "mtimeMs": 1,
                "birthtimeMs": 1,
                "size": 2,
            }
        })))
        .await
        .unwrap();
    assert!(!reply.is_rejection(), "{reply:?}");
    session.handle(frame(b"ok")).await.unwrap();
    session.handle(close()).await;

    assert_eq!(std::fs::read(photos.join("2024/beach.jpg")).unwrap(), b"ok");
}

#[tokio::test]
async fn test_send_exceeded_at_crossing_frame() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();
    open_upload(&mut session, "a.bin", 10).await;

    assert_eq!(session.handle(frame(&[1; 6])).await.unwrap(), Reply::uploaded(6));

    // 6 + 6 crosses the declared 10
    let reply = session.handle(frame(&[2; 6])).await.unwrap();
    assert_eq!(reply, Reply::reject(ReplyKind::Raw, ErrorCode::SendExceeded));
    assert_eq!(session.received(), Some(6));
    assert_eq!(env.quota().capacity(&env.u1()).await, 6);

    // the stream is still usable
    assert_eq!(session.handle(frame(&[3; 4])).await.unwrap(), Reply::uploaded(10));
    assert_eq!(env.quota().capacity(&env.u1()).await, 10);
}

#[tokio::test]
async fn test_too_big_size_leaves_ledger_untouched() {
    let env = common::setup_test_env(1000);
    env.quota().set_capacity(&env.u1(), 900).await;
    let mut session = env.session();

    let reply = open_upload(&mut session, "big.bin", 101).await;
    assert_eq!(reply, Reply::reject(ReplyKind::Option, ErrorCode::TooBigSize));
    assert_eq!(session.state(), SessionState::AwaitingOption);
    assert!(!env.u1_cloud().join("big.bin").exists());
    assert_eq!(env.quota().capacity(&env.u1()).await, 900);

    // exactly at the ceiling is fine
    let reply = session.handle(option("fits.bin", 100)).await.unwrap();
    assert_eq!(reply, Reply::ok(ReplyKind::Option));
}

#[tokio::test]
async fn test_capacity_full_mid_stream() {
    let env = common::setup_test_env(100);
    let mut session = env.session();
    open_upload(&mut session, "a.bin", 50).await;
    session.handle(frame(&[0; 10])).await.unwrap();

    // another writer eats the remaining room
    env.quota().change_capacity(&env.u1(), 85).await;

    let reply = session.handle(frame(&[0; 10])).await.unwrap();
    assert_eq!(reply, Reply::reject(ReplyKind::Raw, ErrorCode::CapacityFull));
    assert_eq!(env.quota().capacity(&env.u1()).await, 95);
    assert_eq!(session.received(), Some(10));
}

#[tokio::test]
async fn test_replacing_file_releases_old_size() {
    let env = common::setup_test_env(1000);
    let path = env.u1_cloud().join("notes.txt");
    std::fs::write(&path, [0u8; 30]).unwrap();
    env.quota().set_capacity(&env.u1(), 30).await;

    let mut session = env.session();
    open_upload(&mut session, "notes.txt", 4).await;
    session.handle(frame(b"new!")).await.unwrap();
    session.handle(close()).await;

    assert_eq!(std::fs::read(&path).unwrap(), b"new!");
    assert_eq!(env.quota().capacity(&env.u1()).await, 4);
}

#[tokio::test]
async fn test_replacing_near_ceiling_is_admitted() {
    let env = common::setup_test_env(1000);
    std::fs::write(env.u1_cloud().join("big.bin"), [0u8; 300]).unwrap();
    env.quota().set_capacity(&env.u1(), 900).await;

    // 900 - 300 + 200 ends at 800, under the ceiling
    let mut session = env.session();
    let reply = open_upload(&mut session, "big.bin", 200).await;
    assert_eq!(reply, Reply::ok(ReplyKind::Option));

    // frames may use the room the old file gives back
    assert_eq!(
        session.handle(frame(&[1; 150])).await.unwrap(),
        Reply::uploaded(150)
    );
    assert_eq!(
        session.handle(frame(&[1; 50])).await.unwrap(),
        Reply::uploaded(200)
    );
    session.handle(close()).await;
    assert_eq!(env.quota().capacity(&env.u1()).await, 800);

    // still refused when the net result would cross the ceiling
    std::fs::write(env.u1_cloud().join("small.bin"), [0u8; 10]).unwrap();
    env.quota().change_capacity(&env.u1(), 10).await;
    let reply = session.handle(option("small.bin", 201)).await.unwrap();
    assert_eq!(reply, Reply::reject(ReplyKind::Option, ErrorCode::TooBigSize));
}

#[tokio::test]
async fn test_new_option_finalizes_previous_sink() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();
    open_upload(&mut session, "first.txt", 5).await;
    session.handle(frame(b"one")).await.unwrap();

    let reply = session.handle(option("second.txt", 3)).await.unwrap();
    assert_eq!(reply, Reply::ok(ReplyKind::Option));
    assert_eq!(session.received(), Some(0));

    // the partial first upload stays, matching what was charged
    assert_eq!(std::fs::read(env.u1_cloud().join("first.txt")).unwrap(), b"one");
    assert_eq!(env.quota().capacity(&env.u1()).await, 3);
}

#[tokio::test]
async fn test_directory_destination_rejected() {
    let env = common::setup_test_env(1000);
    std::fs::create_dir(env.u1_cloud().join("photos")).unwrap();
    let mut session = env.session();

    let reply = open_upload(&mut session, "photos", 3).await;
    assert_eq!(reply, Reply::reject(ReplyKind::Option, ErrorCode::UnavailablePath));
}

#[tokio::test]
async fn test_to_public_returns_nid() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();
    session.handle(token(U1_TOKEN)).await.unwrap();

    for flag in ["toPublic", "toPubilc"] {
        let name = format!("{flag}.txt");
        let mut data = json!({
            "name": name,
            "dir": "/",
            "mtimeMs": 1,
            "birthtimeMs": 1,
            "size": 0,
        });
        data[flag] = json!(true);
        let reply = session
            .handle(text(json!({ "type": "option", "data": data })))
            .await
            .unwrap();

        let nid = reply.nid.expect("expected a link token");
        assert_eq!(nid.len(), 21);
        assert_eq!(
            env.links().resolve(&nid).await,
            Some(env.u1_cloud().join(&name))
        );
    }
}

#[tokio::test]
async fn test_link_failure_still_opens_upload() {
    let env = common::setup_test_env(1000);
    let mut session = env.session();
    session.handle(token(U1_TOKEN)).await.unwrap();

    // the ledger reads fall back to 0, so admission still passes
    env.store.set_offline(true);
    let reply = session
        .handle(text(json!({
            "type": "option",
            "data": {
                "name": "a.txt",
                "dir": "/",
                "mtimeMs": 1,
                "birthtimeMs": 1,
                "size": 1,
                "toPublic": true,
            }
        })))
        .await
        .unwrap();
    assert_eq!(reply, Reply::ok(ReplyKind::Option));
    assert_eq!(session.state(), SessionState::Streaming);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let env = common::setup_test_env(1000);
    let path = env.u1_cloud().join("old.txt");
    std::fs::write(&path, [0u8; 20]).unwrap();
    env.quota().set_capacity(&env.u1(), 20).await;

    let mut session = env.session();
    open_upload(&mut session, "old.txt", 5).await;
    session.handle(frame(b"12345")).await.unwrap();

    session.shutdown(SessionState::Aborted).await;
    session.shutdown(SessionState::Closed).await;
    assert!(session.handle(Inbound::Close).await.is_none());

    // old size released exactly once
    assert_eq!(session.state(), SessionState::Aborted);
    assert_eq!(env.quota().capacity(&env.u1()).await, 5);
}

/// u1 sits at 900 of 1000 bytes; two sessions race their uploads and
///  the ledger is healed from disk afterwards
#[tokio::test]
async fn test_concurrent_uploads_reconcile_to_disk() {
    let env = common::setup_test_env(1000);
    std::fs::write(env.u1_cloud().join("existing.bin"), vec![0u8; 900]).unwrap();
    env.quota().set_capacity(&env.u1(), 900).await;

    let mut first = env.session();
    let mut second = env.session();

    assert_eq!(open_upload(&mut first, "a.bin", 50).await, Reply::ok(ReplyKind::Option));
    assert_eq!(open_upload(&mut second, "b.bin", 100).await, Reply::ok(ReplyKind::Option));

    // a third that cannot fit is refused up front
    let mut third = env.session();
    let reply = open_upload(&mut third, "c.bin", 200).await;
    assert_eq!(reply.reason, Some(ErrorCode::TooBigSize));

    first.handle(frame(&[1; 50])).await.unwrap();
    assert_eq!(second.handle(frame(&[2; 50])).await.unwrap(), Reply::uploaded(50));
    let reply = second.handle(frame(&[2; 50])).await.unwrap();
    assert_eq!(reply.reason, Some(ErrorCode::CapacityFull));

    first.handle(close()).await;
    second.handle(Inbound::Close).await;

    let totals = env.quota().reconcile(env.sandbox.root()).await.unwrap();
    let on_disk = ::common::quota::disk_usage(&env.sandbox.account_root(&env.u1()));
    assert_eq!(on_disk, 1000);
    assert_eq!(env.quota().capacity(&env.u1()).await, on_disk);
    assert!(totals.contains(&(env.u1(), 1000)));
}

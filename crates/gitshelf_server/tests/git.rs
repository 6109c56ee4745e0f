//! End-to-end writes against a real git remote.

use gitshelf_server::{ErrorKind, Request, ServerBuilder, ServerConfig, ShelfServer};
use gitshelf_sync::{GitCli, ReplicaConfig, SyncPhase};
use gitshelf_testkit::{git_available, head_of, is_clean, petstore, TempRemote};
use serde_json::json;

fn configured_remote() -> TempRemote {
    let remote = TempRemote::new("testbranch");
    let api = petstore::item_file(&petstore::api_config());
    remote.push_files(&[("gitshelf/api.json", api.as_str())], "Configure petstore");
    remote
}

fn config(remote: &TempRemote, name: &str) -> ServerConfig {
    let replica = ReplicaConfig::new(remote.url(), remote.branch(), remote.scratch(name))
        .with_tracked_path(petstore::ROOT);
    ServerConfig::new(replica)
}

async fn server(remote: &TempRemote, name: &str) -> ShelfServer<GitCli> {
    ServerBuilder::new(config(remote, name)).build().await.unwrap()
}

#[tokio::test]
async fn accepted_writes_reach_the_remote() {
    if !git_available() {
        return;
    }
    let remote = configured_remote();
    let server = server(&remote, "a").await;

    server
        .post("owners", Request::new().with_body(petstore::annie()))
        .await
        .unwrap();
    let response = server
        .post("pets", Request::new().with_body(petstore::taco()))
        .await
        .unwrap();
    assert_eq!(response.warning(), None);

    let tracked = remote.tracked_files();
    assert!(tracked.contains(&petstore::item_path("pets", "Taco")));
    assert!(tracked.contains(&petstore::item_path("owners", "annie")));
    assert_eq!(remote.head(), head_of(&server.config().replica.directory));
}

#[tokio::test]
async fn divergent_history_resolves_to_the_remote_head() {
    if !git_available() {
        return;
    }
    let remote = configured_remote();
    let server = server(&remote, "a").await;

    let lucy = petstore::item_file(&petstore::lucy());
    let lucy_path = petstore::item_path("pets", "Lucy");
    remote.push_files(&[(lucy_path.as_str(), lucy.as_str())], "Add Lucy elsewhere");

    let response = server
        .post("owners", Request::new().with_body(petstore::annie()))
        .await
        .unwrap();

    assert_eq!(response.warning(), Some(ErrorKind::ConflictResolved));
    assert_eq!(response.conflicts[0].phase, SyncPhase::Pull);

    let directory = &server.config().replica.directory;
    assert_eq!(head_of(directory), remote.head());
    assert!(is_clean(directory));

    // The colliding local write is gone until it is resubmitted.
    let err = server
        .get("owners", Request::new().with_id("annie"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let lucy = server
        .get("pets", Request::new().with_id("Lucy"))
        .await
        .unwrap();
    assert_eq!(lucy["owners"], json!(["bbrennan"]));

    server
        .post("owners", Request::new().with_body(petstore::annie()))
        .await
        .unwrap();
    assert!(remote
        .tracked_files()
        .contains(&petstore::item_path("owners", "annie")));
}

#[tokio::test]
async fn restarted_server_sees_its_own_writes() {
    if !git_available() {
        return;
    }
    let remote = configured_remote();
    {
        let server = server(&remote, "a").await;
        server
            .post("pets", Request::new().with_body(petstore::lucy()))
            .await
            .unwrap();
    }

    let server = server(&remote, "a").await;
    let lucy = server
        .get("pets", Request::new().with_id("Lucy"))
        .await
        .unwrap();
    assert_eq!(lucy["name"], "Lucy");
}

#[tokio::test]
async fn two_servers_cannot_share_a_working_copy() {
    if !git_available() {
        return;
    }
    let remote = configured_remote();
    let _first = server(&remote, "a").await;

    let second = ServerBuilder::new(config(&remote, "a")).build().await;
    match second {
        Err(err) => assert_eq!(err.kind(), ErrorKind::RepositoryFailure),
        Ok(_) => panic!("second server acquired a locked working copy"),
    }
}

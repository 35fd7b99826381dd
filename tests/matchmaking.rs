mod support;

use serde_json::json;
use support::{WsClient, unique_nickname};

// Tests in this binary share one server, so every test uses its own rounds
// bucket to keep pairings isolated.

#[tokio::test]
async fn connecting_yields_lobby_snapshot() {
    let mut client = WsClient::connect().await;
    let waiting = client.recv_type("waiting_list").await;
    assert!(waiting["waiting_list"].is_array());
    let tournaments = client.recv_type("tournament_list").await;
    assert!(tournaments["tournaments"].is_array());
    client.close().await;
}

#[tokio::test]
async fn same_rounds_pair_into_one_room() {
    let rounds = 41;
    let mut a = WsClient::connect().await;
    let mut b = WsClient::connect().await;
    let a_name = unique_nickname("ada");
    let b_name = unique_nickname("bob");

    a.send(json!({"type": "join", "nickname": a_name, "token": "t", "rounds": rounds}))
        .await;
    a.recv_type("queue_update").await;

    b.send(json!({"type": "join", "nickname": b_name, "token": "t", "rounds": rounds}))
        .await;

    let a_start = a.recv_type("start_game").await;
    let b_start = b.recv_type("start_game").await;

    // Same room; the prior waiter is LEFT, the joining caller RIGHT.
    assert_eq!(a_start["room"], b_start["room"]);
    assert_eq!(a_start["player_side"], "left");
    assert_eq!(b_start["player_side"], "right");
    assert_eq!(a_start["rounds"], rounds);
    assert_eq!(a_start["is_tournament"], false);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn different_rounds_stay_queued() {
    let mut a = WsClient::connect().await;
    let mut b = WsClient::connect().await;
    let a_name = unique_nickname("ada");
    let b_name = unique_nickname("bob");

    a.send(json!({"type": "join", "nickname": a_name, "token": "t", "rounds": 43}))
        .await;
    a.recv_type("queue_update").await;

    b.send(json!({"type": "join", "nickname": b_name, "token": "t", "rounds": 45}))
        .await;
    b.recv_type("queue_update").await;

    // The lobby broadcast lists both entries with their rounds.
    let names = |frame: &serde_json::Value| -> Vec<(String, u64)> {
        frame["waiting_list"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e["nickname"].as_str().unwrap().to_string(),
                    e["rounds"].as_u64().unwrap(),
                )
            })
            .collect()
    };
    loop {
        let frame = b.recv_type("waiting_list").await;
        let listed = names(&frame);
        if listed.contains(&(a_name.clone(), 43)) && listed.contains(&(b_name.clone(), 45)) {
            break;
        }
    }

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn joining_and_leaving_restores_the_lobby() {
    let mut a = WsClient::connect().await;
    let mut observer = WsClient::connect().await;
    let a_name = unique_nickname("ada");

    a.send(json!({"type": "join", "nickname": a_name, "token": "t", "rounds": 47}))
        .await;
    a.recv_type("queue_update").await;

    // The observer sees the entry appear...
    loop {
        let frame = observer.recv_type("waiting_list").await;
        let listed = frame["waiting_list"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["nickname"] == a_name.as_str());
        if listed {
            break;
        }
    }

    a.send(json!({"type": "leave_queue"})).await;
    let confirmation = a.recv_type("queue_update").await;
    assert_eq!(confirmation["message"], "You have left the queue");

    // ...and disappear again.
    loop {
        let frame = observer.recv_type("waiting_list").await;
        let listed = frame["waiting_list"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["nickname"] == a_name.as_str());
        if !listed {
            break;
        }
    }

    a.close().await;
    observer.close().await;
}

#[tokio::test]
async fn duplicate_join_is_rejected_without_state_change() {
    let mut a = WsClient::connect().await;
    let a_name = unique_nickname("ada");

    a.send(json!({"type": "join", "nickname": a_name, "token": "t", "rounds": 49}))
        .await;
    let first = a.recv_type("queue_update").await;
    assert!(
        first["message"]
            .as_str()
            .unwrap()
            .starts_with("Waiting for a player")
    );

    a.send(json!({"type": "join", "nickname": a_name, "token": "t", "rounds": 49}))
        .await;
    let second = a.recv_type("queue_update").await;
    assert_eq!(second["message"], "You are already in the queue");

    a.close().await;
}

#[tokio::test]
async fn get_state_is_idempotent() {
    let mut client = WsClient::connect().await;
    client.recv_type("waiting_list").await;
    client.recv_type("tournament_list").await;

    for _ in 0..2 {
        client.send(json!({"type": "get_state"})).await;
        client.recv_type("waiting_list").await;
        client.recv_type("tournament_list").await;
    }

    client.close().await;
}

#[tokio::test]
async fn unknown_and_malformed_frames_are_dropped() {
    let mut client = WsClient::connect().await;
    client.recv_type("waiting_list").await;

    client.send(json!({"type": "warp_drive", "x": 1})).await;
    client
        .socket_send_text("this is not json at all")
        .await;

    // The connection stays healthy and still answers requests.
    client.send(json!({"type": "get_state"})).await;
    client.recv_type("waiting_list").await;
    client.close().await;
}

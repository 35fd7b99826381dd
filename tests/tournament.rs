mod support;

use serde_json::{Value, json};
use std::time::Duration;
use support::{WsClient, unique_nickname};

async fn create_tournament(
    client: &mut WsClient,
    nickname: &str,
    size: usize,
    rounds: u32,
) -> String {
    client
        .send(json!({
            "type": "create_tournament",
            "nickname": nickname,
            "name": format!("{nickname}'s Cup"),
            "rounds": rounds,
            "size": size
        }))
        .await;
    let created = client.recv_type("tournament_created").await;
    created["tournament"]["id"].as_str().unwrap().to_string()
}

async fn join_tournament(client: &mut WsClient, id: &str, nickname: &str) {
    client
        .send(json!({
            "type": "join_tournament",
            "tournament_id": id,
            "nickname": nickname
        }))
        .await;
    client.recv_type("tournament_joined").await;
}

#[derive(Debug, Default)]
struct PlayerOutcome {
    victory: bool,
    complete_winner: Option<String>,
    final_update_winner: Option<String>,
    final_matches: Vec<Value>,
}

// Drive one entrant until the tournament resolves. LEFT players track the
// ball and win; RIGHT players dodge and lose.
async fn run_entrant(mut client: WsClient) -> PlayerOutcome {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(180);
    let mut outcome = PlayerOutcome::default();
    let mut plays_left = false;

    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .expect("tournament resolves within deadline");
        let Some(frame) = client.try_recv_within(remaining).await else {
            break;
        };
        match frame["type"].as_str() {
            Some("start_game") => {
                plays_left = frame["player_side"] == "left";
            }
            Some("game_state_update") => {
                let ball_y = frame["state"]["ball"]["y"].as_f64().unwrap();
                let paddle_y = if plays_left {
                    (ball_y - 50.0).clamp(0.0, 350.0)
                } else if ball_y < 225.0 {
                    350.0
                } else {
                    0.0
                };
                client
                    .send(json!({"type": "game_update", "data": {"paddleY": paddle_y}}))
                    .await;
            }
            Some("tournament_victory") => outcome.victory = true,
            Some("tournament_complete") => {
                outcome.complete_winner =
                    frame["winner"].as_str().map(str::to_string);
            }
            Some("tournament_update") => {
                if let Some(winner) = frame["tournament"]["winner"].as_str() {
                    outcome.final_update_winner = Some(winner.to_string());
                    outcome.final_matches = frame["tournament"]["matches"]
                        .as_array()
                        .cloned()
                        .unwrap_or_default();
                    if outcome.victory || outcome.complete_winner.is_some() {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    client.close().await;
    outcome
}

async fn run_full_tournament(size: usize) -> Vec<PlayerOutcome> {
    let mut creator = WsClient::connect().await;
    let creator_name = unique_nickname("boss");
    // Single-point matches keep the bracket quick.
    let id = create_tournament(&mut creator, &creator_name, size, 1).await;

    let mut others = Vec::new();
    for i in 1..size {
        let mut client = WsClient::connect().await;
        join_tournament(&mut client, &id, &unique_nickname(&format!("p{i}"))).await;
        others.push(client);
    }

    creator
        .send(json!({"type": "start_tournament", "tournament_id": id}))
        .await;

    let mut drivers = Vec::new();
    drivers.push(tokio::spawn(run_entrant(creator)));
    for client in others {
        drivers.push(tokio::spawn(run_entrant(client)));
    }

    let mut outcomes = Vec::new();
    for driver in drivers {
        outcomes.push(driver.await.expect("entrant driver"));
    }
    outcomes
}

#[tokio::test]
async fn four_player_tournament_crowns_exactly_one_winner() {
    let outcomes = run_full_tournament(4).await;

    let victors: Vec<&PlayerOutcome> = outcomes.iter().filter(|o| o.victory).collect();
    assert_eq!(victors.len(), 1, "exactly one tournament_victory");

    let losers: Vec<&PlayerOutcome> = outcomes.iter().filter(|o| !o.victory).collect();
    assert_eq!(losers.len(), 3);
    let winner_name = losers[0].complete_winner.clone().expect("announced winner");
    for loser in &losers {
        assert_eq!(loser.complete_winner.as_ref(), Some(&winner_name));
    }

    // Every entrant saw the final bracket: three completed nodes, the
    // champion recorded on the root.
    for outcome in &outcomes {
        assert_eq!(outcome.final_update_winner.as_ref(), Some(&winner_name));
        assert_eq!(outcome.final_matches.len(), 3);
        assert!(
            outcome
                .final_matches
                .iter()
                .all(|m| m["winner"].is_string())
        );
    }
}

#[tokio::test]
async fn six_player_bracket_plays_byes_through_five_matches() {
    let outcomes = run_full_tournament(6).await;

    assert_eq!(outcomes.iter().filter(|o| o.victory).count(), 1);
    for outcome in &outcomes {
        assert_eq!(outcome.final_matches.len(), 5);
        // Two first-round matches, two semifinals, one final.
        let per_round = |round: u64| {
            outcome
                .final_matches
                .iter()
                .filter(|m| m["round"] == round)
                .count()
        };
        assert_eq!(per_round(0), 2);
        assert_eq!(per_round(1), 2);
        assert_eq!(per_round(2), 1);
        assert!(outcome.final_matches.iter().all(|m| m["winner"].is_string()));
    }
}

#[tokio::test]
async fn forfeit_mid_match_advances_the_opponent() {
    let mut creator = WsClient::connect().await;
    let creator_name = unique_nickname("boss");
    // A huge target keeps the unattended match from finishing on its own
    // before the forfeit lands.
    let id = create_tournament(&mut creator, &creator_name, 4, 101).await;

    let mut entrants: Vec<(String, WsClient)> = vec![(creator_name.clone(), creator)];
    for i in 1..4 {
        let name = unique_nickname(&format!("p{i}"));
        let mut client = WsClient::connect().await;
        join_tournament(&mut client, &id, &name).await;
        entrants.push((name, client));
    }

    entrants[0]
        .1
        .send(json!({"type": "start_tournament", "tournament_id": id}))
        .await;

    // Learn the first pairing from any entrant's update.
    let (player1, player2) = loop {
        let update = entrants[0].1.recv_type("tournament_update").await;
        let current = &update["tournament"]["current_match"];
        if current.is_object() {
            break (
                current["player1"].as_str().unwrap().to_string(),
                current["player2"].as_str().unwrap().to_string(),
            );
        }
    };

    let leaver_index = entrants.iter().position(|(n, _)| *n == player1).unwrap();
    let (_, leaver) = entrants.remove(leaver_index);
    leaver.close().await;

    let survivor_index = entrants.iter().position(|(n, _)| *n == player2).unwrap();
    let (survivor_name, survivor) = &mut entrants[survivor_index];
    let result = survivor
        .recv_type_within("tournament_match_result", Duration::from_secs(15))
        .await;
    assert_eq!(result["won"], true);
    assert_eq!(result["opponent"], player1.as_str());

    // The recorded walkover shows up in the bracket.
    loop {
        let update = survivor
            .recv_type_within("tournament_update", Duration::from_secs(15))
            .await;
        let recorded = update["tournament"]["matches"]
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m["winner"] == survivor_name.as_str());
        if recorded {
            break;
        }
    }

    for (_, client) in entrants {
        client.close().await;
    }
}

#[tokio::test]
async fn tournament_rules_are_enforced() {
    let mut a = WsClient::connect().await;
    let a_name = unique_nickname("ada");

    // Invalid size.
    a.send(json!({
        "type": "create_tournament",
        "nickname": a_name,
        "size": 5
    }))
    .await;
    let error = a.recv_type("tournament_error").await;
    assert_eq!(error["message"], "Tournament size must be 4, 6, or 8 players");

    let id = create_tournament(&mut a, &a_name, 4, 3).await;

    // Nickname collision.
    let mut b = WsClient::connect().await;
    b.send(json!({
        "type": "join_tournament",
        "tournament_id": id,
        "nickname": a_name
    }))
    .await;
    let error = b.recv_type("tournament_error").await;
    assert_eq!(
        error["message"],
        "Cannot join tournament. It might be full or nickname is already taken."
    );

    // Only the creator may start.
    let b_name = unique_nickname("bob");
    join_tournament(&mut b, &id, &b_name).await;
    b.send(json!({"type": "start_tournament", "tournament_id": id}))
        .await;
    let error = b.recv_type("tournament_error").await;
    assert_eq!(
        error["message"],
        "Only the tournament creator can start the tournament"
    );

    // Too few players.
    a.send(json!({"type": "start_tournament", "tournament_id": id}))
        .await;
    let error = a.recv_type("tournament_error").await;
    assert_eq!(error["message"], "Cannot start: Need at least 4 players");

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn creator_leaving_before_start_cancels_the_tournament() {
    let mut a = WsClient::connect().await;
    let a_name = unique_nickname("ada");
    let id = create_tournament(&mut a, &a_name, 4, 3).await;

    let mut b = WsClient::connect().await;
    join_tournament(&mut b, &id, &unique_nickname("bob")).await;

    a.send(json!({"type": "leave_tournament"})).await;
    let left = a.recv_type("tournament_left").await;
    assert_eq!(left["message"], "You have left the tournament");

    let cancelled = b.recv_type("tournament_left").await;
    assert_eq!(
        cancelled["message"],
        "Tournament has been canceled by the creator."
    );

    a.close().await;
    b.close().await;
}

//! End-to-end checks for declarations, turn order and room lifecycle.

use rummy::core::rng::DeterministicRng;
use rummy::game::engine::{initialize_game, process_action, GameAction};
use rummy::game::meld::{calculate_player_points, is_pure_sequence, is_valid_set, validate_declaration};
use rummy::game::{Card, Player, PlayerId, PlayerIdentity, Room, RoomCode, RoomState, RuleConfig};
use rummy::network::protocol::ServerMessage;
use rummy::network::registry::{ConnectionId, RoomError, RoomRegistry};
use tokio::sync::mpsc;

fn cards(notation: &[&str]) -> Vec<Card> {
    notation
        .iter()
        .map(|n| {
            let (n, copy) = match n.strip_suffix('\'') {
                Some(n) => (n, 1),
                None => (*n, 0),
            };
            Card::parse(n, copy).unwrap()
        })
        .collect()
}

#[test]
fn meld_predicates() {
    assert!(is_pure_sequence(&cards(&["8S", "9S", "10S"])));
    assert!(!is_pure_sequence(&cards(&["8S", "9H", "10S"])));
    assert!(!is_pure_sequence(&cards(&["8S", "JK", "10S"])));

    assert!(is_valid_set(&cards(&["7S", "7H", "7D"]), None));
    assert!(!is_valid_set(&cards(&["7S", "7S'", "7H"]), None));
}

#[test]
fn four_meld_hand_declares_clean() {
    let rules = RuleConfig::default();
    let wild = Card::parse("5D", 1).unwrap();
    let hand = cards(&[
        "8S", "9S", "10S",
        "3H", "4H", "5C",
        "KH", "KS", "KD", "KC",
        "7H", "7S", "7D",
    ]);

    let declaration = validate_declaration(&hand, Some(&wild), &rules);
    assert!(declaration.is_valid);
    assert_eq!(declaration.points, 0);
    assert!(declaration.has_pure_sequence());
    assert!(declaration.unmatched.is_empty());
    assert_eq!(calculate_player_points(&hand, &declaration, Some(&wild), &rules), 0);
}

#[test]
fn heavy_hand_is_capped() {
    let rules = RuleConfig::default();
    let hand = cards(&[
        "KS", "QS", "10S", "8S", "KH", "QH", "10H", "8H", "KD", "QD", "10D", "8D", "KC",
    ]);
    let declaration = validate_declaration(&hand, None, &rules);
    assert!(!declaration.is_valid);
    assert_eq!(calculate_player_points(&hand, &declaration, None, &rules), rules.max_penalty);
}

#[test]
fn dropped_seat_is_skipped() {
    let code = RoomCode::parse("TURN01").unwrap();
    let mut room = Room::new(code, PlayerIdentity::new("p1", "One"), RuleConfig::default());
    for i in 2..=4 {
        room.players.push(Player::new(PlayerIdentity::new(format!("p{}", i), format!("Seat {}", i)), false));
    }
    initialize_game(&mut room, &mut DeterministicRng::new(7)).unwrap();

    let current = |room: &Room| room.players[room.current_player_index].id.clone();
    let take_turn = |room: &mut Room| {
        let id = room.players[room.current_player_index].id.clone();
        process_action(room, &id, GameAction::DrawFromDeck).unwrap();
        let card_id = room.players[room.current_player_index].hand[0].id.clone();
        process_action(room, &id, GameAction::Discard { card_id }).unwrap();
    };

    assert_eq!(current(&room), PlayerId::from("p1"));
    take_turn(&mut room);
    assert_eq!(current(&room), PlayerId::from("p2"));
    process_action(&mut room, &PlayerId::from("p2"), GameAction::Drop).unwrap();
    assert_eq!(current(&room), PlayerId::from("p3"));
    take_turn(&mut room);
    assert_eq!(current(&room), PlayerId::from("p4"));
    take_turn(&mut room);
    assert_eq!(current(&room), PlayerId::from("p1"));
    assert_eq!(room.state, RoomState::Playing);
    assert!(room.is_conserved());
}

#[tokio::test]
async fn room_removed_after_everyone_leaves() {
    let registry = RoomRegistry::default();
    let (tx, _rx) = mpsc::channel::<ServerMessage>(32);
    let host = ConnectionId::new_v4();
    let guest = ConnectionId::new_v4();

    let room = registry
        .create_room(host, PlayerIdentity::new("p1", "Host"), tx.clone())
        .await
        .unwrap();
    registry
        .join_room(guest, room.code.as_str(), PlayerIdentity::new("p2", "Guest"), tx.clone())
        .await
        .unwrap();
    assert_eq!(registry.room_count().await, 1);

    assert!(registry.disconnect(host).await);
    assert!(registry.disconnect(guest).await);
    assert_eq!(registry.room_count().await, 0);

    let late = registry
        .join_room(ConnectionId::new_v4(), room.code.as_str(), PlayerIdentity::new("p3", "Late"), tx)
        .await;
    assert!(matches!(late, Err(RoomError::RoomNotFound(_))));
}

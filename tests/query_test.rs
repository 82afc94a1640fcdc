mod common;

use redpacket_indexer::query::{self, Direction, PacketOrderBy, PacketQuery};
use redpacket_indexer::types::{PacketType, U256};
use redpacket_indexer::{on_packet_claimed, on_packet_created, SqliteStore};

use common::{packet_id, sqlite_store, user, Chain};

/// Three packets in three blocks, with claims from two users.
///
/// | packet | block | total | claims |
/// |--------|-------|-------|--------|
/// | 1 | 100 | 255 | user 0x30: 100 |
/// | 2 | 101 | 1_000_000 | user 0x30: 10, user 0x31: 20 |
/// | 3 | 102 | 256 | none |
fn populated() -> SqliteStore {
    let mut store = sqlite_store();
    let mut chain = Chain::new();

    on_packet_created(&mut store, &chain.create(packet_id(1), 255, 2, PacketType::Equal)).unwrap();
    chain.mine();
    on_packet_created(
        &mut store,
        &chain.create(packet_id(2), 1_000_000, 5, PacketType::Random),
    )
    .unwrap();
    chain.mine();
    on_packet_created(&mut store, &chain.create(packet_id(3), 256, 1, PacketType::Equal)).unwrap();

    chain.mine();
    on_packet_claimed(&mut store, &chain.claim(packet_id(1), user(0x30), 100)).unwrap();
    chain.mine();
    on_packet_claimed(&mut store, &chain.claim(packet_id(2), user(0x30), 10)).unwrap();
    chain.mine();
    on_packet_claimed(&mut store, &chain.claim(packet_id(2), user(0x31), 20)).unwrap();

    store
}

fn ids(packets: &[redpacket_indexer::Packet]) -> Vec<u8> {
    packets.iter().map(|p| p.id.as_slice()[0]).collect()
}

#[test]
fn test_default_packet_query_is_newest_first() {
    let store = populated();
    let packets = query::packets(store.connection(), PacketQuery::default()).unwrap();
    assert_eq!(ids(&packets), vec![3, 2, 1]);
}

#[test]
fn test_packets_ascending_with_pagination() {
    let store = populated();
    let conn = store.connection();

    let page = |skip| {
        query::packets(
            conn,
            PacketQuery {
                first: 2,
                skip,
                direction: Direction::Asc,
                ..PacketQuery::default()
            },
        )
        .unwrap()
    };

    assert_eq!(ids(&page(0)), vec![1, 2]);
    assert_eq!(ids(&page(2)), vec![3]);
    assert!(page(3).is_empty());
}

#[test]
fn test_amount_ordering_is_numeric() {
    let store = populated();
    let conn = store.connection();

    let by_total = query::packets(
        conn,
        PacketQuery {
            order_by: PacketOrderBy::TotalAmount,
            direction: Direction::Asc,
            ..PacketQuery::default()
        },
    )
    .unwrap();
    // 255 < 256 < 1_000_000, even though 0xff > 0x01 as a leading byte
    assert_eq!(ids(&by_total), vec![1, 3, 2]);

    let by_remaining = query::packets(
        conn,
        PacketQuery {
            order_by: PacketOrderBy::RemainingAmount,
            direction: Direction::Desc,
            ..PacketQuery::default()
        },
    )
    .unwrap();
    // remaining: 1 → 155, 2 → 999_970, 3 → 256
    assert_eq!(ids(&by_remaining), vec![2, 3, 1]);
    assert_eq!(by_remaining[2].remaining_amount, U256::from(155u64));
}

#[test]
fn test_claims_by_claimer_filters_and_orders() {
    let store = populated();
    let conn = store.connection();

    let newest_first = query::claims_by_claimer(conn, &user(0x30), 10, Direction::Desc).unwrap();
    assert_eq!(newest_first.len(), 2);
    assert_eq!(newest_first[0].packet, packet_id(2));
    assert_eq!(newest_first[1].packet, packet_id(1));
    assert!(newest_first[0].timestamp > newest_first[1].timestamp);

    let oldest_first = query::claims_by_claimer(conn, &user(0x30), 1, Direction::Asc).unwrap();
    assert_eq!(oldest_first.len(), 1);
    assert_eq!(oldest_first[0].amount, U256::from(100u64));

    assert!(query::claims_by_claimer(conn, &user(0x99), 10, Direction::Desc)
        .unwrap()
        .is_empty());
}

#[test]
fn test_claims_for_packet_and_has_claimed() {
    let store = populated();
    let conn = store.connection();

    let claims = query::claims_for_packet(conn, &packet_id(2)).unwrap();
    assert_eq!(claims.len(), 2);
    assert_eq!(claims[0].claimer, user(0x30));
    assert_eq!(claims[1].claimer, user(0x31));

    assert!(query::has_claimed(conn, &packet_id(2), &user(0x31)).unwrap());
    assert!(!query::has_claimed(conn, &packet_id(1), &user(0x31)).unwrap());
    assert!(query::claims_for_packet(conn, &packet_id(3)).unwrap().is_empty());
}

#[test]
fn test_packet_lookup() {
    let store = populated();
    let conn = store.connection();

    let packet = query::packet(conn, &packet_id(2)).unwrap().unwrap();
    assert_eq!(packet.total_amount, U256::from(1_000_000u64));
    assert_eq!(packet.remaining_count, 3);
    assert_eq!(packet.packet_type, PacketType::Random);

    assert!(query::packet(conn, &packet_id(42)).unwrap().is_none());
}

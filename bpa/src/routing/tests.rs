#![cfg(test)]
use super::*;

fn gs2() -> Eid {
    "dtn:GS2".parse().unwrap()
}

fn add_contact(table: &mut RoutingTable, start_in: i64, duration: i64, bitrate: u64) -> ContactId {
    let now = time::OffsetDateTime::now_utc();
    table.add_contact(
        gs2(),
        "loopback".to_string(),
        "gs2".to_string(),
        now + time::Duration::seconds(start_in),
        now + time::Duration::seconds(start_in + duration),
        bitrate,
    )
}

#[test]
fn nominal_capacity() {
    let mut table = RoutingTable::new(1024);
    let id = add_contact(&mut table, 10, 20, 50);
    let contact = table.contact(id).unwrap();
    assert_eq!(contact.nominal(), 1000);
    for p in Priority::ALL {
        assert_eq!(contact.remaining(p), 1000);
    }
}

#[test]
fn capacity_conservation() {
    // remaining[p] must always equal nominal minus everything consumed at
    // priority >= p, across any schedule/fail/transmit sequence
    let mut table = RoutingTable::new(1024);
    let id = add_contact(&mut table, 10, 10, 100);
    let nominal = table.contact(id).unwrap().nominal();

    let mut consumed = [0u64; Priority::COUNT];
    let check = |table: &RoutingTable, consumed: &[u64; Priority::COUNT]| {
        let contact = table.contact(id).unwrap();
        for p in Priority::ALL {
            let expected =
                nominal - consumed[p.index()..].iter().sum::<u64>();
            assert_eq!(contact.remaining(p), expected, "priority {p:?}");
        }
        // The invariant chain 0 <= remaining[p] <= remaining[p+1] <= nominal
        assert!(contact.remaining(Priority::Bulk) <= contact.remaining(Priority::Normal));
        assert!(contact.remaining(Priority::Normal) <= contact.remaining(Priority::Expedited));
        assert!(contact.remaining(Priority::Expedited) <= nominal);
    };

    table.schedule(id, 1, 100, Priority::Bulk).unwrap();
    consumed[Priority::Bulk.index()] += 100;
    check(&table, &consumed);

    table.schedule(id, 2, 200, Priority::Normal).unwrap();
    consumed[Priority::Normal.index()] += 200;
    check(&table, &consumed);

    table.schedule(id, 3, 300, Priority::Expedited).unwrap();
    consumed[Priority::Expedited.index()] += 300;
    check(&table, &consumed);

    // Transmission failure re-credits
    table.unschedule(id, 2);
    consumed[Priority::Normal.index()] -= 200;
    check(&table, &consumed);

    // Successful transmission consumes the reservation for good
    table.mark_transmitted(id, 1);
    check(&table, &consumed);

    // Re-crediting never exceeds what the formula allows
    table.unschedule(id, 3);
    consumed[Priority::Expedited.index()] -= 300;
    check(&table, &consumed);
}

#[test]
fn schedule_rejects_over_capacity() {
    let mut table = RoutingTable::new(1024);
    let id = add_contact(&mut table, 10, 10, 10);
    assert_eq!(
        table.schedule(id, 1, 200, Priority::Normal),
        Err(ScheduleError::CapacityExhausted)
    );
    table.schedule(id, 1, 100, Priority::Normal).unwrap();
    assert_eq!(
        table.schedule(id, 2, 1, Priority::Normal),
        Err(ScheduleError::CapacityExhausted)
    );
}

#[test]
fn global_backlog_cap() {
    // 1 MB cap
    let mut table = RoutingTable::new(1);
    let a = add_contact(&mut table, 10, 100, 100_000);
    let b = add_contact(&mut table, 200, 100, 100_000);

    table.schedule(a, 1, 600_000, Priority::Normal).unwrap();
    assert_eq!(
        table.schedule(b, 2, 600_000, Priority::Normal),
        Err(ScheduleError::BacklogExceeded)
    );
    table.schedule(b, 2, 400_000, Priority::Normal).unwrap();
    assert_eq!(table.backlog(), 1_000_000);

    table.unschedule(a, 1);
    assert_eq!(table.backlog(), 400_000);
}

#[test]
fn contacts_sorted_by_start() {
    let mut table = RoutingTable::new(1024);
    let c = add_contact(&mut table, 300, 10, 10);
    let a = add_contact(&mut table, 100, 10, 10);
    let b = add_contact(&mut table, 200, 10, 10);

    let contacts = table.lookup_destination(&gs2());
    assert_eq!(contacts.len(), 3);

    // The per-node list is held in start order
    let now = time::OffsetDateTime::now_utc();
    assert_eq!(table.next_boundary(now), table.contact(a).map(|c| c.from));

    table.remove_contact(a);
    assert_eq!(table.next_boundary(now), table.contact(b).map(|c| c.from));
    table.remove_contact(b);
    assert_eq!(table.next_boundary(now), table.contact(c).map(|c| c.from));
}

#[test]
fn endpoint_prefix_lookup() {
    let mut table = RoutingTable::new(1024);
    let id = add_contact(&mut table, 10, 10, 10);
    table.add_node(gs2(), vec!["dtn:GS3".to_string(), "ipn:9.".to_string()]);

    // Direct node id
    assert_eq!(table.lookup_destination(&gs2()), vec![id]);
    // Endpoint on the node itself
    assert_eq!(
        table.lookup_destination(&"dtn:GS2/sink".parse().unwrap()),
        vec![id]
    );
    // Served prefixes
    assert_eq!(
        table.lookup_destination(&"dtn:GS3/telemetry".parse().unwrap()),
        vec![id]
    );
    assert_eq!(
        table.lookup_destination(&"ipn:9.42".parse().unwrap()),
        vec![id]
    );
    // Unrelated destination
    assert!(
        table
            .lookup_destination(&"dtn:elsewhere".parse().unwrap())
            .is_empty()
    );
}

#[test]
fn remove_node_orphans_scheduled_bundles() {
    let mut table = RoutingTable::new(1024);
    let id = add_contact(&mut table, 10, 10, 100);
    table.schedule(id, 7, 100, Priority::Normal).unwrap();
    table.schedule(id, 8, 100, Priority::Normal).unwrap();

    let mut orphans = table.remove_node(&gs2());
    orphans.sort();
    assert_eq!(orphans, vec![7, 8]);
    assert_eq!(table.backlog(), 0);
    assert!(table.lookup_destination(&gs2()).is_empty());
}

#[test]
fn reset_clears_everything() {
    let mut table = RoutingTable::new(1024);
    let id = add_contact(&mut table, 10, 10, 100);
    table.schedule(id, 7, 100, Priority::Normal).unwrap();

    assert_eq!(table.reset(), vec![7]);
    assert_eq!(table.backlog(), 0);
    assert!(table.next_boundary(time::OffsetDateTime::UNIX_EPOCH).is_none());
}

#[test]
fn active_contacts_window() {
    let mut table = RoutingTable::new(1024);
    let past = add_contact(&mut table, -100, 50, 10);
    let current = add_contact(&mut table, -5, 60, 10);
    let future = add_contact(&mut table, 100, 10, 10);

    let now = time::OffsetDateTime::now_utc();
    let active = table.active_contacts(now);
    assert!(active.contains(&current));
    assert!(!active.contains(&past));
    assert!(!active.contains(&future));
}

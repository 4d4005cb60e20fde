/*!
The contact-graph router: resolves a destination endpoint to one or more
`(contact, fragment size)` pairs, honoring priority, preemption and expiry.
*/

use super::*;
use routing::{ContactId, Priority, RoutingTable};

/// One fragment of a routing decision: `size` bytes on `contact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRoute {
    /// The serialized byte budget for this fragment.
    pub size: u64,
    /// The contact the fragment is scheduled on.
    pub contact: ContactId,
    /// Whether preemption was needed to free this capacity.
    pub preemption_improved: bool,
}

/// The result of a routing decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterResult {
    /// The fragments, in transmission order.  A single element means the
    /// bundle travels whole.
    pub fragments: Vec<FragmentRoute>,
    /// Whether preemption improved the route.
    pub preemption_improved: bool,
}

/// Routing failure modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No viable contact towards the destination.
    #[error("No route to destination")]
    NoRoute,

    /// The bundle exceeds the sum of reachable contact capacity.
    #[error("Bundle larger than all reachable capacity")]
    BundleTooLarge,

    /// The bundle would need more fragments than permitted.
    #[error("Bundle needs more than the fragment limit")]
    FragmentLimit,

    /// The bundle has already expired.
    #[error("Bundle has expired")]
    Expired,
}

/// Router tuning parameters, lifted from [`config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// The smallest fragment the router will schedule, except the last.
    pub fragment_min_payload: u64,
    /// The maximum number of fragments per routing decision.
    pub max_fragments: usize,
}

impl From<&config::Config> for RouterConfig {
    fn from(config: &config::Config) -> Self {
        Self {
            fragment_min_payload: config.fragment_min_payload as u64,
            max_fragments: config.max_fragments,
        }
    }
}

/// What the router needs to know about a bundle.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub destination: tern_bpv7::eid::Eid,
    pub size: u64,
    pub priority: Priority,
    pub expiry: time::OffsetDateTime,
    pub may_fragment: bool,
}

impl From<&bundle::Bundle> for RouteRequest {
    fn from(bundle: &bundle::Bundle) -> Self {
        Self {
            destination: bundle.destination().clone(),
            size: bundle.serialized_size() as u64,
            priority: bundle.priority(),
            expiry: bundle.expiry_time(),
            may_fragment: bundle.may_fragment(),
        }
    }
}

/// Chooses the candidate contacts for a destination: contacts that have
/// not ended and start before the bundle's expiry, ordered by earlier
/// start, then higher bitrate, then node id.
fn candidates(
    table: &RoutingTable,
    request: &RouteRequest,
    now: time::OffsetDateTime,
    excluded: &[ContactId],
) -> Vec<ContactId> {
    let mut found: Vec<_> = table
        .lookup_destination(&request.destination)
        .into_iter()
        .filter(|id| !excluded.contains(id))
        .filter_map(|id| {
            let c = table.contact(id)?;
            (c.to > now && c.from < request.expiry)
                .then(|| (c.from, core::cmp::Reverse(c.bitrate), c.node.to_string(), id))
        })
        .collect();
    found.sort();
    found.into_iter().map(|(_, _, _, id)| id).collect()
}

/// Greedily packs the bundle into the candidate contacts, earliest start
/// first.
fn pack_fragments(
    table: &RoutingTable,
    request: &RouteRequest,
    config: &RouterConfig,
    candidates: &[ContactId],
) -> Result<RouterResult, RouteError> {
    // Fast path: a single contact that can take the whole bundle
    if let Some(id) = candidates.iter().find(|id| {
        table
            .contact(**id)
            .map(|c| c.remaining(request.priority) >= request.size)
            .unwrap_or(false)
    }) {
        return Ok(RouterResult {
            fragments: vec![FragmentRoute {
                size: request.size,
                contact: *id,
                preemption_improved: false,
            }],
            preemption_improved: false,
        });
    }

    if !request.may_fragment {
        return Err(RouteError::BundleTooLarge);
    }

    let mut fragments = Vec::new();
    let mut remaining_bytes = request.size;
    for id in candidates {
        let Some(contact) = table.contact(*id) else {
            continue;
        };
        let take = contact.remaining(request.priority).min(remaining_bytes);
        // Every fragment but the last must carry at least the configured
        // minimum
        if take == 0 || (take < remaining_bytes && take < config.fragment_min_payload) {
            continue;
        }
        if fragments.len() == config.max_fragments {
            return Err(RouteError::FragmentLimit);
        }
        fragments.push(FragmentRoute {
            size: take,
            contact: *id,
            preemption_improved: false,
        });
        remaining_bytes -= take;
        if remaining_bytes == 0 {
            return Ok(RouterResult {
                fragments,
                preemption_improved: false,
            });
        }
    }
    Err(RouteError::BundleTooLarge)
}

/// The outcome of a successful routing decision.
#[derive(Debug, Default, PartialEq)]
pub struct RouteOutcome {
    /// The chosen route.
    pub result: RouterResult,
    /// Bundles evicted by preemption; the processor must re-route them.
    pub preempted: Vec<u64>,
}

/// Resolves a route for a bundle.
///
/// On success the table is untouched except for preemption evictions,
/// which are reported in [`RouteOutcome::preempted`]; reserving the chosen
/// capacity is the caller's responsibility, fragment by fragment.
pub fn route(
    table: &mut RoutingTable,
    request: &RouteRequest,
    config: &RouterConfig,
) -> Result<RouteOutcome, RouteError> {
    route_excluding(table, request, config, &[])
}

/// As [`route`], ignoring the given contacts.
pub fn route_excluding(
    table: &mut RoutingTable,
    request: &RouteRequest,
    config: &RouterConfig,
    excluded: &[ContactId],
) -> Result<RouteOutcome, RouteError> {
    let now = time::OffsetDateTime::now_utc();
    if request.expiry <= now {
        return Err(RouteError::Expired);
    }

    let candidates = candidates(table, request, now, excluded);
    if candidates.is_empty() {
        return Err(RouteError::NoRoute);
    }

    let mut result = pack_fragments(table, request, config, &candidates)?;

    // The per-priority capacity views let a high-priority bundle reserve
    // bytes that lower-priority traffic already holds.  Where a chosen
    // contact is physically overbooked, evict lower-priority reservations,
    // provided the exchange reduces the total delivery-loss score.  The
    // evicted bundles return to the processor for re-routing.
    let mut preempted = Vec::new();
    for fragment in &mut result.fragments {
        let evicted = preempt(table, request, fragment.contact, fragment.size)?;
        if !evicted.is_empty() {
            fragment.preemption_improved = true;
            result.preemption_improved = true;
            preempted.extend(evicted);
        }
    }

    Ok(RouteOutcome { result, preempted })
}

/// Evicts lower-priority reservations from a contact until `size` bytes
/// are physically free, returning the evicted bundle ids.
///
/// The capacity view at the request's priority has already admitted the
/// fragment, so any shortfall is held by lower-priority reservations.
fn preempt(
    table: &mut RoutingTable,
    request: &RouteRequest,
    contact: ContactId,
    size: u64,
) -> Result<Vec<u64>, RouteError> {
    let Some(c) = table.contact(contact) else {
        return Err(RouteError::NoRoute);
    };
    let free = c.physical_free();
    if free >= size {
        return Ok(Vec::new());
    }

    // Evict lowest priority first, largest reservation first
    let mut victims: Vec<routing::ScheduledBundle> = c
        .scheduled
        .iter()
        .filter(|s| s.priority < request.priority)
        .copied()
        .collect();
    victims.sort_by_key(|s| (s.priority, core::cmp::Reverse(s.size)));

    let mut evicted = Vec::new();
    let mut loss_score = 0u64;
    let mut freed = free;
    for victim in victims {
        if freed >= size {
            break;
        }
        freed += victim.size;
        loss_score += victim.size.saturating_mul(victim.priority.weight());
        evicted.push(victim.bundle_id);
    }

    let gain_score = size.saturating_mul(request.priority.weight());
    if freed < size || gain_score <= loss_score {
        return Err(RouteError::BundleTooLarge);
    }

    for bundle_id in &evicted {
        table.unschedule(contact, *bundle_id);
    }
    Ok(evicted)
}

/// Rebinds a bundle to a previously chosen route, skipping recomputation
/// when every contact is still valid and has capacity.
///
/// Falls back to a full [`route`] otherwise.
pub fn try_reuse(
    table: &mut RoutingTable,
    prev: &RouterResult,
    request: &RouteRequest,
    config: &RouterConfig,
) -> Result<RouteOutcome, RouteError> {
    let now = time::OffsetDateTime::now_utc();
    if request.expiry <= now {
        return Err(RouteError::Expired);
    }

    let reusable = !prev.fragments.is_empty()
        && prev.fragments.iter().all(|f| {
            table
                .contact(f.contact)
                .map(|c| {
                    c.to > now && c.from < request.expiry && c.remaining(request.priority) >= f.size
                })
                .unwrap_or(false)
        });
    if reusable {
        return Ok(RouteOutcome {
            result: prev.clone(),
            preempted: Vec::new(),
        });
    }

    route(table, request, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_bpv7::eid::Eid;

    fn gs2() -> Eid {
        "dtn:GS2".parse().unwrap()
    }

    fn config() -> RouterConfig {
        RouterConfig {
            fragment_min_payload: 100,
            max_fragments: 3,
        }
    }

    fn request(size: u64) -> RouteRequest {
        RouteRequest {
            destination: gs2(),
            size,
            priority: Priority::Normal,
            expiry: time::OffsetDateTime::now_utc() + time::Duration::hours(1),
            may_fragment: true,
        }
    }

    /// A contact to dtn:GS2 starting `start_in` seconds from now with the
    /// given byte capacity.
    fn add_contact(table: &mut RoutingTable, start_in: i64, capacity: u64) -> ContactId {
        let now = time::OffsetDateTime::now_utc();
        table.add_contact(
            gs2(),
            "loopback".to_string(),
            "gs2".to_string(),
            now + time::Duration::seconds(start_in),
            now + time::Duration::seconds(start_in + 1),
            capacity,
        )
    }

    #[test]
    fn single_contact_route() {
        let mut table = RoutingTable::new(1024);
        let contact = add_contact(&mut table, 10, 1000);

        let outcome = route(&mut table, &request(500), &config()).unwrap();
        assert_eq!(outcome.result.fragments.len(), 1);
        assert_eq!(outcome.result.fragments[0].size, 500);
        assert_eq!(outcome.result.fragments[0].contact, contact);
        assert!(!outcome.result.preemption_improved);

        // Reserving the capacity drops the contact's remaining bytes
        table.schedule(contact, 1, 500, Priority::Normal).unwrap();
        assert_eq!(
            table.contact(contact).unwrap().remaining(Priority::Normal),
            500
        );
    }

    #[test]
    fn splits_across_two_contacts() {
        let mut table = RoutingTable::new(1024);
        let first = add_contact(&mut table, 10, 1000);
        let second = add_contact(&mut table, 60, 600);

        let outcome = route(&mut table, &request(1500), &config()).unwrap();
        assert_eq!(outcome.result.fragments.len(), 2);
        assert_eq!(outcome.result.fragments[0].contact, first);
        assert_eq!(outcome.result.fragments[0].size, 1000);
        assert_eq!(outcome.result.fragments[1].contact, second);
        assert_eq!(outcome.result.fragments[1].size, 500);
        assert_eq!(
            outcome
                .result
                .fragments
                .iter()
                .map(|f| f.size)
                .sum::<u64>(),
            1500
        );
    }

    #[test]
    fn no_route_without_contacts() {
        let mut table = RoutingTable::new(1024);
        assert_eq!(
            route(&mut table, &request(100), &config()),
            Err(RouteError::NoRoute)
        );
    }

    #[test]
    fn too_large_for_capacity() {
        let mut table = RoutingTable::new(1024);
        add_contact(&mut table, 10, 100);
        assert_eq!(
            route(&mut table, &request(1000), &config()),
            Err(RouteError::BundleTooLarge)
        );
    }

    #[test]
    fn must_not_fragment_cannot_split() {
        let mut table = RoutingTable::new(1024);
        add_contact(&mut table, 10, 1000);
        add_contact(&mut table, 60, 1000);

        let mut req = request(1500);
        req.may_fragment = false;
        assert_eq!(
            route(&mut table, &req, &config()),
            Err(RouteError::BundleTooLarge)
        );
    }

    #[test]
    fn fragment_limit_enforced() {
        let mut table = RoutingTable::new(1024);
        for i in 0..5 {
            add_contact(&mut table, 10 + i * 30, 300);
        }
        assert_eq!(
            route(&mut table, &request(1400), &config()),
            Err(RouteError::FragmentLimit)
        );
    }

    #[test]
    fn expired_bundle_rejected() {
        let mut table = RoutingTable::new(1024);
        add_contact(&mut table, 10, 1000);

        let mut req = request(100);
        req.expiry = time::OffsetDateTime::now_utc() - time::Duration::seconds(1);
        assert_eq!(route(&mut table, &req, &config()), Err(RouteError::Expired));
    }

    #[test]
    fn contacts_past_expiry_ignored() {
        let mut table = RoutingTable::new(1024);
        add_contact(&mut table, 10_000, 1000);

        let mut req = request(100);
        req.expiry = time::OffsetDateTime::now_utc() + time::Duration::seconds(60);
        assert_eq!(route(&mut table, &req, &config()), Err(RouteError::NoRoute));
    }

    #[test]
    fn earlier_start_wins_ties() {
        let mut table = RoutingTable::new(1024);
        let late = add_contact(&mut table, 60, 1000);
        let early = add_contact(&mut table, 10, 1000);

        let outcome = route(&mut table, &request(500), &config()).unwrap();
        assert_eq!(outcome.result.fragments[0].contact, early);
        assert_ne!(outcome.result.fragments[0].contact, late);
    }

    #[test]
    fn preemption_evicts_lower_priority() {
        let mut table = RoutingTable::new(1024);
        let contact = add_contact(&mut table, 10, 1000);

        // Fill the contact with bulk traffic
        table.schedule(contact, 41, 900, Priority::Bulk).unwrap();

        // A normal-priority bundle that does not fit without eviction
        let outcome = route(&mut table, &request(800), &config()).unwrap();
        assert!(outcome.result.preemption_improved);
        assert_eq!(outcome.preempted, vec![41]);
        assert_eq!(outcome.result.fragments.len(), 1);

        // The eviction re-credited the capacity
        assert_eq!(
            table.contact(contact).unwrap().remaining(Priority::Normal),
            1000
        );
    }

    #[test]
    fn preemption_does_not_evict_equal_priority() {
        let mut table = RoutingTable::new(1024);
        let contact = add_contact(&mut table, 10, 1000);
        table.schedule(contact, 41, 900, Priority::Normal).unwrap();

        assert_eq!(
            route(&mut table, &request(800), &config()),
            Err(RouteError::BundleTooLarge)
        );
    }

    #[test]
    fn try_reuse_keeps_valid_route() {
        let mut table = RoutingTable::new(1024);
        let contact = add_contact(&mut table, 10, 1000);

        let req = request(500);
        let outcome = route(&mut table, &req, &config()).unwrap();
        let reused = try_reuse(&mut table, &outcome.result, &req, &config()).unwrap();
        assert_eq!(reused.result, outcome.result);

        // Exhaust the contact; reuse must recompute and fail
        table.schedule(contact, 77, 1000, Priority::Normal).unwrap();
        assert!(matches!(
            try_reuse(&mut table, &outcome.result, &req, &config()),
            Err(RouteError::BundleTooLarge) | Err(RouteError::NoRoute)
        ));
    }
}

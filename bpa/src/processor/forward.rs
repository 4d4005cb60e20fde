use super::*;
use router::{RouteError, RouteOutcome, RouteRequest};

impl Processor {
    /// Routes a bundle towards its destination, fragmenting it if no
    /// single contact has sufficient remaining capacity.
    pub(super) fn forward(&mut self, mut bundle: bundle::Bundle) {
        if let bundle::Data::V7(b) = &mut bundle.data {
            b.increment_hop_count();
        }
        self.place(bundle, self.config.max_fragments, &[]);
    }

    /// Re-routes a bundle after a transient transmission failure, reusing
    /// the previous route when it is still viable.
    pub(super) fn retry(&mut self, bundle: bundle::Bundle) {
        let request = RouteRequest::from(&bundle);
        let prev = self.routes.remove(&bundle.id).unwrap_or_default();
        match router::try_reuse(&mut self.table, &prev, &request, &self.router_config) {
            Ok(outcome) => self.execute(outcome, bundle, self.config.max_fragments, &[]),
            Err(e) => self.routing_failed(bundle, e),
        }
    }

    fn place(&mut self, bundle: bundle::Bundle, allowed: usize, excluded: &[ContactId]) {
        let request = RouteRequest::from(&bundle);
        match router::route_excluding(&mut self.table, &request, &self.router_config, excluded) {
            Ok(outcome) => self.execute(outcome, bundle, allowed, excluded),
            Err(e) => self.routing_failed(bundle, e),
        }
    }

    fn execute(
        &mut self,
        outcome: RouteOutcome,
        bundle: bundle::Bundle,
        allowed: usize,
        excluded: &[ContactId],
    ) {
        // Preempted bundles return to routing before the new reservation
        // is made, so their capacity is genuinely released
        for bundle_id in outcome.preempted {
            if let Some(deferred) = self.deferred.remove(&bundle_id) {
                debug!("Bundle {bundle_id} preempted, re-routing");
                self.routes.remove(&bundle_id);
                self.place(deferred.bundle, self.config.max_fragments, &[]);
            } else {
                // Already on an active TX queue; it will be sent or fail
                // on its own, the reservation is simply gone
                debug!("Preempted bundle {bundle_id} is in transit, not re-routed");
            }
        }

        let plan = outcome.result;
        let Some(first) = plan.fragments.first() else {
            return self.routing_failed(bundle, RouteError::NoRoute);
        };

        if plan.fragments.len() == 1 {
            self.routes.insert(bundle.id, plan.clone());
            return self.schedule_on(first.contact, bundle);
        }

        // Split off the first planned fragment and put the remainder back
        // through routing; recomputation corrects for the per-fragment
        // encoding overhead the plan cannot see
        if allowed <= 1 {
            return self.routing_failed(bundle, RouteError::FragmentLimit);
        }
        match bundle.fragment(first.size as usize) {
            Ok((first_fragment, rest)) => {
                trace!(
                    "Bundle {} split into {} and {}",
                    bundle.id, first_fragment.id, rest.id
                );
                drop(bundle);
                self.schedule_on(first.contact, first_fragment);
                self.place(rest, allowed - 1, excluded);
            }
            Err(e) => {
                warn!("Fragmentation failed: {e}");
                self.routing_failed(bundle, RouteError::BundleTooLarge);
            }
        }
    }

    /// Reserves contact capacity for a bundle and hands it to the TX queue
    /// if the contact is active, or parks it in the deferred set.
    pub(super) fn schedule_on(&mut self, contact: ContactId, bundle: bundle::Bundle) {
        let size = bundle.serialized_size() as u64;
        if let Err(e) = self
            .table
            .schedule(contact, bundle.id, size, bundle.priority())
        {
            warn!("Reservation of {size} bytes failed: {e}");
            return self.routing_failed(bundle, RouteError::BundleTooLarge);
        }

        if let Some(queue) = self.tx_queues.get(&contact) {
            let cla_address = self
                .table
                .contact(contact)
                .map(|c| c.cla_address.clone())
                .unwrap_or_default();
            match queue.try_send(tx::Command::Send(bundle, cla_address)) {
                Ok(()) => {}
                Err(
                    flume::TrySendError::Full(tx::Command::Send(bundle, _))
                    | flume::TrySendError::Disconnected(tx::Command::Send(bundle, _)),
                ) => {
                    // Queue saturated; park the bundle, the expiry timer
                    // bounds how long it can wait
                    self.watch_expiry(&bundle);
                    self.deferred.insert(bundle.id, Deferred { bundle, contact });
                }
                Err(_) => {}
            }
        } else {
            self.watch_expiry(&bundle);
            self.deferred.insert(bundle.id, Deferred { bundle, contact });
        }
    }

    /// Converts a routing failure into a bundle outcome: a deletion status
    /// report when the flags ask for one, then destruction.
    pub(super) fn routing_failed(&mut self, bundle: bundle::Bundle, error: RouteError) {
        debug!("No route for bundle {}: {error}", bundle.id);
        let reason = match error {
            RouteError::NoRoute => {
                tern_bpv7::status_report::ReasonCode::NoKnownRouteToDestinationFromHere
            }
            RouteError::Expired => tern_bpv7::status_report::ReasonCode::LifetimeExpired,
            RouteError::BundleTooLarge | RouteError::FragmentLimit => {
                tern_bpv7::status_report::ReasonCode::NoTimelyContactWithNextNodeOnRoute
            }
        };
        self.destroy(bundle, Some(reason));
    }
}

//! Dependency resolution: a route can only be applied together with both of
//! its endpoint pages.
//!
//! The resolver turns the reviewer's raw decisions into an expanded decision
//! set. It is pure: the only map state it consults is whether a page is
//! already present.

use std::collections::{BTreeMap, BTreeSet};

use navmap_types::{Decision, DiffItem, EdgeId, ItemKey, Map, NodeId, ReasonCode};
use tracing::debug;

use crate::config::RejectionPolicy;

/// Expanded decisions for every item of a diff.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    decisions: BTreeMap<ItemKey, Decision>,
    reasons: BTreeMap<ItemKey, ReasonCode>,
    overridden: BTreeSet<NodeId>,
}

impl Resolution {
    /// The expanded decision for an item. Keys outside the diff are pending.
    pub fn decision(&self, key: &ItemKey) -> Decision {
        self.decisions.get(key).copied().unwrap_or_default()
    }

    /// Why the resolver changed or withheld this item's decision, if it did.
    pub fn reason(&self, key: &ItemKey) -> Option<&ReasonCode> {
        self.reasons.get(key)
    }

    pub fn decisions(&self) -> &BTreeMap<ItemKey, Decision> {
        &self.decisions
    }

    pub fn reasons(&self) -> &BTreeMap<ItemKey, ReasonCode> {
        &self.reasons
    }

    /// Number of distinct pages whose explicit rejection was overridden.
    pub fn conflicts_overridden(&self) -> usize {
        self.overridden.len()
    }

    /// Routes that were approved but held back.
    pub fn demoted(&self) -> Vec<ItemKey> {
        self.reasons
            .iter()
            .filter(|(_, reason)| reason.is_demotion())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Approve a page, crediting the first route that needed it.
    fn force(&mut self, key: ItemKey, reason: ReasonCode) {
        self.decisions.insert(key.clone(), Decision::Approved);
        self.reasons.entry(key).or_insert(reason);
    }
}

/// Expands route approvals into the page approvals they depend on.
#[derive(Clone, Copy, Debug, Default)]
pub struct DependencyResolver {
    policy: RejectionPolicy,
}

impl DependencyResolver {
    pub fn new(policy: RejectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RejectionPolicy {
        self.policy
    }

    /// Resolve `raw` decisions over `items` against the live `map`.
    ///
    /// Items missing from `raw` are pending. For every approved route:
    ///
    /// - an endpoint already in `map` needs nothing;
    /// - an endpoint that is a page item of the diff is forced to approved
    ///   (a rejected one is overridden, or blocks the route under
    ///   [`RejectionPolicy::DemoteRoute`]);
    /// - an endpoint found in neither demotes the route to pending with
    ///   [`ReasonCode::DanglingReference`].
    ///
    /// Forcing only ever turns pages approved, so routes are independent of
    /// each other and the result does not depend on item order beyond which
    /// route gets credited in a page's reason.
    pub fn resolve(
        &self,
        items: &[DiffItem],
        raw: &BTreeMap<ItemKey, Decision>,
        map: &Map,
    ) -> Resolution {
        let raw_decision = |key: &ItemKey| raw.get(key).copied().unwrap_or_default();

        let mut resolution = Resolution::default();
        for item in items {
            let key = item.key();
            let decision = raw_decision(&key);
            resolution.decisions.entry(key).or_insert(decision);
        }

        let pages_in_diff: BTreeSet<&NodeId> = items
            .iter()
            .filter_map(DiffItem::as_page)
            .map(|page| &page.node_id)
            .collect();

        for route in items.iter().filter_map(DiffItem::as_route) {
            let route_key = ItemKey::Route(route.edge_id.clone());
            if !raw_decision(&route_key).is_approved() {
                continue;
            }

            if let Some(reason) = self.blocker(route.endpoints(), &pages_in_diff, &raw_decision, map)
            {
                debug!(route = %route.edge_id, reason = %reason, "route demoted");
                resolution.decisions.insert(route_key.clone(), Decision::Pending);
                resolution.reasons.insert(route_key, reason);
                continue;
            }

            for page in route.endpoints() {
                if map.contains_page(page) {
                    continue;
                }
                let page_key = ItemKey::Page(page.clone());
                match raw_decision(&page_key) {
                    Decision::Approved => {}
                    Decision::Pending => {
                        resolution.force(page_key, forced_by(&route.edge_id));
                    }
                    Decision::Rejected => {
                        resolution.overridden.insert(page.clone());
                        resolution.force(page_key, overridden_by(&route.edge_id));
                    }
                }
            }
        }

        resolution
    }

    /// The reason an approved route cannot be applied, if any.
    fn blocker(
        &self,
        endpoints: [&NodeId; 2],
        pages_in_diff: &BTreeSet<&NodeId>,
        raw_decision: &impl Fn(&ItemKey) -> Decision,
        map: &Map,
    ) -> Option<ReasonCode> {
        for page in endpoints {
            if map.contains_page(page) {
                continue;
            }
            if !pages_in_diff.contains(page) {
                return Some(ReasonCode::DanglingReference { page: page.clone() });
            }
            if self.policy == RejectionPolicy::DemoteRoute
                && raw_decision(&ItemKey::Page(page.clone())).is_rejected()
            {
                return Some(ReasonCode::EndpointRejected { page: page.clone() });
            }
        }
        None
    }
}

fn forced_by(route: &EdgeId) -> ReasonCode {
    ReasonCode::ForcedByRoute {
        route: route.clone(),
    }
}

fn overridden_by(route: &EdgeId) -> ReasonCode {
    ReasonCode::RejectionOverridden {
        route: route.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmap_types::{PageNode, ProjectId, RouteEdge};

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn page(id: &str) -> DiffItem {
        DiffItem::page(PageNode::new(node(id)))
    }

    fn route(id: &str, from: &str, to: &str) -> DiffItem {
        DiffItem::route(RouteEdge::new(EdgeId::new(id).unwrap(), node(from), node(to)))
    }

    fn key(s: &str) -> ItemKey {
        s.parse().unwrap()
    }

    fn decisions(pairs: &[(&str, Decision)]) -> BTreeMap<ItemKey, Decision> {
        pairs.iter().map(|(k, d)| (key(k), *d)).collect()
    }

    fn empty_map() -> Map {
        Map::empty(ProjectId::new("shop").unwrap())
    }

    #[test]
    fn approving_route_forces_pending_endpoints() {
        let items = vec![page("P1"), page("P2"), route("R1", "P1", "P2")];
        let raw = decisions(&[("route:R1", Decision::Approved)]);

        let res = DependencyResolver::default().resolve(&items, &raw, &empty_map());

        assert_eq!(res.decision(&key("page:P1")), Decision::Approved);
        assert_eq!(res.decision(&key("page:P2")), Decision::Approved);
        assert_eq!(res.decision(&key("route:R1")), Decision::Approved);
        assert!(matches!(
            res.reason(&key("page:P1")),
            Some(ReasonCode::ForcedByRoute { .. })
        ));
        assert_eq!(res.conflicts_overridden(), 0);
    }

    #[test]
    fn endpoint_already_in_map_needs_no_forcing() {
        let mut map = empty_map();
        map.insert_page(PageNode::new(node("P1")));
        let items = vec![page("P1"), page("P2"), route("R1", "P1", "P2")];
        let raw = decisions(&[("route:R1", Decision::Approved)]);

        let res = DependencyResolver::default().resolve(&items, &raw, &map);

        assert_eq!(res.decision(&key("page:P1")), Decision::Pending);
        assert_eq!(res.decision(&key("page:P2")), Decision::Approved);
        assert!(res.reason(&key("page:P1")).is_none());
    }

    #[test]
    fn dangling_endpoint_demotes_route() {
        let items = vec![route("R3", "P5", "P6")];
        let raw = decisions(&[("route:R3", Decision::Approved)]);

        let res = DependencyResolver::default().resolve(&items, &raw, &empty_map());

        assert_eq!(res.decision(&key("route:R3")), Decision::Pending);
        assert_eq!(
            res.reason(&key("route:R3")),
            Some(&ReasonCode::DanglingReference { page: node("P5") })
        );
        assert_eq!(res.demoted(), vec![key("route:R3")]);
    }

    #[test]
    fn demoted_route_does_not_force_its_other_endpoint() {
        let items = vec![page("P1"), route("R1", "P1", "P9")];
        let raw = decisions(&[("route:R1", Decision::Approved)]);

        let res = DependencyResolver::default().resolve(&items, &raw, &empty_map());

        assert_eq!(res.decision(&key("page:P1")), Decision::Pending);
        assert_eq!(res.decision(&key("route:R1")), Decision::Pending);
    }

    #[test]
    fn rejected_endpoint_is_overridden_by_default() {
        let items = vec![page("P1"), page("P3"), route("R2", "P1", "P3")];
        let raw = decisions(&[
            ("page:P3", Decision::Rejected),
            ("route:R2", Decision::Approved),
        ]);

        let res = DependencyResolver::default().resolve(&items, &raw, &empty_map());

        assert_eq!(res.decision(&key("page:P3")), Decision::Approved);
        assert!(matches!(
            res.reason(&key("page:P3")),
            Some(ReasonCode::RejectionOverridden { .. })
        ));
        assert_eq!(res.conflicts_overridden(), 1);
    }

    #[test]
    fn rejected_endpoint_demotes_route_under_demote_policy() {
        let items = vec![page("P1"), page("P3"), route("R2", "P1", "P3")];
        let raw = decisions(&[
            ("page:P3", Decision::Rejected),
            ("route:R2", Decision::Approved),
        ]);

        let res = DependencyResolver::new(RejectionPolicy::DemoteRoute).resolve(
            &items,
            &raw,
            &empty_map(),
        );

        assert_eq!(res.decision(&key("page:P3")), Decision::Rejected);
        assert_eq!(res.decision(&key("page:P1")), Decision::Pending);
        assert_eq!(res.decision(&key("route:R2")), Decision::Pending);
        assert_eq!(
            res.reason(&key("route:R2")),
            Some(&ReasonCode::EndpointRejected { page: node("P3") })
        );
        assert_eq!(res.conflicts_overridden(), 0);
    }

    #[test]
    fn page_overridden_by_two_routes_counts_once() {
        let items = vec![
            page("P1"),
            page("P2"),
            route("R1", "P1", "P2"),
            route("R2", "P2", "P1"),
        ];
        let raw = decisions(&[
            ("page:P2", Decision::Rejected),
            ("route:R1", Decision::Approved),
            ("route:R2", Decision::Approved),
        ]);

        let res = DependencyResolver::default().resolve(&items, &raw, &empty_map());

        assert_eq!(res.conflicts_overridden(), 1);
        // The first route in submission order is credited.
        assert_eq!(
            res.reason(&key("page:P2")),
            Some(&ReasonCode::RejectionOverridden {
                route: EdgeId::new("R1").unwrap()
            })
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let items = vec![
            page("P1"),
            page("P2"),
            page("P3"),
            route("R1", "P1", "P2"),
            route("R2", "P2", "P3"),
            route("R3", "P3", "P7"),
        ];
        let raw = decisions(&[
            ("route:R1", Decision::Approved),
            ("route:R2", Decision::Approved),
            ("route:R3", Decision::Approved),
            ("page:P3", Decision::Rejected),
        ]);
        let resolver = DependencyResolver::default();
        let a = resolver.resolve(&items, &raw, &empty_map());
        let b = resolver.resolve(&items, &raw, &empty_map());
        assert_eq!(a, b);
    }

    #[test]
    fn unapproved_routes_are_left_alone() {
        let items = vec![page("P1"), route("R1", "P1", "P9")];
        let raw = decisions(&[("route:R1", Decision::Rejected)]);

        let res = DependencyResolver::default().resolve(&items, &raw, &empty_map());

        assert_eq!(res.decision(&key("route:R1")), Decision::Rejected);
        assert!(res.reasons().is_empty());
    }
}

//! The versioned page/route graph of a project.
//!
//! Pages and routes are held by value inside the [`Map`], keyed by their
//! stable ids. Routes refer to pages by [`NodeId`] only, so a map can be
//! cloned, diffed or persisted without ever creating reference cycles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;
use crate::ids::{EdgeId, NodeId, ProjectId};

/// Descriptive attributes carried through unchanged (label, URL pattern, ...).
pub type Attributes = serde_json::Map<String, Value>;

/// A page of the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageNode {
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl PageNode {
    /// A page with no attributes.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A navigation route between two pages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteEdge {
    pub edge_id: EdgeId,
    pub source_page_id: NodeId,
    pub target_page_id: NodeId,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl RouteEdge {
    /// A route with no attributes.
    pub fn new(edge_id: EdgeId, source_page_id: NodeId, target_page_id: NodeId) -> Self {
        Self {
            edge_id,
            source_page_id,
            target_page_id,
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Source and target page ids, in that order.
    pub fn endpoints(&self) -> [&NodeId; 2] {
        [&self.source_page_id, &self.target_page_id]
    }
}

/// A route whose endpoint is missing from the map that holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DanglingRoute {
    pub edge_id: EdgeId,
    pub missing_page: NodeId,
}

/// The authoritative page/route graph of one project.
///
/// `version` starts at 0 for the implicit empty map and increases by exactly
/// one per merge that inserts at least one new page or route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub project_id: ProjectId,
    pub version: u64,
    #[serde(default)]
    pub pages: BTreeMap<NodeId, PageNode>,
    #[serde(default)]
    pub routes: BTreeMap<EdgeId, RouteEdge>,
}

impl Map {
    /// The implicit map of a project that has never merged anything.
    pub fn empty(project_id: ProjectId) -> Self {
        Self {
            project_id,
            version: 0,
            pages: BTreeMap::new(),
            routes: BTreeMap::new(),
        }
    }

    pub fn contains_page(&self, node_id: &NodeId) -> bool {
        self.pages.contains_key(node_id)
    }

    pub fn contains_route(&self, edge_id: &EdgeId) -> bool {
        self.routes.contains_key(edge_id)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if the map has no pages and no routes.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.routes.is_empty()
    }

    /// Insert a page unless one with the same id exists.
    ///
    /// Returns `true` if the page was genuinely new.
    pub fn insert_page(&mut self, page: PageNode) -> bool {
        if self.pages.contains_key(&page.node_id) {
            return false;
        }
        self.pages.insert(page.node_id.clone(), page);
        true
    }

    /// Insert a route unless one with the same id exists.
    ///
    /// Endpoints are not checked here; call [`Self::validate`] once the whole
    /// batch has been inserted.
    pub fn insert_route(&mut self, route: RouteEdge) -> bool {
        if self.routes.contains_key(&route.edge_id) {
            return false;
        }
        self.routes.insert(route.edge_id.clone(), route);
        true
    }

    /// Every route endpoint that does not resolve to a page of this map.
    pub fn dangling_routes(&self) -> Vec<DanglingRoute> {
        self.routes
            .values()
            .flat_map(|route| {
                route
                    .endpoints()
                    .into_iter()
                    .filter(|page| !self.pages.contains_key(*page))
                    .map(|page| DanglingRoute {
                        edge_id: route.edge_id.clone(),
                        missing_page: page.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Check the no-dangling-edge invariant.
    pub fn validate(&self) -> Result<(), TypeError> {
        match self.dangling_routes().into_iter().next() {
            Some(d) => Err(TypeError::DanglingRoute {
                edge: d.edge_id.to_string(),
                page: d.missing_page.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn edge(id: &str) -> EdgeId {
        EdgeId::new(id).unwrap()
    }

    fn project() -> ProjectId {
        ProjectId::new("shop").unwrap()
    }

    #[test]
    fn empty_map_starts_at_version_zero() {
        let map = Map::empty(project());
        assert_eq!(map.version, 0);
        assert!(map.is_empty());
        assert!(map.validate().is_ok());
    }

    #[test]
    fn insert_page_is_idempotent() {
        let mut map = Map::empty(project());
        assert!(map.insert_page(PageNode::new(node("P1")).with_attribute("label", "Home")));
        assert!(!map.insert_page(PageNode::new(node("P1")).with_attribute("label", "Other")));
        assert_eq!(map.page_count(), 1);
        assert_eq!(map.pages[&node("P1")].attributes["label"], "Home");
    }

    #[test]
    fn dangling_routes_lists_each_missing_endpoint() {
        let mut map = Map::empty(project());
        map.insert_page(PageNode::new(node("P1")));
        map.insert_route(RouteEdge::new(edge("R1"), node("P1"), node("P2")));
        map.insert_route(RouteEdge::new(edge("R2"), node("P3"), node("P4")));

        let dangling = map.dangling_routes();
        assert_eq!(dangling.len(), 3);
        assert!(dangling.contains(&DanglingRoute {
            edge_id: edge("R1"),
            missing_page: node("P2"),
        }));
        assert!(matches!(map.validate(), Err(TypeError::DanglingRoute { .. })));
    }

    #[test]
    fn self_loop_route_is_valid_when_page_present() {
        let mut map = Map::empty(project());
        map.insert_page(PageNode::new(node("P1")));
        map.insert_route(RouteEdge::new(edge("R1"), node("P1"), node("P1")));
        assert!(map.validate().is_ok());
    }

    #[test]
    fn map_json_shape() {
        let mut map = Map::empty(project());
        map.version = 3;
        map.insert_page(PageNode::new(node("P1")));
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["pages"]["P1"]["node_id"], "P1");
        assert!(json["pages"]["P1"].get("attributes").is_none());

        let back: Map = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }
}

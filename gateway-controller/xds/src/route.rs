use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, route_match::PathSpecifier, Route,
    RouteAction, RouteConfiguration, RouteMatch, VirtualHost,
};
use gateway_controller_core as ir;

/// Builds the route configuration served over RDS for an HTTP listener. It shares the
/// listener's name.
pub fn route_configuration(listener: &ir::HttpListener) -> RouteConfiguration {
    let domains = if listener.hostnames.is_empty() {
        vec!["*".to_string()]
    } else {
        listener.hostnames.clone()
    };

    RouteConfiguration {
        name: listener.name.clone(),
        virtual_hosts: vec![VirtualHost {
            name: listener.name.clone(),
            domains,
            routes: listener.routes.iter().map(route).collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn route_match(path_match: &ir::PathMatch) -> RouteMatch {
    let path_specifier = match path_match {
        ir::PathMatch::Prefix(prefix) => PathSpecifier::Prefix(prefix.clone()),
        ir::PathMatch::Exact(path) => PathSpecifier::Path(path.clone()),
    };
    RouteMatch {
        path_specifier: Some(path_specifier),
        ..Default::default()
    }
}

/// Routes to the cluster named after the route.
fn route(route: &ir::HttpRoute) -> Route {
    Route {
        name: route.name.clone(),
        r#match: Some(route_match(&route.path_match)),
        action: Some(Action::Route(RouteAction {
            cluster_specifier: Some(ClusterSpecifier::Cluster(route.name.clone())),
            ..Default::default()
        })),
        ..Default::default()
    }
}

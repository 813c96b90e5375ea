//! Assembles Envoy listeners and their filter chains.

use crate::{
    wellknown::{self, ads_config_source, socket_address, types},
    Error,
};
use envoy_types::pb::{
    envoy::{
        config::{
            core::v3::{
                data_source, socket_address::Protocol, transport_socket, DataSource,
                TransportSocket,
            },
            listener::v3::{
                filter, listener_filter, Filter, FilterChain, FilterChainMatch, Listener,
                ListenerFilter,
            },
        },
        extensions::{
            filters::{
                http::router::v3::Router,
                listener::tls_inspector::v3::TlsInspector,
                network::{
                    http_connection_manager::v3::{
                        http_connection_manager::{CodecType, RouteSpecifier},
                        http_filter, HttpConnectionManager, HttpFilter, Rds,
                    },
                    tcp_proxy::v3::{tcp_proxy::ClusterSpecifier, TcpProxy},
                },
                udp::udp_proxy::v3::{
                    udp_proxy_config::RouteSpecifier as UdpRouteSpecifier, Route as UdpRoute,
                    UdpProxyConfig,
                },
            },
            transport_sockets::tls::v3::{
                secret, CommonTlsContext, DownstreamTlsContext, SdsSecretConfig, Secret,
                TlsCertificate,
            },
        },
    },
    xds::{
        core::v3::TypedExtensionConfig,
        r#type::matcher::v3::{matcher::on_match, matcher::OnMatch, Matcher},
    },
};
use gateway_controller_core as ir;

/// Builds a TCP listener with no filter chains.
///
/// Connections that match no filter chain are logged to stdout.
pub fn tcp_listener(name: &str, address: &str, port: u32) -> Listener {
    Listener {
        name: name.to_string(),
        address: Some(socket_address(Protocol::Tcp, address, port)),
        access_log: vec![wellknown::listener_access_log()],
        ..Default::default()
    }
}

/// Adds a filter chain serving `listener`'s routes over RDS.
///
/// `jwt_authn`, when set, runs before the terminal router filter. TLS listeners terminate
/// TLS with a certificate delivered over SDS under the listener's name, and match on SNI
/// unless their hostnames are empty or the wildcard.
pub fn add_http_filter_chain(
    xds: &mut Listener,
    listener: &ir::HttpListener,
    jwt_authn: Option<HttpFilter>,
) -> Result<(), Error> {
    let hcm = http_connection_manager(listener, jwt_authn);
    let mut chain = FilterChain {
        filters: vec![Filter {
            name: wellknown::HTTP_CONNECTION_MANAGER.to_string(),
            config_type: Some(filter::ConfigType::TypedConfig(wellknown::to_any(
                types::HTTP_CONNECTION_MANAGER,
                &hcm,
            ))),
        }],
        ..Default::default()
    };

    if listener.tls.is_some() {
        chain.transport_socket = Some(downstream_tls_socket(&listener.name));
        attach_filter_chain(xds, chain, &listener.hostnames)
    } else {
        attach_filter_chain(xds, chain, &[])
    }
}

/// Adds a filter chain proxying connections to `cluster`.
///
/// TLS passthrough chains match on the listener's SNIs.
pub fn add_tcp_filter_chain(
    xds: &mut Listener,
    listener: &ir::TcpListener,
    cluster: &str,
) -> Result<(), Error> {
    let stat_prefix = if listener.tls.is_some() {
        "passthrough"
    } else {
        "tcp"
    };
    let proxy = TcpProxy {
        stat_prefix: stat_prefix.to_string(),
        cluster_specifier: Some(ClusterSpecifier::Cluster(cluster.to_string())),
        access_log: vec![wellknown::stdout_access_log()],
        ..Default::default()
    };
    let chain = FilterChain {
        filters: vec![Filter {
            name: wellknown::TCP_PROXY.to_string(),
            config_type: Some(filter::ConfigType::TypedConfig(wellknown::to_any(
                types::TCP_PROXY,
                &proxy,
            ))),
        }],
        ..Default::default()
    };

    let snis = listener
        .tls
        .as_ref()
        .map(|tls| tls.snis.as_slice())
        .unwrap_or_default();
    attach_filter_chain(xds, chain, snis)
}

/// Builds a UDP listener that forwards every datagram to `cluster`.
pub fn udp_listener(listener: &ir::UdpListener, cluster: &str) -> Listener {
    let route = UdpRoute {
        cluster: cluster.to_string(),
    };
    let proxy = UdpProxyConfig {
        stat_prefix: "service".to_string(),
        access_log: vec![wellknown::stdout_access_log()],
        route_specifier: Some(UdpRouteSpecifier::Matcher(Matcher {
            on_no_match: Some(Box::new(OnMatch {
                on_match: Some(on_match::OnMatch::Action(TypedExtensionConfig {
                    name: "route".to_string(),
                    typed_config: Some(wellknown::to_any(types::UDP_ROUTE, &route)),
                })),
                ..Default::default()
            })),
            ..Default::default()
        })),
        ..Default::default()
    };

    Listener {
        name: listener.name.clone(),
        address: Some(socket_address(
            Protocol::Udp,
            &listener.address,
            listener.port,
        )),
        access_log: vec![wellknown::stdout_access_log()],
        listener_filters: vec![ListenerFilter {
            name: wellknown::UDP_PROXY.to_string(),
            config_type: Some(listener_filter::ConfigType::TypedConfig(wellknown::to_any(
                types::UDP_PROXY,
                &proxy,
            ))),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Builds the certificate served by a TLS listener. It is named after the listener.
pub fn downstream_tls_secret(name: &str, tls: &ir::TlsListenerConfig) -> Secret {
    let inline = |bytes: &[u8]| DataSource {
        specifier: Some(data_source::Specifier::InlineBytes(bytes.to_vec())),
        ..Default::default()
    };
    Secret {
        name: name.to_string(),
        r#type: Some(secret::Type::TlsCertificate(TlsCertificate {
            certificate_chain: Some(inline(&tls.server_certificate)),
            private_key: Some(inline(&tls.private_key)),
            ..Default::default()
        })),
    }
}

/// Adds the TLS inspector listener filter unless it is already present.
pub fn add_tls_inspector(xds: &mut Listener) {
    if xds
        .listener_filters
        .iter()
        .any(|f| f.name == wellknown::TLS_INSPECTOR)
    {
        return;
    }

    xds.listener_filters.push(ListenerFilter {
        name: wellknown::TLS_INSPECTOR.to_string(),
        config_type: Some(listener_filter::ConfigType::TypedConfig(wellknown::to_any(
            types::TLS_INSPECTOR,
            &TlsInspector::default(),
        ))),
        ..Default::default()
    });
}

/// Returns the RDS route configuration name of the HTTP connection manager in the
/// listener's default filter chain.
pub fn find_route_config_name(xds: &Listener) -> Option<String> {
    let chain = xds.default_filter_chain.as_ref()?;
    let filter = chain
        .filters
        .iter()
        .find(|f| f.name == wellknown::HTTP_CONNECTION_MANAGER)?;
    let filter::ConfigType::TypedConfig(any) = filter.config_type.as_ref()? else {
        return None;
    };
    let hcm =
        wellknown::from_any::<HttpConnectionManager>(types::HTTP_CONNECTION_MANAGER, any)?;
    match hcm.route_specifier? {
        RouteSpecifier::Rds(rds) => Some(rds.route_config_name),
        _ => None,
    }
}

fn http_connection_manager(
    listener: &ir::HttpListener,
    jwt_authn: Option<HttpFilter>,
) -> HttpConnectionManager {
    let router = HttpFilter {
        name: wellknown::ROUTER.to_string(),
        config_type: Some(http_filter::ConfigType::TypedConfig(wellknown::to_any(
            types::ROUTER,
            &Router::default(),
        ))),
        ..Default::default()
    };
    // The router must be last.
    let http_filters = jwt_authn.into_iter().chain(Some(router)).collect();

    let stat_prefix = if listener.tls.is_some() {
        "https"
    } else {
        "http"
    };

    HttpConnectionManager {
        codec_type: CodecType::Auto as i32,
        stat_prefix: stat_prefix.to_string(),
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            config_source: Some(ads_config_source()),
            route_config_name: listener.name.clone(),
        })),
        http_filters,
        access_log: vec![wellknown::stdout_access_log()],
        ..Default::default()
    }
}

fn downstream_tls_socket(name: &str) -> TransportSocket {
    let ctx = DownstreamTlsContext {
        common_tls_context: Some(CommonTlsContext {
            tls_certificate_sds_secret_configs: vec![SdsSecretConfig {
                name: name.to_string(),
                sds_config: Some(ads_config_source()),
            }],
            ..Default::default()
        }),
        ..Default::default()
    };
    TransportSocket {
        name: wellknown::TRANSPORT_SOCKET_TLS.to_string(),
        config_type: Some(transport_socket::ConfigType::TypedConfig(wellknown::to_any(
            types::DOWNSTREAM_TLS_CONTEXT,
            &ctx,
        ))),
    }
}

/// Adds `chain` matching on `server_names`, or as the default chain when there are no
/// server names to match.
fn attach_filter_chain(
    xds: &mut Listener,
    mut chain: FilterChain,
    server_names: &[String],
) -> Result<(), Error> {
    match server_names {
        [] => set_default_filter_chain(xds, chain),
        [first, ..] if first == "*" => set_default_filter_chain(xds, chain),
        names => {
            chain.filter_chain_match = Some(FilterChainMatch {
                server_names: names.to_vec(),
                ..Default::default()
            });
            xds.filter_chains.push(chain);
            add_tls_inspector(xds);
            Ok(())
        }
    }
}

fn set_default_filter_chain(xds: &mut Listener, chain: FilterChain) -> Result<(), Error> {
    if xds.default_filter_chain.is_some() {
        return Err(Error::DuplicateDefaultFilterChain(xds.name.clone()));
    }
    xds.default_filter_chain = Some(chain);
    Ok(())
}

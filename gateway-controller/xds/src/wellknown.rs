//! Envoy extension names, type URLs, and small builders shared across resources.

use envoy_types::pb::{
    envoy::{
        config::{
            accesslog::v3::{
                access_log::ConfigType as AccessLogConfigType,
                access_log_filter::FilterSpecifier, AccessLog, AccessLogFilter,
                ResponseFlagFilter,
            },
            core::v3::{
                address, config_source::ConfigSourceSpecifier, socket_address, Address,
                AggregatedConfigSource, ApiVersion, ConfigSource, SocketAddress,
            },
        },
        extensions::access_loggers::file::v3::FileAccessLog,
    },
    google::protobuf::{Any, Duration},
};
use prost::Message;

pub const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";
pub const TCP_PROXY: &str = "envoy.filters.network.tcp_proxy";
pub const UDP_PROXY: &str = "envoy.filters.udp_listener.udp_proxy";
pub const ROUTER: &str = "envoy.filters.http.router";
pub const JWT_AUTHN: &str = "envoy.filters.http.jwt_authn";
pub const TLS_INSPECTOR: &str = "envoy.filters.listener.tls_inspector";
pub const TRANSPORT_SOCKET_TLS: &str = "envoy.transport_sockets.tls";
pub const FILE_ACCESS_LOG: &str = "envoy.access_loggers.file";
pub const HTTP_PROTOCOL_OPTIONS: &str = "envoy.extensions.upstreams.http.v3.HttpProtocolOptions";

/// Fully-qualified protobuf message names, used to build `Any` type URLs.
pub mod types {
    pub const LISTENER: &str = "envoy.config.listener.v3.Listener";
    pub const CLUSTER: &str = "envoy.config.cluster.v3.Cluster";
    pub const ROUTE_CONFIGURATION: &str = "envoy.config.route.v3.RouteConfiguration";
    pub const SECRET: &str = "envoy.extensions.transport_sockets.tls.v3.Secret";
    pub const HTTP_CONNECTION_MANAGER: &str =
        "envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
    pub const TCP_PROXY: &str = "envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy";
    pub const UDP_PROXY: &str = "envoy.extensions.filters.udp.udp_proxy.v3.UdpProxyConfig";
    pub const UDP_ROUTE: &str = "envoy.extensions.filters.udp.udp_proxy.v3.Route";
    pub const ROUTER: &str = "envoy.extensions.filters.http.router.v3.Router";
    pub const JWT_AUTHENTICATION: &str =
        "envoy.extensions.filters.http.jwt_authn.v3.JwtAuthentication";
    pub const TLS_INSPECTOR: &str =
        "envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector";
    pub const DOWNSTREAM_TLS_CONTEXT: &str =
        "envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";
    pub const UPSTREAM_TLS_CONTEXT: &str =
        "envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext";
    pub const FILE_ACCESS_LOG: &str = "envoy.extensions.access_loggers.file.v3.FileAccessLog";
    pub const HTTP_PROTOCOL_OPTIONS: &str =
        "envoy.extensions.upstreams.http.v3.HttpProtocolOptions";
}

/// Encodes `msg` as an `Any` of the named message type.
pub fn to_any(type_name: &str, msg: &impl Message) -> Any {
    Any {
        type_url: type_url(type_name),
        value: msg.encode_to_vec(),
    }
}

/// Decodes `any` as `M`, returning `None` if it holds a different message type or does not
/// decode.
pub fn from_any<M: Message + Default>(type_name: &str, any: &Any) -> Option<M> {
    if any.type_url != type_url(type_name) {
        return None;
    }
    M::decode(any.value.as_slice()).ok()
}

pub fn type_url(type_name: &str) -> String {
    format!("type.googleapis.com/{type_name}")
}

/// Resources are delivered over the aggregated discovery service.
pub fn ads_config_source() -> ConfigSource {
    ConfigSource {
        resource_api_version: ApiVersion::V3 as i32,
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource {})),
        ..Default::default()
    }
}

pub fn seconds(seconds: i64) -> Duration {
    Duration { seconds, nanos: 0 }
}

pub fn socket_address(protocol: socket_address::Protocol, address: &str, port: u32) -> Address {
    Address {
        address: Some(address::Address::SocketAddress(SocketAddress {
            protocol: protocol as i32,
            address: address.to_string(),
            port_specifier: Some(socket_address::PortSpecifier::PortValue(port)),
            ..Default::default()
        })),
    }
}

/// Logs to the proxy's stdout.
pub fn stdout_access_log() -> AccessLog {
    let file = FileAccessLog {
        path: "/dev/stdout".to_string(),
        ..Default::default()
    };
    AccessLog {
        name: FILE_ACCESS_LOG.to_string(),
        config_type: Some(AccessLogConfigType::TypedConfig(to_any(
            types::FILE_ACCESS_LOG,
            &file,
        ))),
        ..Default::default()
    }
}

/// Logs only connections that matched no filter chain.
pub fn listener_access_log() -> AccessLog {
    AccessLog {
        filter: Some(AccessLogFilter {
            filter_specifier: Some(FilterSpecifier::ResponseFlagFilter(ResponseFlagFilter {
                flags: vec!["NR".to_string()],
            })),
        }),
        ..stdout_access_log()
    }
}

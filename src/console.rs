//! Human-facing console output: startup summary, shutdown notice, fatal errors.

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use owo_colors::{OwoColorize, Stream};
use serde_json::Value;

use crate::config::AppConfig;
use crate::http::RouteTable;

/// Print the configuration, listening URLs and routes.
pub fn print_startup_summary(config: &AppConfig, addr: SocketAddr, routes: &RouteTable) {
    println!();
    println!(
        "{} {}",
        env!("CARGO_PKG_NAME").if_supports_color(Stream::Stdout, |t| t.bold()),
        env!("CARGO_PKG_VERSION").if_supports_color(Stream::Stdout, |t| t.dimmed())
    );

    section("Configuration");
    for (key, value) in config_lines(config) {
        field(&key, value);
    }

    section("Listening");
    let port = addr.port();
    field("Local", format!("http://127.0.0.1:{port}"));
    for ip in network_addresses(addr.ip()) {
        field("Network", format!("http://{ip}:{port}"));
    }

    section("Routes");
    for route in routes.iter() {
        println!("  {route}");
    }

    println!();
    println!(
        "{}",
        "Server is running. Press Ctrl-C to stop."
            .if_supports_color(Stream::Stdout, |t| t.green())
    );
}

pub fn print_shutdown_notice() {
    println!(
        "{}",
        "Server is shutting down".if_supports_color(Stream::Stdout, |t| t.red())
    );
}

/// Print a fatal error to stderr.
pub fn print_fatal(error: &dyn std::error::Error) {
    eprintln!(
        "{} {}",
        "error:".if_supports_color(Stream::Stderr, |t| t.red()),
        error
    );
    let mut source = error.source();
    while let Some(cause) = source {
        eprintln!(
            "  {} {}",
            "caused by:".if_supports_color(Stream::Stderr, |t| t.dimmed()),
            cause
        );
        source = cause.source();
    }
}

fn section(title: &str) {
    println!();
    println!("{}", title.if_supports_color(Stream::Stdout, |t| t.bold()));
}

fn field(label: &str, value: impl Display) {
    println!(
        "  {:<36} {}",
        label.if_supports_color(Stream::Stdout, |t| t.dimmed()),
        value
    );
}

/// Configuration flattened into `key.path = value` pairs.
fn config_lines(config: &AppConfig) -> Vec<(String, String)> {
    let mut lines = Vec::new();
    if let Ok(value) = serde_json::to_value(config) {
        flatten("", &value, &mut lines);
    }
    lines
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, value, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Addresses other machines would reach us on, if we listen beyond loopback.
fn network_addresses(bound: IpAddr) -> Vec<IpAddr> {
    if bound.is_loopback() {
        return Vec::new();
    }
    if !bound.is_unspecified() {
        return vec![bound];
    }
    let mut found: Vec<IpAddr> = interface_ipv4_addresses()
        .into_iter()
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .map(IpAddr::V4)
        .collect();
    found.sort();
    found.dedup();
    found
}

/// IPv4 addresses of every local interface.
#[cfg(unix)]
fn interface_ipv4_addresses() -> Vec<Ipv4Addr> {
    match nix::ifaddrs::getifaddrs() {
        Ok(interfaces) => interfaces
            .filter_map(|interface| {
                let address = interface.address?;
                address.as_sockaddr_in().map(|sin| sin.ip())
            })
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not list network interfaces");
            Vec::new()
        }
    }
}

/// IPv4 address of the outbound interface.
#[cfg(not(unix))]
fn interface_ipv4_addresses() -> Vec<Ipv4Addr> {
    use std::net::UdpSocket;

    // Connecting a UDP socket sends nothing; it only selects the outbound interface.
    let outbound = || {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        }
    };
    outbound().into_iter().collect()
}

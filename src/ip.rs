/// Client IP address extraction
///
/// The address keys the post cooldown and identifies anonymous reporters.
/// Forwarding headers are trusted as sent, so deploy behind a proxy that
/// overwrites them.
use actix_web::HttpRequest;
use std::net::IpAddr;

/// Used when no address can be determined. All such clients share one identity.
pub const UNKNOWN_IP: &str = "unknown";

/// Extract the real client IP address from an HTTP request.
///
/// Checks headers in order of preference:
/// 1. X-Forwarded-For (first IP in the list)
/// 2. X-Real-IP
/// 3. Remote peer address
pub fn extract_client_ip(req: &HttpRequest) -> Option<String> {
    // Check X-Forwarded-For header (proxy chains)
    if let Some(xff) = req.headers().get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // Take the first IP in the chain (the original client)
            if let Some(first_ip) = xff_str.split(',').next() {
                if let Some(ip) = parse_ip(first_ip) {
                    return Some(ip);
                }
            }
        }
    }

    // Check X-Real-IP header (nginx, etc.)
    if let Some(xri) = req.headers().get("x-real-ip") {
        if let Ok(xri_str) = xri.to_str() {
            if let Some(ip) = parse_ip(xri_str) {
                return Some(ip);
            }
        }
    }

    req.peer_addr().map(|peer| peer.ip().to_string())
}

/// Like [`extract_client_ip`], with [`UNKNOWN_IP`] as the fallback.
pub fn client_ip_or_unknown(req: &HttpRequest) -> String {
    extract_client_ip(req).unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn parse_ip(raw: &str) -> Option<String> {
    raw.trim().parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

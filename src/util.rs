//! Small helpers shared by the handlers: caller identity extraction and a
//! memoised Aho–Corasick builder for literal filter terms.

use ahash::AHasher;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use axum::http::HeaderMap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

/// Key used when no address information is available at all.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Derive the caller's network identity.  Headers are consulted in order:
/// `x-forwarded-for` (first hop only), `x-real-ip`, then the socket peer.
pub fn caller_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(addr) = real_ip {
        return addr.to_string();
    }
    peer.map(|p| p.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
}

/// A memoising wrapper around `AhoCorasick::new` to avoid recompiling
/// automata for repeated lists.  The cache key is a hash of the pattern list.
static AC_CACHE: Lazy<DashMap<u64, Arc<AhoCorasick>>> = Lazy::new(DashMap::new);

/// Given a list of literal patterns, return a shared `AhoCorasick` matcher
/// over their lowercased forms, building it on first use.  Haystacks must be
/// lowercased the same way (`str::to_lowercase`) before matching.  Returns
/// `None` when the automaton cannot be built (pathological pattern sizes).
pub fn ac_for(list: &[String]) -> Option<Arc<AhoCorasick>> {
    let mut hasher = AHasher::default();
    for pat in list {
        pat.hash(&mut hasher);
    }
    let key = hasher.finish();
    if let Some(existing) = AC_CACHE.get(&key) {
        return Some(existing.clone());
    }
    let lower: Vec<String> = list.iter().map(|p| p.to_lowercase()).collect();
    let ac = match AhoCorasickBuilder::new().build(&lower) {
        Ok(ac) => ac,
        Err(err) => {
            tracing::warn!(error = %err, "failed to build literal matcher, ignoring terms");
            return None;
        }
    };
    let arc = Arc::new(ac);
    AC_CACHE.insert(key, arc.clone());
    Some(arc)
}

//! Example of a search handler guarded by a shared rate limiter registry.

use site_ratelimit::{RateLimitKey, RateLimitPolicy, RateLimiterRegistry};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

/// Outcome a handler would map to an HTTP response.
#[derive(Debug)]
enum SearchResponse {
    Results(Vec<&'static str>),
    TooManyRequests,
}

struct SearchHandler {
    limiter: Arc<RateLimiterRegistry>,
}

impl SearchHandler {
    fn handle(&self, client: IpAddr, query: &str) -> SearchResponse {
        let key = RateLimitKey::for_addr("search", client);
        if !self.limiter.check(key.as_str()) {
            return SearchResponse::TooManyRequests;
        }

        const POSTS: [&str; 3] = ["Rust in production", "Notes on token buckets", "Travel log"];
        let query = query.to_lowercase();
        SearchResponse::Results(
            POSTS
                .into_iter()
                .filter(|title| title.to_lowercase().contains(&query))
                .collect(),
        )
    }
}

fn report(label: &str, response: SearchResponse) {
    match response {
        SearchResponse::Results(titles) => {
            println!("{label}: {} result(s) {:?}", titles.len(), titles);
        }
        SearchResponse::TooManyRequests => println!("{label}: 429 Too Many Requests"),
    }
}

#[tokio::main]
async fn main() {
    println!("Search Rate Limit Example");
    println!("=========================");

    let policy = RateLimitPolicy::search();
    println!("Configuration:");
    println!("  Burst: {} searches", policy.capacity());
    println!("  Refill: {} searches/second", policy.limit().rate());
    println!("  Idle eviction: {:?}", policy.idle_eviction_window());

    let limiter = Arc::new(RateLimiterRegistry::new(policy));
    let evictor = limiter.spawn_evictor();
    let handler = SearchHandler {
        limiter: Arc::clone(&limiter),
    };

    let alice = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5));
    let bob = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 23));

    for attempt in 1..=12 {
        report(&format!("alice #{attempt}"), handler.handle(alice, "rust"));
    }
    report("bob #1", handler.handle(bob, "token"));
    println!("\nLive buckets: {}", limiter.len());

    evictor.abort();
}

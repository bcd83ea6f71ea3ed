//! Concurrent load generator for `POST /v1/chat/completions`.
//!
//! Fires `--concurrency` simultaneous requesters against `--url` for
//! `--duration-secs`, using one shared credential, and reports admitted /
//! rate-limited / errored counts plus latency percentiles. Proves the
//! limiter behaves correctly under many simultaneous requests from a single
//! process, standing in for a small fleet of nodes sharing one Redis.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use reqwest::Client;
use serde_json::json;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "load_generator", about = "Load generator for ratewall")]
struct Args {
    /// Base URL of the ratewall server, e.g. http://127.0.0.1:8080
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Credential to send as a Bearer token.
    #[arg(long, default_value = "sk-loadtest")]
    credential: String,

    /// Number of concurrent requesters.
    #[arg(long, default_value_t = 16)]
    concurrency: usize,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    rate_limited: AtomicU64,
    errored: AtomicU64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let client = Client::new();
    let counters = Arc::new(Counters::default());
    let latencies = Arc::new(Mutex::new(Vec::<Duration>::new()));
    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);

    let mut workers = Vec::with_capacity(args.concurrency);
    for _ in 0..args.concurrency {
        let client = client.clone();
        let counters = Arc::clone(&counters);
        let latencies = Arc::clone(&latencies);
        let url = format!("{}/v1/chat/completions", args.url.trim_end_matches('/'));
        let credential = args.credential.clone();

        workers.push(tokio::spawn(async move {
            while Instant::now() < deadline {
                let started = Instant::now();
                let response = client
                    .post(&url)
                    .bearer_auth(&credential)
                    .json(&json!({
                        "model": "mock-1",
                        "messages": [{"role": "user", "content": "load test message"}],
                        "max_tokens": 64
                    }))
                    .send()
                    .await;

                latencies.lock().await.push(started.elapsed());

                match response {
                    Ok(response) if response.status().is_success() => {
                        counters.admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(response) if response.status().as_u16() == 429 => {
                        counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {
                        counters.errored.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.await;
    }

    let mut latencies = Arc::try_unwrap(latencies)
        .expect("all workers finished")
        .into_inner();
    latencies.sort();

    let admitted = counters.admitted.load(Ordering::Relaxed);
    let rate_limited = counters.rate_limited.load(Ordering::Relaxed);
    let errored = counters.errored.load(Ordering::Relaxed);
    let total = admitted + rate_limited + errored;

    println!("total requests: {total}");
    println!("admitted:       {admitted}");
    println!("rate limited:   {rate_limited}");
    println!("errored:        {errored}");

    if !latencies.is_empty() {
        println!("p50: {:?}", percentile(&latencies, 0.50));
        println!("p90: {:?}", percentile(&latencies, 0.90));
        println!("p99: {:?}", percentile(&latencies, 0.99));
    }
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let index = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[index]
}

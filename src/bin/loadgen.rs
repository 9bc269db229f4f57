use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::stream::{self, StreamExt};

#[derive(Parser)]
#[command(name = "loadgen")]
#[command(about = "Drive traffic at the sample app and show the resulting request counters", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Path to request, e.g. `/` or `/hello/alice`
    #[arg(short, long, default_value = "/")]
    path: String,

    /// Total number of requests
    #[arg(short = 'n', long, default_value_t = 100)]
    requests: usize,

    /// Requests in flight at once
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,
}

struct Outcome {
    ok: bool,
    latency: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let target = format!("{}{}", cli.url.trim_end_matches('/'), cli.path);

    let started = Instant::now();
    let outcomes: Vec<Outcome> = stream::iter(0..cli.requests)
        .map(|_| {
            let client = client.clone();
            let target = target.clone();
            async move {
                let start = Instant::now();
                let ok = match client.get(&target).send().await {
                    Ok(res) => res.status().is_success(),
                    Err(e) => {
                        eprintln!("request error: {}", e);
                        false
                    }
                };
                Outcome {
                    ok,
                    latency: start.elapsed(),
                }
            }
        })
        .buffer_unordered(cli.concurrency.max(1))
        .collect()
        .await;
    let wall = started.elapsed();

    let succeeded = outcomes.iter().filter(|o| o.ok).count();
    let mut latencies: Vec<Duration> = outcomes.iter().map(|o| o.latency).collect();
    latencies.sort();

    println!("target:      {}", target);
    println!("requests:    {} ({} ok, {} failed)", outcomes.len(), succeeded, outcomes.len() - succeeded);
    println!("wall time:   {:.2?}", wall);
    for (label, q) in [("p50", 0.50), ("p90", 0.90), ("p99", 0.99)] {
        if let Some(latency) = percentile(&latencies, q) {
            println!("{}:         {:.2?}", label, latency);
        }
    }

    let res = client
        .get(format!("{}/metrics", cli.url.trim_end_matches('/')))
        .send()
        .await?;
    if !res.status().is_success() {
        eprintln!("Error: metrics endpoint returned status {}", res.status());
        return Ok(());
    }

    println!();
    println!("app_requests_total:");
    let body = res.text().await?;
    for line in body.lines().filter(|l| l.starts_with("app_requests_total{")) {
        println!("  {}", line);
    }

    Ok(())
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], q: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    Some(sorted[rank - 1])
}

use stress_test::{
    stress_test_detach_churn, stress_test_feed_storm, stress_test_scaling,
    stress_test_stream_feeds,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer())
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };
    let all_converged = rt.block_on(async_main());
    if !all_converged {
        std::process::exit(1);
    }
}

async fn async_main() -> bool {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            DASHBOARD STRESS TESTS                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut all_converged = true;

    // Test 1: memory feeds, small collections
    let stats = stress_test_feed_storm(200, 50).await;
    stats.print();
    all_converged &= stats.converged;

    // Test 2: memory feeds, large collections
    let stats = stress_test_feed_storm(100, 2_000).await;
    stats.print();
    all_converged &= stats.converged;

    // Test 3: stream feeds
    let stats = stress_test_stream_feeds(200, 100).await;
    stats.print();
    all_converged &= stats.converged;

    // Test 4: teardown under load
    let stats = stress_test_detach_churn(200, 100).await;
    stats.print();
    all_converged &= stats.converged;

    // Test 5: scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (Feed Storm)                     ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(1_000, 250).await;

    if all_converged {
        println!("\n✓ All stress tests converged!");
    } else {
        println!("\n✗ Divergence detected, see warnings above");
    }
    all_converged
}

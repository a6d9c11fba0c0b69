use serde::Serialize;
use tracing::info;

use crate::config::{Command, RunArgs};
use crate::models::{TestRunConfig, Thresholds};
use crate::store::{clear_access_token, set_access_token};
use crate::testing::PerfTesting;

pub async fn run(testing: &PerfTesting, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run(args) => run_test(testing, args).await,
        Command::Health => print_json(&testing.check_health().await),
        Command::WatchHealth {
            interval_secs,
            count,
        } => watch_health(testing, interval_secs, count).await,
        Command::History => print_json(&testing.fetch_history().await?),
        Command::Analysis { run_id } => match testing.fetch_ai_analysis(&run_id).await? {
            Some(analysis) => print_json(&analysis),
            None => {
                eprintln!("AI analysis not available yet for run {}", run_id);
                Ok(())
            }
        },
        Command::RequestAnalysis { run_id } => {
            print_json(&testing.request_ai_analysis(&run_id).await?)
        }
        Command::LocalHistory => print_json(&testing.execution_history()),
        Command::ClearHistory => {
            testing.clear_execution_history()?;
            info!("Local execution history cleared");
            Ok(())
        }
        Command::Login { token } => {
            set_access_token(testing.client().store().as_ref(), &token)?;
            info!("Access token stored");
            Ok(())
        }
        Command::Logout => {
            clear_access_token(testing.client().store().as_ref())?;
            info!("Access token removed");
            Ok(())
        }
    }
}

pub fn run_config(args: &RunArgs) -> TestRunConfig {
    TestRunConfig::new(args.test_name.clone(), args.url.clone())
        .with_test_type(args.test_type)
        .with_load(args.concurrent_users, args.duration_secs, args.ramp_up_secs)
        .with_thresholds(Thresholds {
            response_time_ms: args.max_response_time,
            error_rate_pct: args.max_error_rate,
            throughput: args.min_throughput,
        })
}

async fn run_test(testing: &PerfTesting, args: RunArgs) -> anyhow::Result<()> {
    let config = run_config(&args);
    let dispatched = testing.execute_test(&config).await?;

    let view = if args.no_wait {
        dispatched.view
    } else {
        info!("Waiting for time series and AI analysis...");
        dispatched.enrichment.wait().await
    };
    print_json(&view)
}

async fn watch_health(testing: &PerfTesting, interval_secs: u64, count: Option<u32>) -> anyhow::Result<()> {
    let period = std::time::Duration::from_secs(interval_secs.max(1));
    let mut prober = testing.spawn_health_prober_every(period);
    let mut updates = prober.subscribe();
    let mut seen = 0u32;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(status) = latest {
                    print_json(&status)?;
                    seen += 1;
                    if count.is_some_and(|limit| seen >= limit) {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    prober.stop();
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! Smoke-runs a configuration against a canned position provider: brings
//! every component up, drives a handful of ticks, records synthetic
//! handover events for each scheme, and prints a comparison report.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use ntn_common::model::{AccessStrategy, HandoverEvent, HandoverResult, Scheme, UeAccessProfile};
use ntn_common::CoreConfig;
use ntn_core::canned_provider::CannedPositionProvider;
use ntn_core::runtime::CoreRuntime;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// A handful of UEs on a small constellation, run for a few ticks.
    Smoke,
    /// Records one synthetic event per scheme to exercise comparison output.
    Compare,
}

#[derive(Debug, Parser)]
#[command(name = "ntn-core", about = "NTN handover-coordination core")]
struct Cli {
    /// Path to a RON configuration file. Defaults are used if omitted.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Canned scenario to run.
    #[arg(long, value_enum, default_value_t = Scenario::Smoke)]
    scenario: Scenario,

    /// How many seconds of wall-clock time to let the tick loop run.
    #[arg(long, default_value_t = 2)]
    run_secs: u64,
}

fn install_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };

    let provider = Arc::new(CannedPositionProvider::new_constellation(6, 550.0, 5400.0, 53.0));
    let sat_ids = provider.satellite_ids();
    let runtime = CoreRuntime::new(config, provider);
    runtime.set_known_satellites(sat_ids.clone());

    runtime.predictor.register_ue(UeAccessProfile {
        ue_id: "ue-1".into(),
        strategy: AccessStrategy::Flexible,
        position: ntn_common::geo::GeoPoint::new(121.5, 25.0, 0.0),
        current_satellite: sat_ids[0].clone(),
    });
    runtime.predictor.register_ue(UeAccessProfile {
        ue_id: "ue-2".into(),
        strategy: AccessStrategy::Consistent,
        position: ntn_common::geo::GeoPoint::new(-122.4, 37.8, 0.0),
        current_satellite: sat_ids[1 % sat_ids.len()].clone(),
    });

    runtime.start().await?;
    tracing::info!(scenario = ?cli.scenario, "ntn-core running");

    match cli.scenario {
        Scenario::Smoke => {
            tokio::time::sleep(Duration::from_secs(cli.run_secs)).await;
            let status = runtime.scheduler.status();
            tracing::info!(ue_count = status.r_table.len(), "tick loop status");
        }
        Scenario::Compare => {
            for scheme in Scheme::ALL {
                let (latency_ms, result) = match scheme {
                    Scheme::Baseline => (250.0, HandoverResult::Success),
                    Scheme::GsAssisted => (120.0, HandoverResult::Success),
                    Scheme::SmnAssisted => (60.0, HandoverResult::Success),
                    Scheme::Proposed => (22.0, HandoverResult::Success),
                };
                runtime.measurement.record(HandoverEvent {
                    id: 0,
                    ue_id: "ue-1".into(),
                    source_gnb: "gnb-a".into(),
                    target_gnb: "gnb-b".into(),
                    scheme,
                    start_s: 0.0,
                    end_s: latency_ms / 1000.0,
                    latency_ms,
                    result,
                    extras: Default::default(),
                });
            }
            let report = runtime.measurement.compare_report();
            tracing::info!(?report, "comparison report");
            if let Ok(path) = runtime.measurement.export_json() {
                tracing::info!(path = %path.display(), "measurement snapshot written");
            }
        }
    }

    runtime.stop().await?;
    Ok(())
}

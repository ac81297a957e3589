// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use the_streamwood::config::{load_and_validate_config, Attributes, EngineConfig, RuntimeBuilder};
use the_streamwood::engine::{Decider, KillSwitches, Materializer, SupervisionDecision};
use the_streamwood::errors::StageRuntimeError;
use the_streamwood::graph::{Keep, Sink, Source};
use the_streamwood::stages::AskSettings;
use the_streamwood::traits::FnResponder;
use tracing_subscriber::EnvFilter;

/// One runnable demo with a short description.
struct Demo {
    name: &'static str,
    title: &'static str,
    description: &'static str,
}

const DEMOS: &[Demo] = &[
    Demo {
        name: "zip",
        title: "Zip: pairing two sources",
        description: "Pairs letters with an infinite counter; completes with the shorter side",
    },
    Demo {
        name: "merge",
        title: "Merge: interleaving sources",
        description: "Interleaves two sources in arrival order and completes when both have",
    },
    Demo {
        name: "broadcast",
        title: "Broadcast: one source, two sinks",
        description: "Sends every element to a logging sink and a summing sink",
    },
    Demo {
        name: "supervision",
        title: "Supervision: resume and restart",
        description: "Skips unparsable input with Resume and resets a running total with Restart",
    },
    Demo {
        name: "recover",
        title: "Recover: fallbacks and retries",
        description: "Replaces a failure with a final element, then splices in a replacement source",
    },
    Demo {
        name: "kill-switch",
        title: "Kill switch: stopping an endless stream",
        description: "Shuts down a repeating source from outside the graph",
    },
    Demo {
        name: "inject",
        title: "Injection: pushing from outside",
        description: "Feeds a running graph through its materialized endpoint",
    },
    Demo {
        name: "ask",
        title: "Ask: asynchronous collaborators",
        description: "Calls a slow service three requests at a time, keeping input order",
    },
    Demo {
        name: "snapshot",
        title: "Snapshot: inspecting a finished graph",
        description: "Prints stage states and edge statistics as JSON",
    },
];

fn print_usage(program: &str) {
    eprintln!("Usage: {} [--config <engine.yaml|engine.toml>] [demo ...]", program);
    eprintln!("Demos:");
    for demo in DEMOS {
        eprintln!("  {:<12} {}", demo.name, demo.description);
    }
    eprintln!("Example: {} zip merge", program);
    eprintln!("Example: RUST_LOG=debug {} --config engine.yaml kill-switch", program);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("streamwood");

    let mut config_path = None;
    let mut selected = Vec::new();
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" => match rest.next() {
                Some(path) => config_path = Some(path.clone()),
                None => {
                    print_usage(program);
                    bail!("--config needs a path");
                }
            },
            "-h" | "--help" => {
                print_usage(program);
                return Ok(());
            }
            name => selected.push(name.to_string()),
        }
    }

    let config = match &config_path {
        Some(path) => load_and_validate_config(path)
            .with_context(|| format!("loading engine config from {}", path))?,
        None => EngineConfig::default(),
    };
    let (scheduler, materializer) =
        RuntimeBuilder::on_current(&config).context("starting the scheduler")?;

    let demos: Vec<&Demo> = if selected.is_empty() {
        DEMOS.iter().collect()
    } else {
        let mut picked = Vec::new();
        for name in &selected {
            match DEMOS.iter().find(|d| d.name == name.as_str()) {
                Some(demo) => picked.push(demo),
                None => {
                    print_usage(program);
                    bail!("unknown demo '{}'", name);
                }
            }
        }
        picked
    };

    println!("🌊 The Streamwood - reactive streams demo");
    println!("═════════════════════════════════════════");
    println!("Worker threads: {}", scheduler.worker_threads());
    println!("Buffer size:    {}", materializer.settings().buffer_size);
    println!();

    for (i, demo) in demos.iter().enumerate() {
        if i > 0 {
            println!("\n{}", "─".repeat(80));
        }
        println!("▶ {}", demo.title);
        println!("  {}", demo.description);
        let started = Instant::now();
        match run_demo(demo.name, &materializer, &config).await {
            Ok(()) => println!("✅ done in {:?}", started.elapsed()),
            Err(e) => eprintln!("❌ {} failed: {:#}", demo.name, e),
        }
    }

    scheduler.shutdown();
    println!("\n🎉 Demo complete!");
    Ok(())
}

async fn run_demo(name: &str, mat: &Materializer, config: &EngineConfig) -> Result<()> {
    match name {
        "zip" => zip_demo(mat).await,
        "merge" => merge_demo(mat).await,
        "broadcast" => broadcast_demo(mat).await,
        "supervision" => supervision_demo(mat).await,
        "recover" => recover_demo(mat).await,
        "kill-switch" => kill_switch_demo(mat).await,
        "inject" => inject_demo(mat, config).await,
        "ask" => ask_demo(mat, config).await,
        "snapshot" => snapshot_demo(mat).await,
        other => bail!("unknown demo '{}'", other),
    }
}

async fn zip_demo(mat: &Materializer) -> Result<()> {
    let pairs = Source::from_iter(vec!["a", "b", "c"])
        .zip(Source::from_iter(1..))
        .run_with(Sink::seq(), mat)?
        .await?;
    for (letter, n) in pairs {
        println!("  {} → {}", letter, n);
    }
    Ok(())
}

async fn merge_demo(mat: &Materializer) -> Result<()> {
    let mut merged = Source::from_iter(vec![1, 3, 5])
        .merge(Source::from_iter(vec![2, 4, 6]))
        .run_with(Sink::seq(), mat)?
        .await?;
    println!("  arrival order: {:?}", merged);
    merged.sort_unstable();
    println!("  sorted:        {:?}", merged);
    Ok(())
}

async fn broadcast_demo(mat: &Materializer) -> Result<()> {
    let total = Source::from_iter(1..=5)
        .also_to(Sink::for_each(|n: i32| println!("  saw {}", n)))
        .run_with(Sink::fold(0, |acc: i32, n: i32| acc + n), mat)?
        .await?;
    println!("  sum: {}", total);
    Ok(())
}

async fn supervision_demo(mat: &Materializer) -> Result<()> {
    let parsed = Source::from_iter(vec!["1", "two", "3", "4x", "5"])
        .try_map(|s: &str| s.parse::<i32>())
        .with_attributes(Attributes::supervision(Decider::resuming()))
        .run_with(Sink::seq(), mat)?
        .await?;
    println!("  resumed past bad input: {:?}", parsed);

    let negative_resets = Decider::new(|e: &StageRuntimeError| {
        if e.to_string().contains("negative") {
            SupervisionDecision::Restart
        } else {
            SupervisionDecision::Stop
        }
    });
    let totals = Source::from_iter(vec![1, 2, -1, 3, 4])
        .stateful_map(
            || 0,
            |total: &mut i32, n: i32| {
                if n < 0 {
                    return Err(StageRuntimeError::msg("negative input"));
                }
                *total += n;
                Ok(*total)
            },
        )
        .with_attributes(Attributes::supervision(negative_resets))
        .run_with(Sink::seq(), mat)?
        .await?;
    println!("  running totals with restart: {:?}", totals);
    Ok(())
}

async fn recover_demo(mat: &Materializer) -> Result<()> {
    let recovered = Source::from_iter(1..=5)
        .try_map(|n: i32| {
            if n == 3 {
                Err(StageRuntimeError::msg("three is unlucky"))
            } else {
                Ok(n)
            }
        })
        .recover(|_| Some(-1))
        .run_with(Sink::seq(), mat)?
        .await?;
    println!("  recover: {:?}", recovered);

    let retried = Source::<i32>::failed(StageRuntimeError::msg("primary is down"))
        .recover_with_retries(2, |_| Some(Source::from_iter(vec![7, 8, 9])))
        .run_with(Sink::seq(), mat)?
        .await?;
    println!("  recover_with_retries: {:?}", retried);
    Ok(())
}

async fn kill_switch_demo(mat: &Materializer) -> Result<()> {
    let (switch, count) = Source::repeat(1u64)
        .via_mat(KillSwitches::single(), Keep::right)
        .to_mat(Sink::fold(0u64, |acc: u64, n: u64| acc + n), Keep::both)
        .run(mat)?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    switch.shutdown();
    println!("  elements before shutdown: {}", count.await?);
    Ok(())
}

async fn inject_demo(mat: &Materializer, config: &EngineConfig) -> Result<()> {
    let (endpoint, collected) = Source::<String, _>::queue_from(&config.injection)
        .map(|s: String| s.to_uppercase())
        .to_mat(Sink::seq(), Keep::both)
        .run(mat)?;
    for word in ["hello", "streaming", "world"] {
        let outcome = endpoint.send(word.to_string()).await?;
        println!("  offered {:?}: {:?}", word, outcome);
    }
    endpoint.close();
    println!("  collected: {:?}", collected.await?);
    Ok(())
}

async fn ask_demo(mat: &Materializer, config: &EngineConfig) -> Result<()> {
    let service = FnResponder::new(|n: u64| async move {
        tokio::time::sleep(Duration::from_millis(10 * (6 - n))).await;
        Ok::<_, StageRuntimeError>(n * n)
    });
    let settings = AskSettings {
        parallelism: 3,
        ..AskSettings::from(&config.ask)
    };
    let squares = Source::from_iter(1..=5u64)
        .ask(service, settings)
        .run_with(Sink::seq(), mat)?
        .await?;
    println!("  squares in input order: {:?}", squares);
    Ok(())
}

async fn snapshot_demo(mat: &Materializer) -> Result<()> {
    let (graph, done) = Source::from_iter(1..=100)
        .named("numbers")
        .filter(|n: &i32| n % 7 == 0)
        .buffer(4)
        .to_mat(Sink::ignore().named("drain"), Keep::right)
        .materialize(mat, &Attributes::new())?;
    done.await?;
    graph.terminated().await;
    println!("{}", serde_json::to_string_pretty(&graph.snapshot())?);
    Ok(())
}

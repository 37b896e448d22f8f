use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use pacmap_server::constants::TICK_MS;
use pacmap_server::engine::{GameEngine, GameEngineOptions};
use pacmap_server::geo::{Bounds, GeoPoint};
use pacmap_server::graph::GraphOptions;
use pacmap_server::osm::{bounds_of, OsmData};
use pacmap_server::pathfind::bfs_distance;
use pacmap_server::repair::RepairOptions;
use pacmap_server::rng::Rng;
use pacmap_server::types::{GameOverReason, RuntimeEvent, Snapshot};
use pacmap_server::world::{build_world, synthetic_grid, GameWorld};
use serde::Serialize;
use serde_json::{json, Value};

/// Headless scenario runner: builds a world, lets the autopilot play it, and
/// fails loudly when an invariant breaks.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    minutes: Option<i64>,
    #[arg(long)]
    grid_size: Option<usize>,
    #[arg(long)]
    clever: bool,
    #[arg(long)]
    map_file: Option<PathBuf>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    seed: u32,
    minutes: i64,
    #[serde(rename = "gridSize")]
    grid_size: usize,
    clever: bool,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    minutes: i64,
    clever: bool,
    reason: GameOverReason,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "nodeCount")]
    node_count: usize,
    #[serde(rename = "dotsCollected")]
    dots_collected: usize,
    #[serde(rename = "ghostsEaten")]
    ghosts_eaten: usize,
    #[serde(rename = "livesLost")]
    lives_lost: usize,
    #[serde(rename = "replansForced")]
    replans_forced: usize,
    #[serde(rename = "collectiblesLeft")]
    collectibles_left: usize,
    #[serde(rename = "worldWarnings")]
    world_warnings: Vec<String>,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    at: String,
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    details: Value,
}

fn main() {
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| format!("sim-{seed_hint}-{run_started_at_ms}"));

    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            json!({
                "minutes": scenario.minutes,
                "gridSize": scenario.grid_size,
                "clever": scenario.clever,
            }),
        );

        let result = match run_scenario(&scenario, cli.map_file.as_deref()) {
            Ok(result) => result,
            Err(message) => {
                emit_log(
                    "error",
                    "scenario_failed",
                    &run_id,
                    Some(&scenario.name),
                    Some(scenario.seed),
                    json!({ "message": message }),
                );
                std::process::exit(2);
            }
        };

        for anomaly in &result.anomalies {
            emit_log(
                "warn",
                "anomaly_detected",
                &run_id,
                Some(&scenario.name),
                Some(scenario.seed),
                json!({ "message": anomaly }),
            );
        }
        total_anomalies += result.anomalies.len();
        *reason_counts.entry(reason_key(result.reason)).or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            json!({
                "reason": result.reason,
                "durationMs": result.duration_ms,
                "dotsCollected": result.dots_collected,
                "anomalyCount": result.anomalies.len(),
            }),
        );

        println!(
            "{}",
            serde_json::to_string(&result).expect("scenario result should serialize")
        );
        scenario_results.push(result);
    }

    let summary = RunSummary {
        run_id: run_id.clone(),
        started_at_ms: run_started_at_ms,
        finished_at_ms: now_ms(),
        scenario_count: scenario_results.len(),
        anomaly_count: total_anomalies,
        reason_counts,
        scenarios: scenario_results,
    };

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &run_id,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
    }

    emit_log(
        "info",
        "run_finished",
        &run_id,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "reasonCounts": summary.reason_counts,
        }),
    );

    if total_anomalies > 0 {
        std::process::exit(1);
    }
}

fn run_scenario(scenario: &Scenario, map_file: Option<&Path>) -> Result<ScenarioResultLine, String> {
    let (bounds, data) = load_geometry(scenario, map_file)?;
    let mut rng = Rng::new(scenario.seed);
    let world = build_world(
        bounds,
        &data,
        &GraphOptions::default(),
        &RepairOptions::default(),
        &mut rng,
    )
    .map_err(|error| error.to_string())?;

    let mut anomalies = Vec::new();
    check_graph_invariants(&world, &mut anomalies);
    let node_count = world.graph.node_count();
    let world_warnings = world.warnings.clone();

    let mut engine = GameEngine::new(
        world,
        scenario.seed,
        GameEngineOptions {
            time_limit_ms_override: Some(scenario.minutes as u64 * 60_000),
        },
    );
    engine.set_autopilot(true, scenario.clever);

    let mut dots_collected = 0usize;
    let mut ghosts_eaten = 0usize;
    let mut lives_lost = 0usize;
    let mut replans_forced = 0usize;
    let mut last_collectibles = engine.collectibles_left();
    let mut idle_ticks = 0u32;
    let tick_budget = (scenario.minutes as u64 * 60_000 / TICK_MS) + 200;

    for _ in 0..tick_budget {
        if engine.is_ended() {
            break;
        }
        engine.step(TICK_MS);
        let snapshot = engine.build_snapshot(true);

        for event in &snapshot.events {
            match event {
                RuntimeEvent::DotCollected { .. } => dots_collected += 1,
                RuntimeEvent::GhostEaten { .. } => ghosts_eaten += 1,
                RuntimeEvent::LifeLost { .. } => lives_lost += 1,
                RuntimeEvent::ReplanForced { .. } => replans_forced += 1,
                _ => {}
            }
        }

        check_snapshot_invariants(&snapshot, last_collectibles, &mut anomalies);
        last_collectibles = snapshot.collectibles.len();

        // Watchdog: an enabled autopilot with work left must not sit still
        // across many consecutive decision windows.
        if snapshot.pacman.autopilot
            && !snapshot.pacman.movement.moving
            && !snapshot.collectibles.is_empty()
        {
            idle_ticks += 1;
            if idle_ticks > 200 {
                push_unique(&mut anomalies, "autopilot stalled with collectibles remaining");
                idle_ticks = 0;
            }
        } else {
            idle_ticks = 0;
        }
    }

    let summary = engine.build_summary();
    if summary.reason == GameOverReason::Victory && summary.collectibles_left != 0 {
        push_unique(&mut anomalies, "victory reported with collectibles left");
    }

    Ok(ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        minutes: scenario.minutes,
        clever: scenario.clever,
        reason: summary.reason,
        duration_ms: summary.duration_ms,
        node_count,
        dots_collected,
        ghosts_eaten,
        lives_lost,
        replans_forced,
        collectibles_left: summary.collectibles_left,
        world_warnings,
        anomalies,
    })
}

fn load_geometry(scenario: &Scenario, map_file: Option<&Path>) -> Result<(Bounds, OsmData), String> {
    if let Some(path) = map_file {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("failed to read {}: {error}", path.display()))?;
        let data: OsmData = serde_json::from_str(&raw)
            .map_err(|error| format!("failed to parse {}: {error}", path.display()))?;
        let bounds = bounds_of(&data)
            .ok_or_else(|| format!("{} holds no node coordinates", path.display()))?;
        return Ok((bounds, data));
    }
    Ok(synthetic_grid(
        scenario.grid_size,
        scenario.grid_size,
        60.0,
        GeoPoint::new(25.0330, 121.5654),
    ))
}

fn check_graph_invariants(world: &GameWorld, anomalies: &mut Vec<String>) {
    // Adjacency symmetry over the whole graph.
    for (&key, neighbors) in &world.graph.adjacency {
        for neighbor in neighbors {
            let reverse = world
                .graph
                .adjacency
                .get(&neighbor.key())
                .map(|list| list.iter().any(|back| back.key() == key))
                .unwrap_or(false);
            if !reverse {
                push_unique(anomalies, "asymmetric adjacency entry");
            }
        }
    }

    // Post-repair connectivity: every node reachable from the first.
    if let Some(&start) = world.graph.valid_positions.first() {
        let max_depth = world.graph.node_count() as u32 + 1;
        for &node in world.graph.valid_positions.iter().skip(1) {
            if bfs_distance(start, node, &world.graph.adjacency, max_depth).is_none() {
                push_unique(anomalies, "disconnected node survived repair");
                break;
            }
        }
    }
}

fn check_snapshot_invariants(
    snapshot: &Snapshot,
    last_collectibles: usize,
    anomalies: &mut Vec<String>,
) {
    if snapshot.collectibles.len() > last_collectibles {
        push_unique(anomalies, "collectible count increased");
    }
    if !snapshot.pacman.position.is_finite() {
        push_unique(anomalies, "pacman position is not finite");
    }
    for ghost in &snapshot.ghosts {
        if !ghost.position.is_finite() {
            push_unique(anomalies, "ghost position is not finite");
        }
    }
    if snapshot.pacman.lives < 0 {
        push_unique(anomalies, "negative life count");
    }
}

fn push_unique(anomalies: &mut Vec<String>, message: &str) {
    if !anomalies.iter().any(|existing| existing == message) {
        anomalies.push(message.to_string());
    }
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = cli.seed.unwrap_or_else(now_ms) as u32;
    let grid_size = cli.grid_size.unwrap_or(8).clamp(2, 64);

    if cli.single || cli.seed.is_some() || cli.minutes.is_some() || cli.map_file.is_some() {
        return vec![Scenario {
            name: format!("custom-grid{grid_size}"),
            seed,
            minutes: cli.minutes.unwrap_or(3).clamp(1, 30),
            grid_size,
            clever: cli.clever,
        }];
    }

    vec![
        Scenario {
            name: "quick-check".to_string(),
            seed,
            minutes: 2,
            grid_size: 8,
            clever: false,
        },
        Scenario {
            name: "clever-check".to_string(),
            seed: seed.wrapping_add(1),
            minutes: 3,
            grid_size: 10,
            clever: true,
        },
    ]
}

fn reason_key(reason: GameOverReason) -> String {
    match reason {
        GameOverReason::Victory => "victory",
        GameOverReason::Defeat => "defeat",
        GameOverReason::Timeout => "timeout",
    }
    .to_string()
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).expect("run summary should serialize");
    std::fs::write(path, summary_text)
}

fn emit_log(
    level: &str,
    event: &str,
    run_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        run_id: run_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        details,
    };
    eprintln!(
        "{}",
        serde_json::to_string(&log_line).expect("structured log should serialize")
    );
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

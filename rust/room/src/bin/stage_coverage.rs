// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: report action-space coverage for a saved room
//!
//! Loads a room JSON file (`{ "nodes": [...] }`), evaluates every action
//! space against the room's cameras and depth sensors, and prints the
//! visible and occluded volume of each.
//!
//! Usage:
//!   stage-coverage <room.json> [--json]

use stage_room::{EvaluationOutcome, EvaluatorConfig, NodeTypeRegistry, Room};
use std::env;
use std::fs;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,stage_room=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let room_path = &args[1];
    let mut as_json = false;
    for arg in &args[2..] {
        match arg.as_str() {
            "--json" => as_json = true,
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
    }

    let source = match fs::read_to_string(room_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", room_path, e);
            std::process::exit(1);
        }
    };

    let config = EvaluatorConfig::from_env();
    tracing::info!(
        capture_kinds = ?config.capture_kinds,
        csg_epsilon = config.csg_epsilon,
        "Evaluating room coverage"
    );

    let mut room = Room::new(Arc::new(NodeTypeRegistry::standard()), config);
    if let Err(e) = room.from_json(&source) {
        eprintln!("Failed to load room: {}", e);
        std::process::exit(1);
    }

    let evaluations = room.evaluate_all();
    if evaluations.is_empty() {
        println!("No action spaces in {}", room_path);
        return;
    }

    let mut failed = false;
    let mut report = Vec::with_capacity(evaluations.len());
    for evaluation in &evaluations {
        let entry = match &evaluation.outcome {
            EvaluationOutcome::Updated {
                visible_volume,
                occluded_volume,
            } => {
                let total = visible_volume + occluded_volume;
                let coverage = if total > 0.0 { visible_volume / total } else { 0.0 };
                if !as_json {
                    println!(
                        "{:<38} visible {:>10.4}  occluded {:>10.4}  coverage {:>6.1}%",
                        evaluation.uid,
                        visible_volume,
                        occluded_volume,
                        coverage * 100.0
                    );
                }
                serde_json::json!({
                    "uid": evaluation.uid,
                    "visible": visible_volume,
                    "occluded": occluded_volume,
                    "coverage": coverage,
                })
            }
            EvaluationOutcome::NoCaptureDevices => {
                if !as_json {
                    println!("{:<38} no capture devices", evaluation.uid);
                }
                serde_json::json!({ "uid": evaluation.uid, "status": "no_capture_devices" })
            }
            EvaluationOutcome::Aborted(e) => {
                failed = true;
                if !as_json {
                    println!("{:<38} failed: {}", evaluation.uid, e);
                }
                serde_json::json!({
                    "uid": evaluation.uid,
                    "status": "aborted",
                    "error": e.to_string(),
                })
            }
        };
        report.push(entry);
    }

    if as_json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Failed to encode report: {}", e);
                std::process::exit(1);
            }
        }
    }

    if failed {
        std::process::exit(2);
    }
}

fn print_usage() {
    eprintln!("Usage: stage-coverage <room.json> [--json]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --json    Print the report as JSON");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG                   Log filter (default: warn,stage_room=info)");
    eprintln!("  STAGE_CAPTURE_KINDS        Comma-separated: camera, kinect");
    eprintln!("  STAGE_OCCLUDED_TINT        r,g,b or #RRGGBB");
    eprintln!("  STAGE_CSG_EPSILON          Minimum result triangle area and range volume");
    eprintln!("  STAGE_CLEAR_STALE_RESULT   Drop results when no device remains");
}

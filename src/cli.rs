use anyhow::{Context, Result, anyhow};
use gesturectl::{Engine, Profile, ProfileStore};
use pico_args::Arguments;
use std::{
    env, fs,
    io::{self, BufReader},
};

use crate::{input, live, replay};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let moves = pargs.contains("--moves");

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("list") => {
            let store = ProfileStore::user()?;
            store.install_default()?;
            for name in store.list_profiles() {
                println!("{name}");
            }
            Ok(())
        }

        Some("check") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl check <profile>"))?;
            let profile = load_profile(&name)?;
            check(&profile)
        }

        Some("replay") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl replay <profile> <trace.jsonl> [--moves]"))?;
            let trace: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl replay <profile> <trace.jsonl> [--moves]"))?;
            let profile = load_profile(&name)?;
            let file = fs::File::open(&trace).with_context(|| format!("failed to open {trace}"))?;
            let summary = replay::replay(&profile, BufReader::new(file), moves, &mut io::stdout().lock())?;
            log::info!(
                "replayed {} pointer event(s), {} record(s)",
                summary.events,
                summary.records
            );
            Ok(())
        }

        Some("live") => {
            let name: Option<String> = pargs.free_from_str().ok();
            let store = ProfileStore::user()?;
            let profile = store.load_or_install_default(name.as_deref())?;
            live::run(&profile, moves)
        }

        Some("doctor") => {
            print_response(&doctor_report());
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn load_profile(name_or_path: &str) -> Result<Profile> {
    let store = ProfileStore::user()?;
    store.install_default()?;
    store
        .load(name_or_path)
        .with_context(|| format!("failed to load profile '{name_or_path}'"))
}

/// Registers the profile into a scratch engine so registration errors
/// surface the same way they would at runtime.
fn check(profile: &Profile) -> Result<()> {
    let mut engine: Engine<()> = Engine::new(profile.engine.clone());
    profile.install(&mut engine, |_| Box::new(gesturectl::Callbacks::new()))?;
    println!("profile '{}': ok", profile.name());
    for def in engine.registry().iter() {
        println!(
            "  {:<16} target={} pattern='{}' min={} exclusive={} recheck={}",
            def.name(),
            def.target(),
            def.pattern(),
            def.min_pointers(),
            def.is_exclusive(),
            def.rechecks_on_pointer_loss()
        );
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    let Ok(s) = fs::read_to_string("/etc/group") else {
        return false;
    };
    let user = whoami::username();
    s.lines()
        .filter(|line| line.starts_with("input:"))
        .any(|line| line.split(':').nth(3).unwrap_or("").split(',').any(|u| u == user))
}

fn doctor_report() -> serde_json::Value {
    let devices: Vec<_> = input::discover_multitouch()
        .into_iter()
        .map(|d| {
            serde_json::json!({
                "path": d.path,
                "name": d.name,
                "tool_type": d.has_tool_type,
            })
        })
        .collect();
    let store = ProfileStore::user().ok();
    serde_json::json!({
        "input_group_member": check_in_input_group(),
        "devices": devices,
        "profiles_dir": store.as_ref().map(|s| s.dir().display().to_string()),
        "profiles": store.as_ref().map(|s| s.list_profiles()).unwrap_or_default(),
        "hints": {
            "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
        }
    })
}

fn print_help() {
    println!(
        r#"gesturectl — multi-pointer gesture recognition

USAGE:
  gesturectl help [command]                        Show general or command-specific help
  gesturectl list                                  List profiles
  gesturectl check <profile>                       Validate a profile and show its gestures
  gesturectl replay <profile> <trace> [--moves]    Run a recorded JSON-lines trace
  gesturectl live [profile] [--moves]              Recognize gestures on touch devices
  gesturectl doctor                                Diagnose permissions/devices

TIPS:
  - Profiles: ~/.config/gesturectl/profiles (a path to a .toml file works too)
  - Log level: GESTURECTL_LOG=debug
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "list" => println!("usage: gesturectl list\nLists available profiles."),
        "check" => println!(
            "usage: gesturectl check <profile>\nParses the profile and registers every gesture in a scratch engine."
        ),
        "replay" => println!(
            "usage: gesturectl replay <profile> <trace.jsonl> [--moves]\nPrints one JSON record per lifecycle event; --moves includes move records."
        ),
        "live" => println!(
            "usage: gesturectl live [profile] [--moves]\nReads every multitouch device until Ctrl-C."
        ),
        "doctor" => println!(
            "usage: gesturectl doctor\nChecks permissions and lists detected multitouch devices."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

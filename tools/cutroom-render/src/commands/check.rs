//! Check that render executables are available.

use std::path::PathBuf;
use std::process::ExitCode;

use cutroom_common::config::AppConfig;
use cutroom_render_job::launcher::resolve_program;

pub fn run(renderer: Option<PathBuf>, config: &AppConfig) -> anyhow::Result<ExitCode> {
    println!("cutroom render check");
    println!("{}", "=".repeat(50));

    let renderer = renderer.unwrap_or_else(|| config.render.renderer.clone());
    let tools = [
        ("Renderer", renderer, true),
        ("Subtitle tool", config.render.subtitle_tool.clone(), false),
    ];

    let mut all_required_ok = true;
    for (label, program, required) in &tools {
        match resolve_program(program) {
            Some(path) => println!("[OK] {label}: {}", path.display()),
            None if *required => {
                all_required_ok = false;
                println!("[MISSING] {label}: {} not found", program.display());
            }
            None => println!(
                "[WARN] {label}: {} not found (subtitle burn-in unavailable)",
                program.display()
            ),
        }
    }

    println!();
    if all_required_ok {
        println!("All required tools are available.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("The renderer is missing. Install it or set render.renderer in the config.");
        Ok(ExitCode::from(1))
    }
}

use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Credential variables are deliberately absent
    const DISPLAY_ENVS: [&str; 23] = [
        "RUST_LOG",
        "FRS_HOST",
        "FRS_PORT",
        "FRS_DATABASE_URL",
        "FRS_DB_CONNECTIONS",
        "FRS_MARKETPLACE_ENDPOINT",
        "FRS_MARKETPLACE_IDS",
        "FRS_USER_AGENT",
        "FRS_MIN_REQUEST_INTERVAL_MS",
        "FRS_MAX_RETRIES",
        "FRS_BACKOFF_BASE_MS",
        "FRS_BACKOFF_MAX_MS",
        "FRS_LEDGER_SAFETY_MARGIN_SECS",
        "FRS_LEDGER_PAGE_CAP",
        "FRS_LEDGER_WINDOW_DAYS",
        "FRS_MAX_CHUNKS_PER_RUN",
        "FRS_ESTIMATE_BATCH_SIZE",
        "FRS_ALLOCATION_POLICY",
        "FRS_STALE_RUN_TIMEOUT_MINS",
        "FRS_MAX_SYNC_MONTHS_BACK",
        "FRS_MAX_BACKFILL_MONTHS_BACK",
        "FRS_JOB_QUEUE_SIZE",
        "FRS_MAX_CONCURRENT_JOBS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}

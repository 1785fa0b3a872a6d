//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Match on the whole context chain, not only the outermost message
    let error_msg = format!("{:#}", error);

    if error_msg.contains("config") {
        format_config_error(&mut output, &error_msg);
    } else if error_msg.contains("trace") {
        format_trace_error(&mut output, &error_msg);
    } else if error_msg.contains("database") || error_msg.contains("lock key") {
        format_database_error(&mut output, &error_msg);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: action-lock-replay -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Or set RUST_LOG=action_lock_engine=trace for per-sample output"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_config_error(output: &mut String, _error: &str) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Configuration file not found").ok();
    writeln!(
        output,
        "     → Specify: action-lock-replay -c /path/to/config.toml"
    )
    .ok();
    writeln!(output, "     → Or set ACTION_LOCK_CONFIG").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Value out of range").ok();
    writeln!(output, "     → estimator.alpha and estimator.beta: (0, 1]").ok();
    writeln!(output, "     → estimator.k: [0, 10]").ok();
    writeln!(output, "     → floor.scaling_factor: (0, 1], floor.window_size >= 10").ok();
    writeln!(output, "     → cast.tax: (0, 10) seconds").ok();
    writeln!(
        output,
        "     → interference band: 0 <= band_low_ms <= band_high_ms < 10"
    )
    .ok();
}

fn format_trace_error(output: &mut String, _error: &str) {
    writeln!(output, "Trace Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not load the replay trace.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Trace file not found").ok();
    writeln!(output, "     → Check the --trace path").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid trace JSON").ok();
    writeln!(output, "     → The trace must be a JSON array of events").ok();
    writeln!(
        output,
        "     → Each event needs an \"event\" tag: tick, dispatch, packet, response,"
    )
    .ok();
    writeln!(
        output,
        "       cast_begin, cast_interrupt, set_pvp or clear_interference"
    )
    .ok();
}

fn format_database_error(output: &mut String, _error: &str) {
    writeln!(output, "Lock Database Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not import or export the lock database.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Malformed key").ok();
    writeln!(output, "     → Keys must look like \"<action_id>:pve\" or \"<action_id>:pvp\"").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid entry").ok();
    writeln!(output, "     → mean_lock must be a finite number of seconds").ok();
    writeln!(output).ok();
    writeln!(output, "  3. File not writable").ok();
    writeln!(output, "     → Check the --export-db directory exists").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Replay Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while running the replay.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_user_error() {
        let error = anyhow::anyhow!("Failed to parse config file");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("Configuration Error"));
    }

    #[test]
    fn test_trace_error_formatting() {
        let error = anyhow::anyhow!("expected value").context("Failed to parse trace file: t.json");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Trace Error"));
        assert!(formatted.contains("cast_begin"));
    }

    #[test]
    fn test_database_error_formatting() {
        let error = anyhow::anyhow!("malformed lock key: abc");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Lock Database Error"));
    }

    #[test]
    fn test_generic_error_formatting() {
        let error = anyhow::anyhow!("something odd");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Replay Error"));
        assert!(formatted.contains("something odd"));
    }
}

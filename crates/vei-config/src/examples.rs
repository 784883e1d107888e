// crates/vei-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `vei.toml`. The example is kept valid by the config
//! test suite, so it always loads against the current model.

/// Returns a canonical example `vei.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[session]
id = "vendor-quote-episode"
seed = 42042
mode = "sim"

[session.service_modes]
erp = "replay"

[policy]
write_safe_enabled = true
hard_block = ["erp.post_payment"]
pre_granted = []

[policy.overrides]
"tickets.create" = "require_approval"

[live]
allow_write_safe = false
allow_write_risky = false
block_ops = ["okta.deactivate_user"]

[approvals]
match = "operation"

[runner]
max_jumps = 8
max_step_executions = 256

[receipts]
type = "sqlite"
path = "vei-receipts.sqlite"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[audit]
type = "file"
path = "vei-audit.jsonl"
"#,
    )
}

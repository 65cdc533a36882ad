//! E2E ticket lifecycle and assignment workflows through `hd`.
//!
//! Each test seeds a small org in a temp database, then drives tickets
//! through the requester and staff views with `--json` output.

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn hd_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hd"));
    cmd.current_dir(dir);
    cmd.env("HELPDESK_LOG", "error");
    cmd.env("HELPDESK_CONFIG", dir.join("absent.toml"));
    cmd.env_remove("HELPDESK_STAFF");
    cmd.env_remove("HELPDESK_USER");
    cmd.env_remove("HELPDESK_FORMAT");
    cmd.arg("--db").arg(dir.join("desk.db"));
    cmd
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = hd_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("hd should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

/// Run a command expected to fail and return its stderr.
fn run_err(dir: &Path, args: &[&str]) -> String {
    let output = hd_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("hd should not crash");
    assert!(!output.status.success(), "{args:?} unexpectedly succeeded");
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn assert_code(stderr: &str, code: &str) {
    let needle = format!("\"error_code\": \"{code}\"");
    assert!(stderr.contains(&needle), "expected {code} in: {stderr}");
}

/// d-it { net: s-lead (lead), s-ana, s-bo ; apps } and d-hr { payroll: s-hr },
/// plus s-root (admin, no team).
fn seed_org(dir: &Path) {
    run_json(dir, &["org", "dept", "add", "d-it", "--name", "IT"]);
    run_json(dir, &["org", "dept", "add", "d-hr", "--name", "HR"]);
    run_json(dir, &["org", "team", "add", "net", "--department", "d-it", "--name", "Network"]);
    run_json(dir, &["org", "team", "add", "apps", "--department", "d-it", "--name", "Apps"]);
    run_json(dir, &["org", "team", "add", "payroll", "--department", "d-hr", "--name", "Payroll"]);
    for (id, role, team) in [
        ("s-lead", "team-lead", "net"),
        ("s-ana", "agent", "net"),
        ("s-bo", "agent", "net"),
        ("s-hr", "agent", "payroll"),
    ] {
        let email = format!("{id}@corp.io");
        run_json(
            dir,
            &[
                "org", "staff", "add", id, "--name", id, "--email", &email, "--role", role,
                "--team", team,
            ],
        );
    }
    run_json(
        dir,
        &[
            "org", "staff", "add", "s-root", "--name", "Root", "--email", "root@corp.io",
            "--role", "admin",
        ],
    );
}

/// Open a ticket for `user` on team net; returns the ticket JSON.
fn open_ticket(dir: &Path, user: &str, title: &str) -> Value {
    run_json(
        dir,
        &[
            "--as-user", user, "ticket", "create", "--title", title, "--department", "d-it",
            "--team", "net", "--tag", "vpn",
        ],
    )
}

fn setup() -> (TempDir, Value) {
    let dir = TempDir::new().unwrap();
    seed_org(dir.path());
    let ticket = open_ticket(dir.path(), "u-1", "VPN drops every hour");
    (dir, ticket)
}

fn change_types(history: &Value) -> Vec<String> {
    history
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["change_type"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn create_sets_defaults() {
    let (_dir, ticket) = setup();
    assert_eq!(ticket["status"], "OPEN");
    assert_eq!(ticket["priority"], "MEDIUM");
    assert_eq!(ticket["requester_id"], "u-1");
    assert_eq!(ticket["team_id"], "net");
    assert_eq!(ticket["tags"], serde_json::json!(["vpn"]));
    assert!(ticket["assignee_id"].is_null());
    assert!(ticket["external_key"].as_str().unwrap().starts_with("TCK-"));
}

#[test]
fn full_lifecycle_via_external_key() {
    let (dir, ticket) = setup();
    let dir = dir.path();
    let key = ticket["external_key"].as_str().unwrap();

    let moved = run_json(
        dir,
        &["--as-staff", "s-ana", "ticket", "status", key, "in_progress", "--comment", "looking"],
    );
    assert_eq!(moved["status"], "IN_PROGRESS");

    let resolved = run_json(dir, &["--as-staff", "s-ana", "ticket", "status", key, "resolved"]);
    assert_eq!(resolved["status"], "RESOLVED");
    assert!(resolved["closed_at"].is_null());

    let closed = run_json(dir, &["--as-user", "u-1", "ticket", "close", key]);
    assert_eq!(closed["status"], "CLOSED");
    assert!(closed["closed_at"].is_string());

    let history = run_json(dir, &["--as-staff", "s-ana", "history", key]);
    assert_eq!(
        change_types(&history),
        vec!["STATUS_CHANGE", "STATUS_CHANGE", "STATUS_CHANGE"]
    );
    // Newest first; the requester's close carries the fixed comment.
    assert_eq!(history[0]["new"], "CLOSED");
    assert_eq!(history[0]["changed_by_type"], "USER");
    assert_eq!(history[0]["comment"], "user_closed");
    assert_eq!(history[2]["comment"], "looking");
}

#[test]
fn invalid_transition_is_a_conflict() {
    let (dir, ticket) = setup();
    let id = ticket["id"].as_str().unwrap();
    let err = run_err(dir.path(), &["--as-staff", "s-ana", "ticket", "status", id, "closed"]);
    assert_code(&err, "E4001");
    assert!(err.contains("OPEN -> CLOSED"), "{err}");
}

#[test]
fn requester_cannot_close_open_ticket() {
    let (dir, ticket) = setup();
    let id = ticket["id"].as_str().unwrap();
    let err = run_err(dir.path(), &["--as-user", "u-1", "ticket", "close", id]);
    assert_code(&err, "E4001");
}

#[test]
fn staff_commands_require_staff() {
    let (dir, ticket) = setup();
    let id = ticket["id"].as_str().unwrap();
    let err = run_err(dir.path(), &["ticket", "priority", id, "high"]);
    assert_code(&err, "E3001");
}

#[test]
fn out_of_scope_staff_is_denied() {
    let (dir, ticket) = setup();
    let id = ticket["id"].as_str().unwrap();
    let err = run_err(dir.path(), &["--as-staff", "s-hr", "ticket", "show", id]);
    assert_code(&err, "E3001");

    // Admins see everything.
    let view = run_json(dir.path(), &["--as-staff", "s-root", "ticket", "show", id]);
    assert_eq!(view["ticket"]["id"], id);
}

#[test]
fn other_requesters_are_denied() {
    let (dir, ticket) = setup();
    let id = ticket["id"].as_str().unwrap();
    let err = run_err(dir.path(), &["--as-user", "u-2", "ticket", "show", id]);
    assert_code(&err, "E3001");
}

#[test]
fn unknown_ticket_is_not_found() {
    let (dir, _) = setup();
    let err = run_err(dir.path(), &["--as-staff", "s-root", "ticket", "show", "t-missing"]);
    assert_code(&err, "E2001");
}

#[test]
fn priority_and_tags_are_audited() {
    let (dir, ticket) = setup();
    let dir = dir.path();
    let id = ticket["id"].as_str().unwrap();

    let bumped = run_json(dir, &["--as-staff", "s-ana", "ticket", "priority", id, "urgent"]);
    assert_eq!(bumped["priority"], "URGENT");
    let tagged = run_json(dir, &["--as-staff", "s-ana", "ticket", "tags", id, "vpn", "outage"]);
    assert_eq!(tagged["tags"], serde_json::json!(["vpn", "outage"]));

    let history = run_json(dir, &["--as-staff", "s-ana", "history", id]);
    assert_eq!(change_types(&history), vec!["TAGS_CHANGE", "PRIORITY_CHANGE"]);

    // Requesters don't see priority or tag churn.
    let visible = run_json(dir, &["--as-user", "u-1", "history", id]);
    assert!(visible.as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[test]
fn internal_notes_hidden_from_requester() {
    let (dir, ticket) = setup();
    let dir = dir.path();
    let id = ticket["id"].as_str().unwrap();

    let note = run_json(
        dir,
        &["--as-staff", "s-ana", "ticket", "message", id, "--internal", "--body", "check router"],
    );
    assert_eq!(note["message_type"], "INTERNAL_NOTE");
    let reply = run_json(
        dir,
        &[
            "--as-user", "u-1", "ticket", "message", id, "--body", "still broken", "--attach",
            "blobs/1:trace.log:text/plain:512",
        ],
    );
    assert_eq!(reply["author_type"], "USER");
    assert_eq!(reply["attachments"][0]["file_name"], "trace.log");

    let user_view = run_json(dir, &["--as-user", "u-1", "ticket", "show", id]);
    assert_eq!(user_view["messages"].as_array().unwrap().len(), 1);
    assert_eq!(user_view["messages"][0]["body"], "still broken");

    let staff_view = run_json(dir, &["--as-staff", "s-ana", "ticket", "show", id]);
    assert_eq!(staff_view["messages"].as_array().unwrap().len(), 2);
}

#[test]
fn blank_message_is_invalid() {
    let (dir, ticket) = setup();
    let id = ticket["id"].as_str().unwrap();
    let err = run_err(dir.path(), &["--as-user", "u-1", "ticket", "message", id]);
    assert_code(&err, "E1001");
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[test]
fn listings_respect_visibility() {
    let (dir, _) = setup();
    let dir = dir.path();
    open_ticket(dir, "u-1", "Printer jam");
    open_ticket(dir, "u-2", "Laptop slow");

    let mine = run_json(dir, &["--as-user", "u-1", "ticket", "list"]);
    assert_eq!(mine.as_array().unwrap().len(), 2);

    let net = run_json(dir, &["--as-staff", "s-ana", "ticket", "list"]);
    assert_eq!(net.as_array().unwrap().len(), 3);

    let payroll = run_json(dir, &["--as-staff", "s-hr", "ticket", "list"]);
    assert!(payroll.as_array().unwrap().is_empty());

    let found = run_json(dir, &["--as-staff", "s-root", "ticket", "list", "--search", "PRINTER"]);
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["title"], "Printer jam");

    let paged = run_json(dir, &["--as-staff", "s-root", "ticket", "list", "--limit", "2"]);
    assert_eq!(paged.as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

#[test]
fn self_assign_then_lead_reassigns() {
    let (dir, ticket) = setup();
    let dir = dir.path();
    let id = ticket["id"].as_str().unwrap();

    let mine = run_json(dir, &["--as-staff", "s-ana", "assign", "self", id]);
    assert_eq!(mine["assignee_id"], "s-ana");

    let err = run_err(dir, &["--as-staff", "s-ana", "assign", "staff", id, "s-bo"]);
    assert_code(&err, "E3001");

    let handed = run_json(dir, &["--as-staff", "s-lead", "assign", "staff", id, "s-bo"]);
    assert_eq!(handed["assignee_id"], "s-bo");

    let visible = run_json(dir, &["--as-user", "u-1", "history", id]);
    assert_eq!(
        change_types(&visible),
        vec!["ASSIGNEE_CHANGE", "ASSIGNEE_CHANGE"]
    );
}

#[test]
fn inactive_assignee_is_a_conflict() {
    let (dir, ticket) = setup();
    let dir = dir.path();
    let id = ticket["id"].as_str().unwrap();
    run_json(dir, &["org", "staff", "deactivate", "s-bo"]);
    let err = run_err(dir, &["--as-staff", "s-root", "assign", "staff", id, "s-bo"]);
    assert_code(&err, "E4001");
}

#[test]
fn assign_to_team_clears_assignee() {
    let (dir, ticket) = setup();
    let dir = dir.path();
    let id = ticket["id"].as_str().unwrap();
    run_json(dir, &["--as-staff", "s-ana", "assign", "self", id]);

    let moved = run_json(dir, &["--as-staff", "s-root", "assign", "team", id, "payroll"]);
    assert_eq!(moved["team_id"], "payroll");
    assert_eq!(moved["department_id"], "d-hr");
    assert!(moved["assignee_id"].is_null());

    // The old team has lost sight of it.
    let err = run_err(dir, &["--as-staff", "s-ana", "ticket", "show", id]);
    assert_code(&err, "E3001");
}

#[test]
fn auto_assign_picks_from_roster() {
    let (dir, ticket) = setup();
    let dir = dir.path();
    let id = ticket["id"].as_str().unwrap();

    let picked = run_json(dir, &["assign", "auto", id, "net"]);
    let assignee = picked["assignee_id"].as_str().unwrap();
    assert!(["s-lead", "s-ana", "s-bo"].contains(&assignee), "{assignee}");

    // Stable for the same ticket and roster.
    let again = run_json(dir, &["assign", "auto", id, "net"]);
    assert_eq!(again["assignee_id"], picked["assignee_id"]);
}

#[test]
fn auto_assign_without_roster_fails() {
    let (dir, ticket) = setup();
    let id = ticket["id"].as_str().unwrap();
    let err = run_err(dir.path(), &["assign", "auto", id, "apps"]);
    assert_code(&err, "E4001");
    assert!(err.contains("no eligible staff for team"), "{err}");
}

// ---------------------------------------------------------------------------
// Output modes
// ---------------------------------------------------------------------------

#[test]
fn text_mode_prints_rows() {
    let (dir, ticket) = setup();
    let output = hd_cmd(dir.path())
        .args(["--as-user", "u-1", "--format", "text", "ticket", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(ticket["external_key"].as_str().unwrap()), "{stdout}");
}

//! Account page JSON fixtures.

#![allow(dead_code)]

use serde_json::{json, Value};

pub fn account_json(vsc_id: &str, number: u32, status: &str, institute: &str) -> Value {
    json!({
        "vsc_id": vsc_id,
        "status": status,
        "vsc_id_number": number,
        "home_directory": format!("/user/home/{institute}/{}/{vsc_id}", &vsc_id[..vsc_id.len() - 2]),
        "login_shell": "/bin/bash",
        "broken": false,
        "email": format!("{vsc_id}@example.org"),
        "research_field": ["Computer science", "nwo"],
        "create_timestamp": "2021-03-01T09:00:00Z",
        "person": {
            "gecos": "Test User",
            "institute": {"name": institute},
            "institute_login": vsc_id
        },
        "home_on_scratch": false
    })
}

pub fn usergroup_json(vsc_id: &str, number: u32) -> Value {
    json!({
        "vsc_id": vsc_id,
        "vsc_id_number": number,
        "status": "active",
        "institute": {"name": "gent"},
        "members": [vsc_id],
        "moderators": [],
        "description": "personal group"
    })
}

pub fn group_json(vsc_id: &str, number: u32, institute: &str, moderators: &[&str], members: &[&str]) -> Value {
    json!({
        "vsc_id": vsc_id,
        "status": "active",
        "vsc_id_number": number,
        "institute": {"name": institute},
        "members": members,
        "moderators": moderators,
        "description": "test project"
    })
}

pub fn user_quota_json(user: &str, storage: &str, fileset: &str, hard: u64) -> Value {
    json!({
        "user": user,
        "storage": {"storage_type": "scratch", "name": storage},
        "fileset": fileset,
        "hard": hard
    })
}

pub fn vo_quota_json(vo: &str, storage: &str, fileset: &str, hard: u64) -> Value {
    json!({
        "virtual_organisation": vo,
        "storage": {"storage_type": "scratch", "name": storage},
        "fileset": fileset,
        "hard": hard
    })
}

pub fn pubkey_json(key: &str, deleted: bool) -> Value {
    json!({"pubkey": key, "deleted": deleted})
}

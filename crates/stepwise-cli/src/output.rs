use serde_json::{Value, json};
use stepwise_core::{File, MigrationFile};

use crate::commands::Report;

pub fn render(report: &Report, as_json: bool) -> String {
    if as_json {
        to_json(report).to_string()
    } else {
        to_text(report)
    }
}

fn to_text(report: &Report) -> String {
    match report {
        Report::Done(command) => format!("{command}: done"),
        Report::Created(created) => [&created.up, &created.down]
            .into_iter()
            .flatten()
            .map(|f| format!("created {}", f.path().display()))
            .collect::<Vec<_>>()
            .join("\n"),
        Report::Version(version) => version.to_string(),
        Report::Versions(versions) if versions.is_empty() => "no migrations applied".into(),
        Report::Versions(versions) => versions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
        Report::Pending(files) if files.is_empty() => "nothing pending".into(),
        Report::Pending(files) => files
            .iter()
            .map(|f| f.filename.clone())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn to_json(report: &Report) -> Value {
    match report {
        Report::Done(command) => json!({ "command": command, "status": "ok" }),
        Report::Created(created) => json!({ "created": created_json(created) }),
        Report::Version(version) => json!({ "version": version }),
        Report::Versions(versions) => json!({ "versions": versions.as_slice() }),
        Report::Pending(files) => json!({
            "pending": files.iter().map(file_json).collect::<Vec<_>>()
        }),
    }
}

fn created_json(created: &MigrationFile) -> Value {
    json!({
        "version": created.version,
        "up": created.up.as_ref().map(|f| f.path()),
        "down": created.down.as_ref().map(|f| f.path()),
    })
}

fn file_json(file: &File) -> Value {
    json!({
        "version": file.version,
        "name": file.name,
        "file": file.filename,
    })
}

use std::error::Error;
use std::io::{self, Write};

use chrono::SecondsFormat;
use facematch_core::faces::{MatchResult, RegisteredIdentity, SignatureRecord};
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::errors::{AppError, AppResult};

fn write_json_line(payload: &Value) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_register(outcome: &RegisteredIdentity, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "Registered '{}' ({}-dimensional signature)",
                outcome.identity_id, outcome.signature_len
            );
        }
        OutputMode::Json => write_json_line(&register_json_payload(outcome))?,
    }
    Ok(())
}

fn register_json_payload(outcome: &RegisteredIdentity) -> Value {
    json!({
        "status": "ok",
        "identity_id": outcome.identity_id,
        "signature_len": outcome.signature_len,
        "registered_at": outcome.registered_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

pub fn render_match(results: &[MatchResult], mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if results.is_empty() {
                println!("No faces detected");
            }
            for (index, result) in results.iter().enumerate() {
                let [top, right, bottom, left] = result.region.to_trbl();
                let who = result
                    .matched_identity_id
                    .as_deref()
                    .unwrap_or("unknown");
                match result.display_distance() {
                    Some(distance) => println!(
                        "face {index}: {who} (distance {distance:.4}) at top={top} right={right} bottom={bottom} left={left}"
                    ),
                    None => println!(
                        "face {index}: {who} at top={top} right={right} bottom={bottom} left={left}"
                    ),
                }
            }
        }
        OutputMode::Json => write_json_line(&match_json_payload(results))?,
    }
    Ok(())
}

fn match_json_payload(results: &[MatchResult]) -> Value {
    let faces: Vec<Value> = results
        .iter()
        .map(|result| {
            json!({
                "bbox": result.region.to_trbl(),
                "identity_id": result.matched_identity_id,
                "distance": result.display_distance(),
            })
        })
        .collect();
    json!({
        "status": "ok",
        "faces": faces,
        "count": results.len(),
    })
}

pub fn render_list(records: &[SignatureRecord], mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if records.is_empty() {
                println!("No identities registered");
            }
            for record in records {
                println!(
                    "{}\t{}\t{}",
                    record.identity_id,
                    record.signature.len(),
                    record
                        .registered_at
                        .to_rfc3339_opts(SecondsFormat::Secs, true)
                );
            }
        }
        OutputMode::Json => write_json_line(&list_json_payload(records))?,
    }
    Ok(())
}

fn list_json_payload(records: &[SignatureRecord]) -> Value {
    let identities: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                "identity_id": record.identity_id,
                "signature_len": record.signature.len(),
                "registered_at": record.registered_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            })
        })
        .collect();
    json!({
        "status": "ok",
        "identities": identities,
        "count": records.len(),
    })
}

pub fn render_remove(identity_id: &str, removed: bool, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if removed {
                println!("Removed '{identity_id}'");
            } else {
                println!("'{identity_id}' was not registered");
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "status": "ok",
            "identity_id": identity_id,
            "removed": removed,
        }))?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            if let Ok(json) = serde_json::to_string(&error_json_payload(err)) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}

fn error_json_payload(err: &AppError) -> Value {
    json!({
        "success": false,
        "kind": err.kind().as_str(),
        "error": err.human_message(),
    })
}

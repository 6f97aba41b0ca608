//! Parser for seed data files.
//!
//! A seed directory holds one JSON object per line in:
//! - users.jsonl:       `UserProfile`
//! - videos.jsonl:      `Video`
//! - behaviors.jsonl:   `BehaviorEvent`
//! - follows.jsonl:     `Follow`
//! - interests.jsonl:   `InterestRecord`
//! - daily_stats.jsonl: `VideoDailyStats`
//!
//! Only `users.jsonl` and `videos.jsonl` are required; the others are
//! optional. Blank lines and lines starting with `#` are skipped.

use crate::error::{Result, SeedError};
use crate::index::MemoryStore;
use crate::types::*;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::info;

/// Read every line of a UTF-8 file.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SeedError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => SeedError::IoError(e),
    })?;
    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Parse one JSON object per non-blank line.
pub fn parse_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    let lines = read_lines(path)?;
    let mut rows = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() || line_trimmed.starts_with('#') {
            continue;
        }
        let row = serde_json::from_str(line_trimmed).map_err(|e| SeedError::ParseError {
            file: file.clone(),
            line: line_no,
            reason: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Parse an optional file: a missing file yields no rows.
fn parse_optional<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.exists() {
        parse_jsonl(path)
    } else {
        Ok(Vec::new())
    }
}

pub fn parse_users(path: &Path) -> Result<Vec<UserProfile>> {
    parse_jsonl(path)
}

pub fn parse_videos(path: &Path) -> Result<Vec<Video>> {
    parse_jsonl(path)
}

impl MemoryStore {
    /// Load a seed directory into a fresh store and validate references.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        info!("Loading seed data from {:?}", data_dir);

        let users = parse_users(&data_dir.join("users.jsonl"))?;
        let videos = parse_videos(&data_dir.join("videos.jsonl"))?;
        let behaviors: Vec<BehaviorEvent> = parse_optional(&data_dir.join("behaviors.jsonl"))?;
        let follows: Vec<Follow> = parse_optional(&data_dir.join("follows.jsonl"))?;
        let interests: Vec<InterestRecord> = parse_optional(&data_dir.join("interests.jsonl"))?;
        let daily_stats: Vec<VideoDailyStats> =
            parse_optional(&data_dir.join("daily_stats.jsonl"))?;

        info!(
            "Parsed {} users, {} videos, {} behavior events, {} follows",
            users.len(),
            videos.len(),
            behaviors.len(),
            follows.len()
        );

        let store = MemoryStore::new();
        for user in users {
            store.add_user(user);
        }
        for video in videos {
            store.add_video(video);
        }
        for event in behaviors {
            store.add_behavior(event);
        }
        for follow in follows {
            store.add_follow(follow);
        }
        for record in interests {
            store.add_interest(InterestRecord {
                score: record.score.clamp(0.0, 1.0),
                ..record
            });
        }
        for stats in daily_stats {
            store.add_daily_stats(stats);
        }

        store.validate()?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "feed-seed-{}-{}",
            name,
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_file(dir: &Path, name: &str, lines: &[&str]) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    #[test]
    fn test_load_from_dir() {
        let dir = temp_dir("ok");
        write_file(&dir, "users.jsonl", &[r#"{"id":1,"nickname":"ann","birth_year":1990}"#, ""]);
        write_file(
            &dir,
            "videos.jsonl",
            &[
                "# id 1 is published",
                r#"{"id":1,"owner_id":1,"category_id":2,"published_at":"2024-05-01T10:00:00Z","duration":30,"status":"published"}"#,
            ],
        );
        write_file(
            &dir,
            "behaviors.jsonl",
            &[r#"{"user_id":1,"video_id":1,"action":"like","occurred_at":"2024-05-01T11:00:00Z"}"#],
        );

        let store = MemoryStore::load_from_dir(&dir).unwrap();
        assert_eq!(store.counts(), (1, 1, 1));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_parse_error_reports_line() {
        let dir = temp_dir("bad");
        write_file(&dir, "users.jsonl", &[r#"{"id":1}"#, r#"{"nickname":"no id"}"#]);

        let err = parse_users(&dir.join("users.jsonl")).unwrap_err();
        match err {
            SeedError::ParseError { file, line, .. } => {
                assert_eq!(file, "users.jsonl");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_required_file() {
        let dir = temp_dir("missing");
        let err = MemoryStore::load_from_dir(&dir).unwrap_err();
        assert!(matches!(err, SeedError::FileNotFound { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let dir = temp_dir("dangling");
        write_file(&dir, "users.jsonl", &[r#"{"id":1}"#]);
        write_file(&dir, "videos.jsonl", &[]);
        write_file(
            &dir,
            "behaviors.jsonl",
            &[r#"{"user_id":1,"video_id":5,"action":"view","occurred_at":"2024-05-01T11:00:00Z"}"#],
        );
        let err = MemoryStore::load_from_dir(&dir).unwrap_err();
        assert!(matches!(err, SeedError::MissingReference { id: 5, .. }));
        fs::remove_dir_all(&dir).ok();
    }
}
